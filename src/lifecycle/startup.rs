//! Startup orchestration.
//!
//! # Responsibilities
//! - Connect the ledger client
//! - Load the submission registry and the issuer wallet
//! - Assemble the orchestrator and the shared handler state
//!
//! Startup is ordered and fail-fast, with one exception: a missing issuer
//! seed only disables the payment routes so the query routes stay usable.

use std::sync::Arc;
use thiserror::Error;

use crate::config::GatewayConfig;
use crate::http::AppState;
use crate::ledger::{CurrencyCode, LedgerClient, LedgerError, RpcLedgerClient, Wallet};
use crate::lifecycle::Shutdown;
use crate::payments::{OrchestratorConfig, PaymentOrchestrator, SubmissionRegistry};

/// Errors that abort startup.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("ledger client: {0}")]
    Ledger(#[from] LedgerError),

    #[error("invalid currency {currency:?}: {source}")]
    Currency {
        currency: String,
        #[source]
        source: LedgerError,
    },

    #[error("issuer wallet: {0}")]
    Issuer(LedgerError),
}

/// Build handler state around an already connected client.
pub fn assemble(
    config: GatewayConfig,
    ledger: Arc<dyn LedgerClient>,
    issuer: Option<Wallet>,
    shutdown: &Shutdown,
) -> Result<AppState, StartupError> {
    let currency = CurrencyCode::parse(&config.payments.currency).map_err(|source| StartupError::Currency {
        currency: config.payments.currency.clone(),
        source,
    })?;

    let registry = load_registry(config.payments.registry_path.as_deref())
        .with_max_records(config.payments.registry_max_records);
    let orchestrator = PaymentOrchestrator::new(ledger.clone(), OrchestratorConfig::from_config(&config))
        .with_registry(registry.clone())
        .with_cancellation(shutdown.token());

    Ok(AppState {
        ledger,
        orchestrator: Arc::new(orchestrator),
        issuer: issuer.map(Arc::new),
        registry,
        currency,
        config: Arc::new(config),
    })
}

/// Connect to the ledger and build handler state from `config`.
pub async fn initialize(config: GatewayConfig, shutdown: &Shutdown) -> Result<AppState, StartupError> {
    let ledger = RpcLedgerClient::new(config.ledger.clone()).await?;
    let issuer = load_issuer(&config.payments.issuer_seed_env)?;
    assemble(config, Arc::new(ledger), issuer, shutdown)
}

/// Read the issuer seed from `var`.
///
/// An unset variable yields `None`. A set but unusable seed is fatal.
pub fn load_issuer(var: &str) -> Result<Option<Wallet>, StartupError> {
    if std::env::var_os(var).is_none() {
        tracing::warn!(env_var = var, "Issuer seed not set, payment routes disabled");
        return Ok(None);
    }
    let wallet = Wallet::from_env(var).map_err(StartupError::Issuer)?;
    tracing::info!(issuer = %wallet.account(), algorithm = ?wallet.algorithm(), "Issuer wallet loaded");
    Ok(Some(wallet))
}

fn load_registry(path: Option<&str>) -> SubmissionRegistry {
    let Some(path) = path else {
        return SubmissionRegistry::new(None);
    };
    match SubmissionRegistry::load_from_file(path) {
        Ok(registry) => registry,
        Err(e) => {
            tracing::warn!(path, error = %e, "Could not read submission registry, starting empty");
            SubmissionRegistry::new(Some(path.to_string()))
        }
    }
}
