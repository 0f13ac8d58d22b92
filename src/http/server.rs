//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with all API handlers
//! - Wire up middleware (request ID, tracing, timeouts, limits, metrics)
//! - Serve on a listener until shutdown is triggered

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::{limit::RequestBodyLimitLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::GatewayConfig;
use crate::http::handlers;
use crate::http::request::{propagate_request_id_layer, set_request_id_layer, track_metrics};
use crate::ledger::{CurrencyCode, LedgerClient, Wallet};
use crate::lifecycle::Shutdown;
use crate::payments::{PaymentOrchestrator, SubmissionRegistry};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<dyn LedgerClient>,
    pub orchestrator: Arc<PaymentOrchestrator>,
    /// Issuer wallet; `None` disables the payment routes.
    pub issuer: Option<Arc<Wallet>>,
    pub registry: SubmissionRegistry,
    /// Currency issued when a request does not name one.
    pub currency: CurrencyCode,
    pub config: Arc<GatewayConfig>,
}

/// HTTP server for the ledger gateway.
pub struct HttpServer {
    router: Router,
    state: AppState,
    shutdown: Shutdown,
}

impl HttpServer {
    /// Create a new HTTP server around prepared state.
    pub fn new(state: AppState, shutdown: Shutdown) -> Self {
        let router = Self::build_router(state.clone());
        Self {
            router,
            state,
            shutdown,
        }
    }

    /// Build the Axum router with all middleware layers.
    ///
    /// Payment routes get their own, longer timeout since they wait for
    /// validation.
    #[allow(deprecated)]
    pub fn build_router(state: AppState) -> Router {
        let config = state.config.clone();

        let queries = Router::new()
            .route("/health", get(handlers::health))
            .route("/api/account_info", get(handlers::account_info))
            .route("/api/account_lines", get(handlers::account_lines))
            .route("/api/balance", get(handlers::balance))
            .route("/api/transactions", get(handlers::list_transactions))
            .route("/api/transactions/{hash}", get(handlers::get_transaction))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)));

        let payments = Router::new()
            .route("/api/payments", post(handlers::create_payment))
            .route("/api/process_payment", post(handlers::process_payment))
            .route("/api/transactions/{hash}/confirm", post(handlers::confirm_transaction))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.payment_request_secs)));

        queries
            .merge(payments)
            .route_layer(middleware::from_fn(track_metrics))
            .with_state(state)
            .layer(RequestBodyLimitLayer::new(config.security.max_body_size))
            .layer(ConcurrencyLimitLayer::new(config.listener.max_connections))
            .layer(TraceLayer::new_for_http())
            .layer(propagate_request_id_layer())
            .layer(set_request_id_layer())
    }

    /// Run the server, accepting connections on the given listener.
    ///
    /// Returns once shutdown is triggered and in-flight requests finished.
    /// The registry is saved on the way out.
    pub async fn run(self, listener: TcpListener) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let shutdown = self.shutdown.clone();
        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move { shutdown.wait().await })
            .await?;

        if let Err(e) = self.state.registry.save_to_file() {
            tracing::error!(error = %e, "Failed to save submission registry");
        }
        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &GatewayConfig {
        &self.state.config
    }
}
