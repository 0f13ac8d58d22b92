//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Slack between the payment deadline and the route timeout, on top of one
/// RPC timeout for a submit that is already in flight.
pub const DEADLINE_MARGIN_MS: u64 = 250;

/// Root configuration for the ledger gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address, connection limit).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Ledger RPC settings.
    pub ledger: LedgerConfig,

    /// Confirmation polling policy.
    pub confirmation: ConfirmationConfig,

    /// Issued currency and signing material.
    pub payments: PaymentsConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    #[serde(default)]
    pub security: SecurityConfig,
}

impl GatewayConfig {
    /// Worst case for one submit-and-confirm: account state, fee and submit
    /// RPCs, then every lookup with its delay.
    pub fn payment_leg_ms(&self) -> u64 {
        let rpc_ms = self.ledger.rpc_timeout_secs.saturating_mul(1000);
        let per_lookup = self.confirmation.delay_ms.saturating_add(rpc_ms);
        u64::from(self.confirmation.max_attempts)
            .saturating_mul(per_lookup)
            .saturating_add(rpc_ms.saturating_mul(3))
    }

    /// Time budget a payment route needs: two legs plus the deadline slack.
    pub fn payment_budget_ms(&self) -> u64 {
        self.payment_leg_ms()
            .saturating_mul(2)
            .saturating_add(self.ledger.rpc_timeout_secs.saturating_mul(1000))
            .saturating_add(DEADLINE_MARGIN_MS)
    }

    /// When a payment route stops waiting and reports the hashes it holds.
    /// Leaves room for one in-flight RPC before the route timeout fires.
    pub fn payment_deadline(&self) -> Duration {
        let total = self.timeouts.payment_request_secs.saturating_mul(1000);
        let reserved = self
            .ledger
            .rpc_timeout_secs
            .saturating_mul(1000)
            .saturating_add(DEADLINE_MARGIN_MS);
        Duration::from_millis(total.saturating_sub(reserved))
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum concurrent in-flight requests (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_connections: 1_000,
        }
    }
}

/// Timeout configuration for HTTP requests.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout for query routes in seconds.
    pub request_secs: u64,

    /// Request timeout for routes that wait for validation, in seconds.
    /// Must cover two full submit-and-confirm legs.
    pub payment_request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 30,
            payment_request_secs: 800,
        }
    }
}

/// Ledger RPC configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Primary endpoint: `http(s)://` for JSON-RPC, `ws(s)://` for WebSocket.
    pub rpc_url: String,

    /// Failover endpoints, tried in order when the primary is unreachable.
    #[serde(default)]
    pub failover_urls: Vec<String>,

    /// RPC request timeout in seconds.
    pub rpc_timeout_secs: u64,

    /// Maximum fee per transaction in drops (protection against fee spikes).
    pub max_fee_drops: u64,

    /// Ledgers after the current one before a transaction expires.
    pub last_ledger_offset: u32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            rpc_url: "https://s.altnet.rippletest.net:51234".to_string(),
            failover_urls: Vec::new(),
            rpc_timeout_secs: 10,
            max_fee_drops: 2_000,
            last_ledger_offset: 20,
        }
    }
}

/// Confirmation polling configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConfirmationConfig {
    /// Lookups before reporting a confirmation timeout.
    pub max_attempts: u32,

    /// Delay between lookups in milliseconds.
    pub delay_ms: u64,
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            max_attempts: 30,
            delay_ms: 2_000,
        }
    }
}

/// Payment settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PaymentsConfig {
    /// Currency code issued by the gateway wallet.
    pub currency: String,

    /// Environment variable holding the issuer seed. The seed itself never
    /// appears in config files or requests.
    pub issuer_seed_env: String,

    /// Where to persist the submission registry. `None` keeps it in memory.
    pub registry_path: Option<String>,

    /// Records kept before settled ones are evicted, oldest first.
    pub registry_max_records: usize,
}

impl Default for PaymentsConfig {
    fn default() -> Self {
        Self {
            currency: "VIP".to_string(),
            issuer_seed_env: crate::ledger::wallet::ISSUER_SEED_ENV_VAR.to_string(),
            registry_path: None,
            registry_max_records: 10_000,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Security hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Maximum body size in bytes.
    pub max_body_size: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_body_size: 64 * 1024, // 64KB
        }
    }
}
