//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, addresses parse)
//! - Check that the payment route timeout covers two submit-and-confirm legs
//!
//! Returns all validation errors, not just the first.

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::GatewayConfig;
use crate::ledger::CurrencyCode;

/// One semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field, e.g. `ledger.rpc_url`.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn check_url(field: &str, raw: &str, errors: &mut Vec<ValidationError>) {
    match url::Url::parse(raw) {
        Ok(url) if matches!(url.scheme(), "http" | "https" | "ws" | "wss") => {}
        Ok(url) => errors.push(ValidationError::new(
            field,
            format!("unsupported scheme '{}'", url.scheme()),
        )),
        Err(e) => errors.push(ValidationError::new(field, format!("invalid URL: {}", e))),
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::new("listener.max_connections", "must be greater than 0"));
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    }

    check_url("ledger.rpc_url", &config.ledger.rpc_url, &mut errors);
    for (i, url) in config.ledger.failover_urls.iter().enumerate() {
        check_url(&format!("ledger.failover_urls[{}]", i), url, &mut errors);
    }
    if config.ledger.rpc_timeout_secs == 0 {
        errors.push(ValidationError::new("ledger.rpc_timeout_secs", "must be greater than 0"));
    }
    if config.ledger.max_fee_drops == 0 {
        errors.push(ValidationError::new("ledger.max_fee_drops", "must be greater than 0"));
    }

    if config.confirmation.max_attempts == 0 {
        errors.push(ValidationError::new("confirmation.max_attempts", "must be greater than 0"));
    }
    let budget_ms = config.payment_budget_ms();
    if config.timeouts.payment_request_secs.saturating_mul(1000) <= budget_ms {
        errors.push(ValidationError::new(
            "timeouts.payment_request_secs",
            format!(
                "{}s does not cover two payment legs ({}ms with lookup and RPC timeouts)",
                config.timeouts.payment_request_secs, budget_ms
            ),
        ));
    }

    if let Err(e) = CurrencyCode::parse(&config.payments.currency) {
        errors.push(ValidationError::new("payments.currency", e.to_string()));
    }
    if config.payments.registry_max_records == 0 {
        errors.push(ValidationError::new("payments.registry_max_records", "must be greater than 0"));
    }
    if config.payments.issuer_seed_env.trim().is_empty() {
        errors.push(ValidationError::new("payments.issuer_seed_env", "must name an environment variable"));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    if config.security.max_body_size == 0 {
        errors.push(ValidationError::new("security.max_body_size", "must be greater than 0"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&GatewayConfig::default()).is_ok());
    }

    #[test]
    fn test_reports_every_error() {
        let mut config = GatewayConfig::default();
        config.listener.bind_address = "nowhere".to_string();
        config.ledger.rpc_url = "ftp://ledger".to_string();
        config.payments.currency = "XRP".to_string();

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec!["listener.bind_address", "ledger.rpc_url", "payments.currency"]
        );
    }

    #[test]
    fn test_payment_timeout_must_cover_confirmation() {
        let mut config = GatewayConfig::default();
        config.confirmation.max_attempts = 100;
        config.confirmation.delay_ms = 2_000;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "timeouts.payment_request_secs");
    }

    #[test]
    fn test_payment_timeout_counts_both_legs_and_rpc_time() {
        let mut config = GatewayConfig::default();
        config.confirmation.max_attempts = 3;
        config.confirmation.delay_ms = 1_500;
        config.ledger.rpc_timeout_secs = 1;
        // One leg: 3 * (1500 + 1000) + 3 * 1000 = 10.5s. Two legs plus slack: 22.25s.
        assert_eq!(config.payment_leg_ms(), 10_500);

        config.timeouts.payment_request_secs = 5;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "timeouts.payment_request_secs");

        config.timeouts.payment_request_secs = 22;
        assert!(validate_config(&config).is_err());
        config.timeouts.payment_request_secs = 23;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_payment_deadline_precedes_route_timeout() {
        let mut config = GatewayConfig::default();
        config.timeouts.payment_request_secs = 5;
        config.ledger.rpc_timeout_secs = 1;
        assert_eq!(config.payment_deadline(), std::time::Duration::from_millis(3_750));
    }

    #[test]
    fn test_registry_bound_must_be_positive() {
        let mut config = GatewayConfig::default();
        config.payments.registry_max_records = 0;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "payments.registry_max_records");
    }

    #[test]
    fn test_websocket_urls_accepted() {
        let mut config = GatewayConfig::default();
        config.ledger.rpc_url = "wss://s.altnet.rippletest.net:51233".to_string();
        config.ledger.failover_urls = vec!["ws://127.0.0.1:6006".to_string()];
        assert!(validate_config(&config).is_ok());
    }
}
