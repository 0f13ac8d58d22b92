//! Ledger RPC client with timeout and failover handling.
//!
//! # Responsibilities
//! - Hide the transport (HTTP or WebSocket) behind [`LedgerClient`]
//! - Submit signed blobs and look up transactions by hash
//! - Query account state and the current fee for autofill
//! - Fall through to the next endpoint on transport failures

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::time::timeout;

use crate::ledger::address::Account;
use crate::ledger::amount::Drops;
use crate::ledger::transport::Endpoint;
use crate::ledger::types::{
    AccountState, LedgerConfig, LedgerError, LedgerResult, SubmitResponse, TxHash, TxLookup,
};
use crate::observability::metrics;

/// Operations the gateway needs from a ledger server.
///
/// Implemented by [`RpcLedgerClient`] and by test stubs.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Submit a signed transaction blob (uppercase hex).
    async fn submit(&self, tx_blob: &str) -> LedgerResult<SubmitResponse>;

    /// Look up a transaction by hash.
    async fn lookup(&self, hash: &TxHash) -> LedgerResult<TxLookup>;

    /// Next sequence number and current ledger index for `account`.
    async fn account_state(&self, account: &Account) -> LedgerResult<AccountState>;

    /// Fee a transaction needs to get into the open ledger.
    async fn fee(&self) -> LedgerResult<Drops>;

    /// Raw `account_info` result from the validated ledger.
    async fn account_info(&self, account: &Account) -> LedgerResult<Value>;

    /// Raw `account_lines` result from the validated ledger.
    async fn account_lines(&self, account: &Account) -> LedgerResult<Value>;

    /// Raw `server_info` result.
    async fn server_info(&self) -> LedgerResult<Value>;
}

/// When a failed call may move on to the next endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Failover {
    /// Reads: any transport failure.
    AnyTransportError,
    /// Writes: only when the request never reached a server.
    ConnectOnly,
}

/// JSON-RPC client over one or more endpoints.
pub struct RpcLedgerClient {
    /// Primary endpoint first, then failovers.
    endpoints: Vec<Endpoint>,
    config: LedgerConfig,
    timeout_duration: Duration,
}

impl RpcLedgerClient {
    /// Create a client for the configured endpoints.
    ///
    /// The primary URL must be valid; invalid failover URLs are skipped.
    /// Reachability is checked once and only logged, so the gateway can start
    /// while the ledger is down.
    pub async fn new(config: LedgerConfig) -> LedgerResult<Self> {
        let timeout_duration = Duration::from_secs(config.rpc_timeout_secs);
        let http = reqwest::Client::builder()
            .timeout(timeout_duration)
            .build()
            .map_err(|e| LedgerError::Transport(e.to_string()))?;

        let mut endpoints = vec![Endpoint::from_url(&config.rpc_url, &http)?];
        for url in &config.failover_urls {
            match Endpoint::from_url(url, &http) {
                Ok(endpoint) => endpoints.push(endpoint),
                Err(e) => tracing::warn!(url = %url, error = %e, "Ignoring invalid failover RPC URL"),
            }
        }

        let client = Self {
            endpoints,
            config,
            timeout_duration,
        };

        match client.server_info().await {
            Ok(info) => {
                let build_version = info
                    .pointer("/info/build_version")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown");
                tracing::info!(
                    rpc_url = %client.config.rpc_url,
                    failovers = client.endpoints.len() - 1,
                    build_version,
                    "Ledger client initialized"
                );
            }
            Err(e) => tracing::warn!(
                error = %e,
                "Ledger client initialized but server is not reachable"
            ),
        }

        Ok(client)
    }

    /// Send `method` to each endpoint in turn until one answers.
    ///
    /// An error status from the server is returned as-is. With
    /// [`Failover::AnyTransportError`] every transport failure moves on to the
    /// next endpoint; with [`Failover::ConnectOnly`] only failures that never
    /// reached a server do, and anything else is returned to the caller.
    async fn request(&self, method: &str, params: Value, failover: Failover) -> LedgerResult<Value> {
        let mut last_error = String::from("no endpoints configured");

        for (i, endpoint) in self.endpoints.iter().enumerate() {
            let fut = endpoint.call(method, params.clone());
            let error = match timeout(self.timeout_duration, fut).await {
                Ok(Ok(result)) => {
                    metrics::record_rpc_call(method, "ok");
                    return check_status(result);
                }
                Ok(Err(e)) if e.is_transport() => e,
                Ok(Err(e)) => {
                    metrics::record_rpc_call(method, "malformed");
                    return Err(e);
                }
                Err(_) => LedgerError::Timeout(self.config.rpc_timeout_secs),
            };

            if failover == Failover::ConnectOnly && error.may_have_been_delivered() {
                tracing::warn!(endpoint_idx = i, method, error = %error, "RPC outcome unknown, not retrying");
                metrics::record_rpc_call(method, "indeterminate");
                return Err(error);
            }
            tracing::warn!(endpoint_idx = i, method, error = %error, "RPC error, trying next endpoint");
            last_error = error.to_string();
        }

        metrics::record_rpc_call(method, "unavailable");
        Err(LedgerError::Unavailable(last_error))
    }

    /// Check whether any endpoint answers `server_info`.
    pub async fn is_healthy(&self) -> bool {
        let healthy = self.server_info().await.is_ok();
        metrics::record_ledger_health(healthy);
        healthy
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }
}

#[async_trait]
impl LedgerClient for RpcLedgerClient {
    async fn submit(&self, tx_blob: &str) -> LedgerResult<SubmitResponse> {
        // A blob that may have been applied is never sent to a second server.
        let raw = self
            .request("submit", json!({ "tx_blob": tx_blob }), Failover::ConnectOnly)
            .await?;
        parse_submit(raw)
    }

    async fn lookup(&self, hash: &TxHash) -> LedgerResult<TxLookup> {
        let raw = self
            .request(
                "tx",
                json!({ "transaction": hash.as_str(), "binary": false }),
                Failover::AnyTransportError,
            )
            .await?;
        Ok(TxLookup::from_result(raw))
    }

    async fn account_state(&self, account: &Account) -> LedgerResult<AccountState> {
        let raw = self
            .request(
                "account_info",
                json!({ "account": account.as_str(), "ledger_index": "current" }),
                Failover::AnyTransportError,
            )
            .await?;
        parse_account_state(&raw)
    }

    async fn fee(&self) -> LedgerResult<Drops> {
        let raw = self.request("fee", json!({}), Failover::AnyTransportError).await?;
        parse_fee(&raw)
    }

    async fn account_info(&self, account: &Account) -> LedgerResult<Value> {
        self.request(
            "account_info",
            json!({ "account": account.as_str(), "ledger_index": "validated" }),
            Failover::AnyTransportError,
        )
        .await
    }

    async fn account_lines(&self, account: &Account) -> LedgerResult<Value> {
        self.request(
            "account_lines",
            json!({ "account": account.as_str(), "ledger_index": "validated" }),
            Failover::AnyTransportError,
        )
        .await
    }

    async fn server_info(&self) -> LedgerResult<Value> {
        self.request("server_info", json!({}), Failover::AnyTransportError).await
    }
}

impl std::fmt::Debug for RpcLedgerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcLedgerClient")
            .field("rpc_url", &self.config.rpc_url)
            .field("endpoints", &self.endpoints.len())
            .field("timeout_secs", &self.config.rpc_timeout_secs)
            .finish()
    }
}

/// Turn `{"status": "error", ...}` into [`LedgerError::Rpc`].
fn check_status(result: Value) -> LedgerResult<Value> {
    if result.get("status").and_then(Value::as_str) != Some("error") {
        return Ok(result);
    }
    let code = result
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string();
    let message = result
        .get("error_message")
        .or_else(|| result.get("error_exception"))
        .and_then(Value::as_str)
        .unwrap_or(&code)
        .to_string();
    Err(LedgerError::Rpc { code, message })
}

fn parse_submit(raw: Value) -> LedgerResult<SubmitResponse> {
    let engine_result = raw
        .get("engine_result")
        .and_then(Value::as_str)
        .ok_or_else(|| LedgerError::MalformedResponse("submit result has no engine_result".to_string()))?
        .to_string();
    let engine_result_message = raw
        .get("engine_result_message")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let hash = raw
        .pointer("/tx_json/hash")
        .and_then(Value::as_str)
        .and_then(|h| TxHash::parse(h).ok());

    Ok(SubmitResponse {
        engine_result,
        engine_result_message,
        hash,
        raw,
    })
}

fn parse_account_state(raw: &Value) -> LedgerResult<AccountState> {
    let sequence = raw
        .pointer("/account_data/Sequence")
        .and_then(Value::as_u64)
        .and_then(|s| u32::try_from(s).ok())
        .ok_or_else(|| LedgerError::MalformedResponse("account_info has no Sequence".to_string()))?;
    let ledger_current_index = raw
        .get("ledger_current_index")
        .and_then(Value::as_u64)
        .and_then(|s| u32::try_from(s).ok())
        .ok_or_else(|| {
            LedgerError::MalformedResponse("account_info has no ledger_current_index".to_string())
        })?;

    Ok(AccountState {
        sequence,
        ledger_current_index,
    })
}

/// The larger of the open-ledger fee and the base fee.
fn parse_fee(raw: &Value) -> LedgerResult<Drops> {
    let drops = |key: &str| -> Option<u64> {
        let value = raw.get("drops")?.get(key)?;
        match value {
            Value::String(s) => s.parse().ok(),
            Value::Number(n) => n.as_u64(),
            _ => None,
        }
    };

    let base = drops("base_fee")
        .ok_or_else(|| LedgerError::MalformedResponse("fee result has no drops.base_fee".to_string()))?;
    let open = drops("open_ledger_fee").unwrap_or(base);
    Ok(Drops(open.max(base)))
}
