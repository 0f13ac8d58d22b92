//! Ledger-specific types and error definitions.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

// Re-export LedgerConfig from config module to avoid duplication
pub use crate::config::schema::LedgerConfig;

/// Engine result code the ledger reports for an accepted transaction.
pub const TES_SUCCESS: &str = "tesSUCCESS";

/// Errors that can occur during ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The connection could not be opened; nothing reached the server.
    #[error("Connect error: {0}")]
    Connect(String),

    /// Transport-level failure after the request may have been sent.
    #[error("Transport error: {0}")]
    Transport(String),

    /// RPC request timed out.
    #[error("RPC timeout after {0} seconds")]
    Timeout(u64),

    /// The server answered with an error status.
    #[error("RPC error {code}: {message}")]
    Rpc { code: String, message: String },

    /// The server answered with something we could not interpret.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Invalid seed format or key derivation error.
    #[error("Wallet error: {0}")]
    Wallet(String),

    /// A transaction field failed local validation or could not be encoded.
    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),

    /// Address, amount or currency text could not be parsed.
    #[error("Invalid {field}: {reason}")]
    Parse { field: &'static str, reason: String },

    /// Every configured endpoint failed.
    #[error("All RPC endpoints failed: {0}")]
    Unavailable(String),
}

impl LedgerError {
    pub(crate) fn parse(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Parse {
            field,
            reason: reason.into(),
        }
    }

    /// Whether the failure is a property of the connection rather than of the request.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Connect(_) | Self::Transport(_) | Self::Timeout(_) | Self::Unavailable(_)
        )
    }

    /// Whether the request may have reached the server although no answer
    /// came back. A submission failing this way can still validate.
    pub fn may_have_been_delivered(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Timeout(_))
    }
}

/// Result type for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Transaction identifier as reported by the ledger (uppercase hex).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TxHash(String);

impl TxHash {
    /// Parse a hash, normalizing to uppercase.
    pub fn parse(text: &str) -> LedgerResult<Self> {
        let text = text.trim();
        if text.is_empty() || text.len() > 64 {
            return Err(LedgerError::parse("transaction hash", "expected 1 to 64 hex digits"));
        }
        if !text.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(LedgerError::parse("transaction hash", "not hexadecimal"));
        }
        Ok(Self(text.to_ascii_uppercase()))
    }

    pub(crate) fn from_digest(digest: &[u8]) -> Self {
        Self(hex::encode_upper(digest))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for TxHash {
    type Error = LedgerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TxHash> for String {
    fn from(hash: TxHash) -> Self {
        hash.0
    }
}

impl std::str::FromStr for TxHash {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// What the server said when a signed blob was submitted.
#[derive(Debug, Clone)]
pub struct SubmitResponse {
    /// Engine result code, e.g. `tesSUCCESS` or `tecNO_LINE`.
    pub engine_result: String,
    /// Human readable explanation of the engine result.
    pub engine_result_message: String,
    /// Hash from `tx_json.hash`, when the server included one.
    pub hash: Option<TxHash>,
    /// Raw result object.
    pub raw: Value,
}

impl SubmitResponse {
    pub fn is_success(&self) -> bool {
        self.engine_result == TES_SUCCESS
    }
}

/// Validation state of a looked-up transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupStatus {
    /// Known to the server but not yet in a validated ledger.
    Pending,
    /// In a validated ledger with a success result.
    Validated,
    /// In a validated ledger with a failure result; final.
    Failed,
}

/// Result of looking up one transaction.
#[derive(Debug, Clone)]
pub struct TxLookup {
    pub status: LookupStatus,
    /// `meta.TransactionResult` once the outcome is known.
    pub engine_result: Option<String>,
    pub raw: Value,
}

impl TxLookup {
    /// Classify a `tx` result object.
    pub fn from_result(raw: Value) -> Self {
        let validated = raw.get("validated").and_then(Value::as_bool).unwrap_or(false);
        let engine_result = raw
            .get("meta")
            .and_then(|meta| meta.get("TransactionResult"))
            .and_then(Value::as_str)
            .map(str::to_string);

        let status = match (validated, engine_result.as_deref()) {
            (false, _) => LookupStatus::Pending,
            (true, Some(code)) if code != TES_SUCCESS => LookupStatus::Failed,
            (true, _) => LookupStatus::Validated,
        };

        Self {
            status,
            engine_result,
            raw,
        }
    }
}

/// Sequence information needed to autofill a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountState {
    /// Next sequence number the account must use.
    pub sequence: u32,
    /// Index of the open ledger the answer came from.
    pub ledger_current_index: u32,
}
