//! Payment intents, results and the payment error taxonomy.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

use crate::ledger::{Account, CurrencyAmount, LedgerError, TxHash};

/// One token transfer, built fresh per request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentIntent {
    /// Sending account; must be controlled by the signing wallet.
    pub source: Account,
    pub destination: Account,
    pub amount: CurrencyAmount,
}

impl PaymentIntent {
    pub fn new(source: Account, destination: Account, amount: CurrencyAmount) -> Self {
        Self {
            source,
            destination,
            amount,
        }
    }
}

/// Authorize `account` to hold up to `limit` of the limit's issuer currency.
/// A zero limit removes the trust line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustLineIntent {
    pub account: Account,
    pub limit: CurrencyAmount,
}

/// Outcome of a confirmed submission.
#[derive(Debug, Clone, Serialize)]
pub struct SubmissionResult {
    pub hash: TxHash,
    pub validated: bool,
    /// Final engine result from the transaction metadata, when reported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine_result: Option<String>,
    /// Raw `tx` lookup result.
    pub raw: Value,
}

/// Both legs of a payment with a side fee.
#[derive(Debug, Clone, Serialize)]
pub struct FeePaymentReceipt {
    pub principal: SubmissionResult,
    pub fee: SubmissionResult,
}

/// Stable, machine-readable error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ValidationError,
    SigningError,
    SubmissionRejected,
    ConfirmationTimeout,
    LedgerFailure,
    LedgerUnavailable,
    /// The request ran out of time before anything was submitted.
    Cancelled,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ValidationError => "validation_error",
            Self::SigningError => "signing_error",
            Self::SubmissionRejected => "submission_rejected",
            Self::ConfirmationTimeout => "confirmation_timeout",
            Self::LedgerFailure => "ledger_failure",
            Self::LedgerUnavailable => "ledger_unavailable",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors surfaced by the payment orchestrator.
///
/// Lookup failures inside the confirmation loop are not represented here;
/// they are retried until the attempt ceiling.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// Missing or malformed request fields. Nothing was sent.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Key material absent, malformed, or not matching the source account.
    #[error("Signing failed: {0}")]
    Signing(String),

    /// The server did not accept the transaction. Confirmation was not attempted.
    #[error("Submission rejected with {engine_result}: {message}")]
    SubmissionRejected {
        engine_result: String,
        message: String,
        hash: Option<TxHash>,
    },

    /// Validation was not observed in time. The transaction may still succeed.
    #[error("Transaction {hash} not validated after {attempts} attempts")]
    ConfirmationTimeout { hash: TxHash, attempts: u32 },

    /// The transaction was validated with a failure result.
    #[error("Transaction {hash} failed in a validated ledger with {engine_result}")]
    LedgerFailure { hash: TxHash, engine_result: String },

    /// The connection broke after the signed blob was sent. The transaction
    /// may still be applied under `hash`, which is the locally computed one.
    #[error("Submission of {hash} has unknown outcome: {error}")]
    SubmissionIndeterminate {
        hash: TxHash,
        #[source]
        error: LedgerError,
    },

    /// The ledger could not be reached or refused a query while preparing.
    #[error("Ledger error: {0}")]
    Ledger(#[source] LedgerError),

    /// Cancelled before the transaction was submitted. Nothing was sent.
    #[error("Cancelled before submission")]
    Cancelled,
}

impl PaymentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::ValidationError,
            Self::Signing(_) => ErrorKind::SigningError,
            Self::SubmissionRejected { .. } => ErrorKind::SubmissionRejected,
            Self::ConfirmationTimeout { .. } => ErrorKind::ConfirmationTimeout,
            Self::LedgerFailure { .. } => ErrorKind::LedgerFailure,
            Self::SubmissionIndeterminate { .. } | Self::Ledger(_) => ErrorKind::LedgerUnavailable,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Hash obtained before the failure, if any.
    pub fn hash(&self) -> Option<&TxHash> {
        match self {
            Self::SubmissionRejected { hash, .. } => hash.as_ref(),
            Self::ConfirmationTimeout { hash, .. }
            | Self::LedgerFailure { hash, .. }
            | Self::SubmissionIndeterminate { hash, .. } => Some(hash),
            _ => None,
        }
    }
}

impl From<LedgerError> for PaymentError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::Wallet(msg) => Self::Signing(msg),
            LedgerError::InvalidTransaction(msg) => Self::Validation(msg),
            e @ LedgerError::Parse { .. } => Self::Validation(e.to_string()),
            other => Self::Ledger(other),
        }
    }
}

/// Which leg of a two-leg payment failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentLeg {
    Principal,
    Fee,
}

impl fmt::Display for PaymentLeg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Principal => f.write_str("principal"),
            Self::Fee => f.write_str("fee"),
        }
    }
}

/// Failure of a two-leg payment.
///
/// When the fee leg fails, `principal` holds the already-confirmed principal
/// transfer so it can be reconciled.
#[derive(Debug, Error)]
#[error("{leg} leg failed: {error}")]
pub struct FeePaymentError {
    pub leg: PaymentLeg,
    pub principal: Option<SubmissionResult>,
    #[source]
    pub error: PaymentError,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds_and_hashes() {
        let hash = TxHash::parse("ABC123").unwrap();

        let err = PaymentError::ConfirmationTimeout {
            hash: hash.clone(),
            attempts: 30,
        };
        assert_eq!(err.kind(), ErrorKind::ConfirmationTimeout);
        assert_eq!(err.hash(), Some(&hash));

        let err = PaymentError::Validation("destination is required".into());
        assert_eq!(err.kind().as_str(), "validation_error");
        assert!(err.hash().is_none());
    }

    #[test]
    fn test_ledger_error_mapping() {
        let err: PaymentError = LedgerError::Wallet("bad seed".into()).into();
        assert_eq!(err.kind(), ErrorKind::SigningError);

        let err: PaymentError = LedgerError::InvalidTransaction("Fee is required".into()).into();
        assert_eq!(err.kind(), ErrorKind::ValidationError);

        let err: PaymentError = LedgerError::Unavailable("down".into()).into();
        assert_eq!(err.kind(), ErrorKind::LedgerUnavailable);
    }

    #[test]
    fn test_indeterminate_submission_keeps_hash() {
        let hash = TxHash::parse("ABC123").unwrap();
        let err = PaymentError::SubmissionIndeterminate {
            hash: hash.clone(),
            error: LedgerError::Transport("connection reset".into()),
        };
        assert_eq!(err.kind(), ErrorKind::LedgerUnavailable);
        assert_eq!(err.hash(), Some(&hash));
        assert!(PaymentError::Cancelled.hash().is_none());
        assert_eq!(PaymentError::Cancelled.kind().as_str(), "cancelled");
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::SubmissionRejected).unwrap();
        assert_eq!(json, "\"submission_rejected\"");
    }

    #[test]
    fn test_fee_error_display_names_leg() {
        let err = FeePaymentError {
            leg: PaymentLeg::Fee,
            principal: None,
            error: PaymentError::Signing("no key".into()),
        };
        assert!(err.to_string().starts_with("fee leg failed"));
    }
}
