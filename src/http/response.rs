//! Error responses.
//!
//! Every failure is rendered as
//! `{"error": {"kind", "message", "hash"?}, "tx_hash"?}` so callers always
//! learn whether a transaction hash was obtained.
//!
//! | kind | status |
//! |---|---|
//! | `validation_error` | 400 |
//! | `not_found` | 404 |
//! | `signing_error` | 500 |
//! | `submission_rejected`, `ledger_failure` | 422 |
//! | `ledger_unavailable`, `ledger_error` | 502 |
//! | `cancelled` | 503 |
//! | `confirmation_timeout` | 504 |

use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};

use crate::ledger::LedgerError;
use crate::payments::{ErrorKind, FeePaymentError, PaymentError};

/// Error returned by API handlers.
#[derive(Debug)]
pub enum ApiError {
    /// Missing or malformed request input. No ledger call was made.
    Validation(String),
    NotFound(String),
    /// Payment routes need the issuer wallet, which is not loaded.
    IssuerUnavailable,
    Ledger(LedgerError),
    Payment(PaymentError),
    FeePayment(FeePaymentError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::IssuerUnavailable => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Ledger(e) => ledger_status(e),
            Self::Payment(e) => payment_status(e),
            Self::FeePayment(e) => payment_status(&e.error),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => ErrorKind::ValidationError.as_str(),
            Self::NotFound(_) => "not_found",
            Self::IssuerUnavailable => ErrorKind::SigningError.as_str(),
            Self::Ledger(e) if e.is_transport() => ErrorKind::LedgerUnavailable.as_str(),
            Self::Ledger(_) => "ledger_error",
            Self::Payment(e) => e.kind().as_str(),
            Self::FeePayment(e) => e.error.kind().as_str(),
        }
    }

    fn body(&self) -> Value {
        let (message, hash, tx_hash) = match self {
            Self::Validation(msg) | Self::NotFound(msg) => (msg.clone(), None, None),
            Self::IssuerUnavailable => ("Issuer wallet not configured".to_string(), None, None),
            Self::Ledger(e) => (e.to_string(), None, None),
            Self::Payment(e) => (e.to_string(), e.hash(), e.hash()),
            Self::FeePayment(e) => (
                e.to_string(),
                e.error.hash(),
                // The principal hash wins: it is the transfer that needs reconciling.
                e.principal.as_ref().map(|p| &p.hash).or_else(|| e.error.hash()),
            ),
        };

        let mut error = json!({ "kind": self.kind(), "message": message });
        if let Some(hash) = hash {
            error["hash"] = json!(hash);
        }
        let mut body = json!({ "error": error });
        if let Some(tx_hash) = tx_hash {
            body["tx_hash"] = json!(tx_hash);
        }
        if let Self::FeePayment(e) = self {
            body["failed_leg"] = json!(e.leg);
        }
        body
    }
}

fn ledger_status(e: &LedgerError) -> StatusCode {
    match e {
        LedgerError::Parse { .. } | LedgerError::InvalidTransaction(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::BAD_GATEWAY,
    }
}

fn payment_status(e: &PaymentError) -> StatusCode {
    match e.kind() {
        ErrorKind::ValidationError => StatusCode::BAD_REQUEST,
        ErrorKind::SigningError => StatusCode::INTERNAL_SERVER_ERROR,
        ErrorKind::SubmissionRejected | ErrorKind::LedgerFailure => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::ConfirmationTimeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::LedgerUnavailable => StatusCode::BAD_GATEWAY,
        ErrorKind::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), kind = self.kind(), error = ?self, "Request failed");
        } else {
            tracing::debug!(status = status.as_u16(), kind = self.kind(), "Request rejected");
        }
        (status, Json(self.body())).into_response()
    }
}

impl From<LedgerError> for ApiError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::Parse { .. } => Self::Validation(e.to_string()),
            other => Self::Ledger(other),
        }
    }
}

impl From<PaymentError> for ApiError {
    fn from(e: PaymentError) -> Self {
        Self::Payment(e)
    }
}

impl From<FeePaymentError> for ApiError {
    fn from(e: FeePaymentError) -> Self {
        Self::FeePayment(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        Self::Validation(e.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(e: QueryRejection) -> Self {
        Self::Validation(e.body_text())
    }
}
