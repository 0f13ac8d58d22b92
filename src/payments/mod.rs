//! Token payments: submission, confirmation and bookkeeping.
//!
//! # Data Flow
//! ```text
//! HTTP handler / CLI
//!     → types.rs (PaymentIntent, TrustLineIntent)
//!     → orchestrator.rs (submit → confirm, two-leg fee payments)
//!         → ledger::LedgerClient
//!     → registry.rs (hash + status of every submission)
//! ```

pub mod orchestrator;
pub mod registry;
pub mod types;

pub use orchestrator::{ConfirmationPolicy, OrchestratorConfig, PaymentOrchestrator};
pub use registry::{RecordStatus, SubmissionRecord, SubmissionRegistry};
pub use types::{
    ErrorKind, FeePaymentError, FeePaymentReceipt, PaymentError, PaymentIntent, PaymentLeg,
    SubmissionResult, TrustLineIntent,
};
