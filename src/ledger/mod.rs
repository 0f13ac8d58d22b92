//! Ledger integration subsystem.
//!
//! # Data Flow
//! ```text
//! Environment (issuer seed) + config (RPC URLs)
//!     → wallet.rs (seed decoding, key derivation, signing)
//!     → transaction.rs (Payment / TrustSet, validate, sign)
//!         → codec.rs (canonical field encoding, hashing)
//!     → client.rs (submit, lookup, account state over transport.rs)
//! ```
//!
//! # Security Constraints
//! - Seeds ONLY from environment variables
//! - Never log seeds or private keys
//! - All RPC calls have configurable timeouts
//! - Gateway starts even when the ledger is unreachable

pub mod address;
pub mod amount;
pub mod client;
pub mod codec;
pub mod transaction;
pub mod transport;
pub mod types;
pub mod wallet;

pub use address::Account;
pub use amount::{CurrencyAmount, CurrencyCode, DecimalValue, Drops};
pub use client::{LedgerClient, RpcLedgerClient};
pub use transaction::{SignedTransaction, TransactionKind, UnsignedTransaction, ASF_DISALLOW_XRP};
pub use types::{LedgerConfig, LedgerError, LedgerResult, LookupStatus, TxHash, TxLookup};
pub use wallet::{KeyAlgorithm, Wallet};
