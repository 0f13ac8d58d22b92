//! Ledger Gateway Library
//!
//! Token issuance over the XRP Ledger: address and amount types, a canonical
//! transaction codec, wallets, a failover JSON-RPC client, and the payment
//! orchestrator behind the HTTP API.

// Core subsystems
pub mod config;
pub mod http;
pub mod ledger;
pub mod payments;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use config::GatewayConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
