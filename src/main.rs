//! Ledger Gateway
//!
//! HTTP service that issues a token on an XRP Ledger network: it signs
//! payments with an issuer wallet, submits them over JSON-RPC and waits for
//! validation.
//!
//! # Architecture Overview
//!
//! ```text
//!                  ┌──────────────────────────────────────────────────────┐
//!                  │                    LEDGER GATEWAY                    │
//!                  │                                                      │
//!   Client ────────┼─▶ http (axum) ──▶ handlers ──▶ payments orchestrator │
//!                  │                       │              │               │
//!                  │                       ▼              ▼               │
//!                  │                 ledger client ◀── codec + wallet     │
//!                  │                       │                              │
//!                  └───────────────────────┼──────────────────────────────┘
//!                                          ▼
//!                                 rippled (http / ws)
//! ```

use clap::Parser;
use std::path::PathBuf;
use tokio::net::TcpListener;

use ledger_gateway::config::{loader, load_config};
use ledger_gateway::http::HttpServer;
use ledger_gateway::lifecycle::{self, signals, Shutdown};
use ledger_gateway::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "ledger-gateway", version)]
#[command(about = "HTTP gateway for issuing tokens on the XRP Ledger", long_about = None)]
struct Args {
    /// TOML configuration file. Defaults apply when omitted.
    #[arg(short, long, env = "LEDGER_GATEWAY_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => loader::default_config()?,
    };

    logging::init(&config.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "ledger-gateway starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        rpc_url = %config.ledger.rpc_url,
        failover_urls = config.ledger.failover_urls.len(),
        currency = %config.payments.currency,
        max_attempts = config.confirmation.max_attempts,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = Shutdown::new();
    signals::spawn_signal_handler(shutdown.clone());

    let bind_address = config.listener.bind_address.clone();
    let state = lifecycle::initialize(config, &shutdown).await?;

    let listener = TcpListener::bind(&bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    HttpServer::new(state, shutdown).run(listener).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
