use clap::{Parser, Subcommand, ValueEnum};
use serde_json::{json, Value};
use std::sync::Arc;

use ledger_gateway::config::LedgerConfig;
use ledger_gateway::ledger::wallet::ISSUER_SEED_ENV_VAR;
use ledger_gateway::ledger::{
    Account, CurrencyAmount, CurrencyCode, DecimalValue, KeyAlgorithm, LedgerClient, RpcLedgerClient, TxHash,
    Wallet, ASF_DISALLOW_XRP,
};
use ledger_gateway::observability::logging;
use ledger_gateway::payments::{OrchestratorConfig, PaymentIntent, PaymentOrchestrator, TrustLineIntent};

#[derive(Parser)]
#[command(name = "ledger-cli")]
#[command(about = "One-shot XRP Ledger operations for token issuers", long_about = None)]
struct Cli {
    /// Ledger server; http(s):// or ws(s)://
    #[arg(short, long, env = "LEDGER_RPC_URL", default_value = "https://s.altnet.rippletest.net:51234")]
    url: String,

    /// Log level for the client internals.
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or inspect wallets
    Wallet {
        #[command(subcommand)]
        command: WalletCommands,
    },
    /// Send an issued currency and wait for validation
    Pay {
        /// Variable holding the sender's seed
        #[arg(long, default_value = ISSUER_SEED_ENV_VAR)]
        seed_env: String,
        #[arg(long)]
        destination: Account,
        #[arg(long)]
        amount: DecimalValue,
        #[arg(long, default_value = "VIP")]
        currency: CurrencyCode,
        /// Defaults to the sender
        #[arg(long)]
        issuer: Option<Account>,
    },
    /// Create, change or (with limit 0) remove a trust line
    TrustSet {
        /// Variable holding the trusting account's seed
        #[arg(long)]
        seed_env: String,
        #[arg(long)]
        issuer: Account,
        #[arg(long, default_value = "VIP")]
        currency: CurrencyCode,
        #[arg(long)]
        limit: DecimalValue,
    },
    /// Turn on an account flag; defaults to DisallowXRP for issuers
    AccountSet {
        /// Variable holding the account's seed
        #[arg(long, default_value = ISSUER_SEED_ENV_VAR)]
        seed_env: String,
        #[arg(long, default_value_t = ASF_DISALLOW_XRP)]
        flag: u32,
    },
    /// Wait for a submitted transaction to validate
    Confirm {
        hash: TxHash,
        #[arg(long, default_value_t = 30)]
        max_attempts: u32,
        #[arg(long, default_value_t = 2000)]
        delay_ms: u64,
    },
    /// Show account_info for an address
    AccountInfo { account: Account },
    /// Show account_lines for an address
    AccountLines { account: Account },
}

#[derive(Subcommand)]
enum WalletCommands {
    /// Generate a new seed and print it with its address
    New {
        #[arg(long, value_enum, default_value_t = Algorithm::Ed25519)]
        algorithm: Algorithm,
    },
    /// Print the address of the seed held in an environment variable
    Address {
        #[arg(long, default_value = ISSUER_SEED_ENV_VAR)]
        seed_env: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Algorithm {
    Ed25519,
    Secp256k1,
}

impl From<Algorithm> for KeyAlgorithm {
    fn from(algorithm: Algorithm) -> Self {
        match algorithm {
            Algorithm::Ed25519 => KeyAlgorithm::Ed25519,
            Algorithm::Secp256k1 => KeyAlgorithm::Secp256k1,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    logging::init(&cli.log_level);

    match cli.command {
        Commands::Wallet { command } => match command {
            WalletCommands::New { algorithm } => {
                let seed = Wallet::generate_seed(algorithm.into());
                let wallet = Wallet::from_seed(&seed)?;
                print_json(&json!({
                    "seed": seed.as_str(),
                    "address": wallet.account(),
                    "public_key": hex::encode_upper(wallet.public_key()),
                }))?;
            }
            WalletCommands::Address { seed_env } => {
                let wallet = Wallet::from_env(&seed_env)?;
                print_json(&json!({
                    "address": wallet.account(),
                    "algorithm": wallet.algorithm(),
                }))?;
            }
        },
        Commands::Pay {
            seed_env,
            destination,
            amount,
            currency,
            issuer,
        } => {
            let wallet = Wallet::from_env(&seed_env)?;
            let issuer = issuer.unwrap_or_else(|| wallet.account().clone());
            let intent = PaymentIntent::new(
                wallet.account().clone(),
                destination,
                CurrencyAmount::new(currency, amount, issuer),
            );
            let orchestrator = orchestrator(&cli.url).await?;
            let result = orchestrator.pay(&intent, &wallet).await?;
            print_json(&json!({ "tx_hash": result.hash, "validated": result.validated, "engine_result": result.engine_result }))?;
        }
        Commands::TrustSet {
            seed_env,
            issuer,
            currency,
            limit,
        } => {
            let wallet = Wallet::from_env(&seed_env)?;
            let intent = TrustLineIntent {
                account: wallet.account().clone(),
                limit: CurrencyAmount::new(currency, limit, issuer),
            };
            let orchestrator = orchestrator(&cli.url).await?;
            let result = orchestrator.set_trust_line(&intent, &wallet).await?;
            print_json(&json!({ "tx_hash": result.hash, "validated": result.validated, "engine_result": result.engine_result }))?;
        }
        Commands::AccountSet { seed_env, flag } => {
            let wallet = Wallet::from_env(&seed_env)?;
            let orchestrator = orchestrator(&cli.url).await?;
            let result = orchestrator.set_account_flag(wallet.account(), flag, &wallet).await?;
            print_json(&json!({ "tx_hash": result.hash, "validated": result.validated, "engine_result": result.engine_result }))?;
        }
        Commands::Confirm {
            hash,
            max_attempts,
            delay_ms,
        } => {
            let orchestrator = orchestrator(&cli.url).await?;
            let result = orchestrator
                .confirm(
                    &hash,
                    max_attempts,
                    std::time::Duration::from_millis(delay_ms),
                    &tokio_util::sync::CancellationToken::new(),
                )
                .await?;
            print_json(&json!({ "tx_hash": result.hash, "validated": result.validated, "engine_result": result.engine_result }))?;
        }
        Commands::AccountInfo { account } => {
            let client = client(&cli.url).await?;
            print_json(&client.account_info(&account).await?)?;
        }
        Commands::AccountLines { account } => {
            let client = client(&cli.url).await?;
            print_json(&client.account_lines(&account).await?)?;
        }
    }

    Ok(())
}

async fn client(url: &str) -> Result<RpcLedgerClient, Box<dyn std::error::Error>> {
    let config = LedgerConfig {
        rpc_url: url.to_string(),
        ..LedgerConfig::default()
    };
    Ok(RpcLedgerClient::new(config).await?)
}

async fn orchestrator(url: &str) -> Result<PaymentOrchestrator, Box<dyn std::error::Error>> {
    let client = client(url).await?;
    let config = OrchestratorConfig {
        max_fee: ledger_gateway::ledger::Drops(client.config().max_fee_drops),
        last_ledger_offset: client.config().last_ledger_offset,
        ..OrchestratorConfig::default()
    };
    Ok(PaymentOrchestrator::new(Arc::new(client), config))
}

fn print_json(value: &Value) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
