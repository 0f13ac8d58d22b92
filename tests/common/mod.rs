//! Shared utilities for integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use axum::{http::StatusCode, routing::post, Json, Router};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio::time::Instant;

use ledger_gateway::ledger::types::{AccountState, SubmitResponse};
use ledger_gateway::ledger::{
    Account, CurrencyAmount, CurrencyCode, DecimalValue, Drops, LedgerClient, LedgerError, LedgerResult,
    TxHash, TxLookup, Wallet,
};
use ledger_gateway::payments::PaymentIntent;

/// Genesis account seed; its address is [`GENESIS_ACCOUNT`].
pub const GENESIS_SEED: &str = "snoPBrXtMeMyMHUVTgbuqAfg1SUTb";
pub const GENESIS_ACCOUNT: &str = "rHb9CJAWyB4rj91VRWn96DkukG4bwdtyTh";
pub const DESTINATION: &str = "rLUEXYuLiQptky37CqLcm9USQpPiz5rkpD";
pub const FEE_WALLET: &str = "rPT1Sjq2YGrBMTttX4GZHjKu9dyfzbpAYe";

/// What the stub answers to one `submit`.
#[derive(Debug, Clone)]
pub enum SubmitStep {
    /// `tesSUCCESS` with this server-reported hash.
    Accept(&'static str),
    /// Engine result other than success, reported with `hash`.
    Reject { engine_result: &'static str, hash: &'static str },
    /// Connection failure before anything was sent.
    Unreachable,
    /// Connection dropped after the blob was sent; the outcome is unknown.
    Lost,
}

/// What the stub answers to one `tx` lookup.
#[derive(Debug, Clone)]
pub enum LookupStep {
    Pending,
    Validated,
    /// Validated with a failure engine result.
    Failed(&'static str),
    /// `txnNotFound`, as returned right after submission.
    NotFound,
}

/// Scripted [`LedgerClient`]. Each call pops the next step; an exhausted
/// submit script accepts with a fixed hash, an exhausted lookup script stays
/// pending.
#[derive(Default)]
pub struct ScriptedLedger {
    submits: Mutex<VecDeque<SubmitStep>>,
    lookups: Mutex<VecDeque<LookupStep>>,
    pub submit_calls: AtomicUsize,
    pub lookup_calls: AtomicUsize,
    /// Time of each lookup, for checking poll spacing.
    pub lookup_times: Mutex<Vec<Instant>>,
    pub blobs: Mutex<Vec<String>>,
    pub lines: Mutex<Value>,
    pub server_down: bool,
}

impl ScriptedLedger {
    pub fn new(submits: Vec<SubmitStep>, lookups: Vec<LookupStep>) -> Arc<Self> {
        Arc::new(Self {
            submits: Mutex::new(submits.into()),
            lookups: Mutex::new(lookups.into()),
            lines: Mutex::new(json!({ "lines": [] })),
            ..Self::default()
        })
    }

    /// A stub whose `server_info` fails.
    pub fn down() -> Arc<Self> {
        Arc::new(Self {
            server_down: true,
            ..Self::default()
        })
    }

    pub fn submits(&self) -> usize {
        self.submit_calls.load(Ordering::SeqCst)
    }

    pub fn lookups(&self) -> usize {
        self.lookup_calls.load(Ordering::SeqCst)
    }

    pub fn set_lines(&self, lines: Value) {
        *self.lines.lock().unwrap() = lines;
    }
}

#[async_trait]
impl LedgerClient for ScriptedLedger {
    async fn submit(&self, tx_blob: &str) -> LedgerResult<SubmitResponse> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        self.blobs.lock().unwrap().push(tx_blob.to_string());
        let step = self
            .submits
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(SubmitStep::Accept("ABC123"));

        match step {
            SubmitStep::Accept(hash) => Ok(SubmitResponse {
                engine_result: "tesSUCCESS".into(),
                engine_result_message: "The transaction was applied.".into(),
                hash: Some(TxHash::parse(hash).unwrap()),
                raw: json!({ "engine_result": "tesSUCCESS", "tx_json": { "hash": hash } }),
            }),
            SubmitStep::Reject { engine_result, hash } => Ok(SubmitResponse {
                engine_result: engine_result.into(),
                engine_result_message: "Rejected by stub.".into(),
                hash: Some(TxHash::parse(hash).unwrap()),
                raw: json!({ "engine_result": engine_result }),
            }),
            SubmitStep::Unreachable => Err(LedgerError::Unavailable("stub unreachable".into())),
            SubmitStep::Lost => Err(LedgerError::Transport("connection reset by stub".into())),
        }
    }

    async fn lookup(&self, hash: &TxHash) -> LedgerResult<TxLookup> {
        self.lookup_calls.fetch_add(1, Ordering::SeqCst);
        self.lookup_times.lock().unwrap().push(Instant::now());
        let step = self.lookups.lock().unwrap().pop_front().unwrap_or(LookupStep::Pending);

        match step {
            LookupStep::Pending => Ok(TxLookup::from_result(json!({ "hash": hash, "validated": false }))),
            LookupStep::Validated => Ok(TxLookup::from_result(json!({
                "hash": hash,
                "validated": true,
                "meta": { "TransactionResult": "tesSUCCESS" }
            }))),
            LookupStep::Failed(code) => Ok(TxLookup::from_result(json!({
                "hash": hash,
                "validated": true,
                "meta": { "TransactionResult": code }
            }))),
            LookupStep::NotFound => Err(LedgerError::Rpc {
                code: "txnNotFound".into(),
                message: "Transaction not found.".into(),
            }),
        }
    }

    async fn account_state(&self, _account: &Account) -> LedgerResult<AccountState> {
        Ok(AccountState {
            sequence: 7,
            ledger_current_index: 1_000,
        })
    }

    async fn fee(&self) -> LedgerResult<Drops> {
        Ok(Drops(12))
    }

    async fn account_info(&self, account: &Account) -> LedgerResult<Value> {
        Ok(json!({
            "account_data": { "Account": account, "Balance": "1000000000", "Sequence": 7 },
            "validated": true
        }))
    }

    async fn account_lines(&self, account: &Account) -> LedgerResult<Value> {
        let mut lines = self.lines.lock().unwrap().clone();
        lines["account"] = json!(account);
        Ok(lines)
    }

    async fn server_info(&self) -> LedgerResult<Value> {
        if self.server_down {
            return Err(LedgerError::Unavailable("stub unreachable".into()));
        }
        Ok(json!({ "info": { "server_state": "full", "build_version": "stub" } }))
    }
}

pub fn issuer_wallet() -> Wallet {
    Wallet::from_seed(GENESIS_SEED).unwrap()
}

pub fn account(text: &str) -> Account {
    Account::parse(text).unwrap()
}

/// Issuer → `destination` payment of `value` VIP.
pub fn vip_payment(wallet: &Wallet, destination: &str, value: &str) -> PaymentIntent {
    PaymentIntent::new(
        wallet.account().clone(),
        account(destination),
        CurrencyAmount::new(
            CurrencyCode::parse("VIP").unwrap(),
            DecimalValue::parse(value).unwrap(),
            wallet.account().clone(),
        ),
    )
}

/// Start a mock JSON-RPC server. `answer` maps (method, params) to the
/// HTTP status and the `result` object.
pub async fn start_mock_rpc<F>(answer: F) -> SocketAddr
where
    F: Fn(&str, &Value) -> (StatusCode, Value) + Send + Sync + 'static,
{
    let answer = Arc::new(answer);
    let app = Router::new().route(
        "/",
        post(move |Json(body): Json<Value>| {
            let answer = answer.clone();
            async move {
                let method = body["method"].as_str().unwrap_or_default().to_string();
                let params = body["params"][0].clone();
                let (status, result) = answer(&method, &params);
                (status, Json(json!({ "result": result })))
            }
        }),
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}
