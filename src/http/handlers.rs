//! API handlers.
//!
//! Query routes forward to the ledger. Payment routes sign with the issuer
//! wallet loaded at startup; request bodies never carry key material.

use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::http::response::ApiError;
use crate::http::server::AppState;
use crate::ledger::{Account, CurrencyAmount, CurrencyCode, DecimalValue, LedgerError, TxHash, Wallet};
use crate::payments::{PaymentIntent, SubmissionRecord, SubmissionResult};

const DEFAULT_LIST_LIMIT: usize = 50;
const MAX_LIST_LIMIT: usize = 500;

#[derive(Debug, Deserialize)]
pub struct AccountQuery {
    pub account: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BalanceQuery {
    pub account: Option<String>,
    /// Defaults to the configured currency.
    pub currency: Option<String>,
    /// Defaults to the issuer wallet.
    pub issuer: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PaymentRequest {
    pub destination: Option<String>,
    pub amount: Option<DecimalValue>,
    pub currency: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ProcessPaymentRequest {
    pub account: Option<String>,
    pub amount: Option<DecimalValue>,
    pub fee: Option<DecimalValue>,
    #[serde(rename = "feeWallet")]
    pub fee_wallet: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct PaymentResponse {
    pub status: &'static str,
    pub tx_hash: TxHash,
    pub validated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine_result: Option<String>,
}

impl From<SubmissionResult> for PaymentResponse {
    fn from(result: SubmissionResult) -> Self {
        Self {
            status: "success",
            tx_hash: result.hash,
            validated: result.validated,
            engine_result: result.engine_result,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FeePaymentResponse {
    pub status: &'static str,
    pub tx_hash: TxHash,
    pub fee_tx_hash: TxHash,
    pub validated: bool,
}

#[derive(Debug, Serialize)]
pub struct TransactionStatus {
    pub hash: TxHash,
    /// Current ledger view; `None` when the server does not know the hash.
    pub ledger: Option<Value>,
    pub record: Option<SubmissionRecord>,
}

fn required<T>(value: Option<T>, field: &str) -> Result<T, ApiError> {
    value.ok_or_else(|| ApiError::Validation(format!("{} is required", field)))
}

fn parse_account(value: Option<String>, field: &str) -> Result<Account, ApiError> {
    let text = required(value.filter(|v| !v.trim().is_empty()), field)?;
    Account::parse(&text).map_err(|e| ApiError::Validation(format!("{}: {}", field, e)))
}

fn parse_currency(value: Option<String>, default: &CurrencyCode) -> Result<CurrencyCode, ApiError> {
    match value {
        Some(text) => CurrencyCode::parse(&text).map_err(|e| ApiError::Validation(e.to_string())),
        None => Ok(default.clone()),
    }
}

fn issuer(state: &AppState) -> Result<Arc<Wallet>, ApiError> {
    state.issuer.clone().ok_or(ApiError::IssuerUnavailable)
}

fn issued(wallet: &Wallet, currency: &CurrencyCode, value: DecimalValue) -> CurrencyAmount {
    CurrencyAmount::new(currency.clone(), value, wallet.account().clone())
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let (pending, timed_out) = state.registry.unresolved();
    let issuer = state.issuer.as_ref().map(|w| w.account().to_string());

    match state.ledger.server_info().await {
        Ok(info) => (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "version": env!("CARGO_PKG_VERSION"),
                "server_state": info.pointer("/info/server_state").cloned().unwrap_or(Value::Null),
                "issuer": issuer,
                "unresolved": {"pending": pending, "timed_out": timed_out},
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "unavailable",
                "version": env!("CARGO_PKG_VERSION"),
                "error": e.to_string(),
                "issuer": issuer,
            })),
        ),
    }
}

/// GET /api/account_info?account=
pub async fn account_info(
    State(state): State<AppState>,
    query: Result<Query<AccountQuery>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let Query(query) = query?;
    let account = parse_account(query.account, "account")?;
    Ok(Json(state.ledger.account_info(&account).await?))
}

/// GET /api/account_lines?account=
pub async fn account_lines(
    State(state): State<AppState>,
    query: Result<Query<AccountQuery>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let Query(query) = query?;
    let account = parse_account(query.account, "account")?;
    Ok(Json(state.ledger.account_lines(&account).await?))
}

/// GET /api/balance?account=&currency=&issuer=
///
/// Balance of one issued currency, `"0"` when the account has no such line.
pub async fn balance(
    State(state): State<AppState>,
    query: Result<Query<BalanceQuery>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let Query(query) = query?;
    let account = parse_account(query.account, "account")?;
    let currency = parse_currency(query.currency, &state.currency)?;
    let issuer = match query.issuer {
        Some(text) => parse_account(Some(text), "issuer")?,
        None => match &state.issuer {
            Some(wallet) => wallet.account().clone(),
            None => return Err(ApiError::Validation("issuer is required".to_string())),
        },
    };

    let lines = state.ledger.account_lines(&account).await?;
    let balance = find_line_balance(&lines, &currency, &issuer).unwrap_or_else(|| "0".to_string());

    Ok(Json(json!({
        "account": account,
        "currency": currency,
        "issuer": issuer,
        "balance": balance,
    })))
}

/// Balance of the line with `issuer` in `currency`, as the ledger reported it.
pub fn find_line_balance(lines: &Value, currency: &CurrencyCode, issuer: &Account) -> Option<String> {
    lines
        .get("lines")?
        .as_array()?
        .iter()
        .find(|line| {
            line.get("currency").and_then(Value::as_str) == Some(currency.as_str())
                && line.get("account").and_then(Value::as_str) == Some(issuer.as_str())
        })
        .and_then(|line| line.get("balance"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Token that fires at the payment deadline, before the route timeout, so the
/// orchestrator can still answer with the hashes it holds. Dropping the guard
/// when the handler returns stops the timer.
fn payment_deadline(state: &AppState) -> (CancellationToken, DropGuard) {
    let token = state.orchestrator.cancellation().child_token();
    let deadline = state.config.payment_deadline();
    let timer = token.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = timer.cancelled() => {}
            _ = tokio::time::sleep(deadline) => {
                tracing::warn!(deadline_ms = deadline.as_millis() as u64, "Payment deadline reached");
                timer.cancel();
            }
        }
    });
    (token.clone(), token.drop_guard())
}

/// POST /api/payments
pub async fn create_payment(
    State(state): State<AppState>,
    body: Result<Json<PaymentRequest>, JsonRejection>,
) -> Result<Json<PaymentResponse>, ApiError> {
    let Json(request) = body?;
    let destination = parse_account(request.destination, "destination")?;
    let value = required(request.amount, "amount")?;
    let currency = parse_currency(request.currency, &state.currency)?;
    let wallet = issuer(&state)?;

    let intent = PaymentIntent::new(
        wallet.account().clone(),
        destination,
        issued(&wallet, &currency, value),
    );
    let (deadline, _guard) = payment_deadline(&state);
    let result = state.orchestrator.pay_cancellable(&intent, &wallet, &deadline).await?;
    Ok(Json(result.into()))
}

/// POST /api/process_payment
///
/// Sends `amount` to `account`, then `fee` to `feeWallet`. The legs are
/// independent; see [`PaymentOrchestrator::pay_with_fee`](crate::payments::PaymentOrchestrator::pay_with_fee).
pub async fn process_payment(
    State(state): State<AppState>,
    body: Result<Json<ProcessPaymentRequest>, JsonRejection>,
) -> Result<Json<FeePaymentResponse>, ApiError> {
    let Json(request) = body?;
    let account = parse_account(request.account, "account")?;
    let amount = required(request.amount, "amount")?;
    let fee = required(request.fee, "fee")?;
    let fee_wallet = parse_account(request.fee_wallet, "feeWallet")?;
    let wallet = issuer(&state)?;

    let principal = PaymentIntent::new(
        wallet.account().clone(),
        account,
        issued(&wallet, &state.currency, amount),
    );
    let fee = PaymentIntent::new(
        wallet.account().clone(),
        fee_wallet,
        issued(&wallet, &state.currency, fee),
    );

    let (deadline, _guard) = payment_deadline(&state);
    let receipt = state
        .orchestrator
        .pay_with_fee_cancellable(&principal, &fee, &wallet, &deadline)
        .await?;
    Ok(Json(FeePaymentResponse {
        status: "success",
        validated: receipt.principal.validated && receipt.fee.validated,
        tx_hash: receipt.principal.hash,
        fee_tx_hash: receipt.fee.hash,
    }))
}

/// GET /api/transactions?limit=
pub async fn list_transactions(
    State(state): State<AppState>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<Vec<SubmissionRecord>>, ApiError> {
    let Query(query) = query?;
    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT).min(MAX_LIST_LIMIT);
    Ok(Json(state.registry.recent(limit)))
}

/// GET /api/transactions/{hash}
pub async fn get_transaction(
    State(state): State<AppState>,
    Path(hash): Path<String>,
) -> Result<Json<TransactionStatus>, ApiError> {
    let hash = TxHash::parse(&hash)?;
    let record = state.registry.get(&hash);

    let ledger = match state.ledger.lookup(&hash).await {
        Ok(lookup) => Some(json!({
            "status": lookup.status,
            "engine_result": lookup.engine_result,
        })),
        Err(LedgerError::Rpc { code, .. }) if code == "txnNotFound" => {
            if record.is_none() {
                return Err(ApiError::NotFound(format!("transaction {} not found", hash)));
            }
            None
        }
        Err(e) => return Err(e.into()),
    };

    Ok(Json(TransactionStatus { hash, ledger, record }))
}

/// POST /api/transactions/{hash}/confirm
///
/// Runs the confirmation loop again, for hashes that timed out earlier.
pub async fn confirm_transaction(
    State(state): State<AppState>,
    Path(hash): Path<String>,
) -> Result<Json<PaymentResponse>, ApiError> {
    let hash = TxHash::parse(&hash)?;
    let (deadline, _guard) = payment_deadline(&state);
    let result = state.orchestrator.confirm_cancellable(&hash, &deadline).await?;
    Ok(Json(result.into()))
}
