//! Submit-and-confirm orchestration.
//!
//! # Responsibilities
//! - Build, autofill, validate and sign Payment / TrustSet / AccountSet transactions
//! - Submit them and accept only `tesSUCCESS`
//! - Poll for validation with a bounded number of attempts
//! - Run the two-leg "payment with side fee" without hiding the first hash
//! - Stop waiting when a caller's deadline token fires, keeping every hash
//!
//! # Data Flow
//! ```text
//! PaymentIntent + Wallet
//!     → submit()   (lock → account_state + fee → sign → submit → unlock)
//!     → confirm()  (lookup, sleep, lookup, ... until validated / ceiling / cancel)
//!     → SubmissionResult
//! ```

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::config::GatewayConfig;
use crate::ledger::{
    Account, Drops, LedgerClient, LookupStatus, TransactionKind, TxHash, UnsignedTransaction, Wallet,
};
use crate::observability::metrics;
use crate::payments::registry::{RecordStatus, SubmissionRecord, SubmissionRegistry};
use crate::payments::types::{
    FeePaymentError, FeePaymentReceipt, PaymentError, PaymentIntent, PaymentLeg, SubmissionResult,
    TrustLineIntent,
};

/// How long to wait for validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmationPolicy {
    /// Lookups before giving up.
    pub max_attempts: u32,
    /// Pause between lookups.
    pub delay: Duration,
}

impl Default for ConfirmationPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 30,
            delay: Duration::from_secs(2),
        }
    }
}

/// Orchestrator settings, passed explicitly at construction.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub confirmation: ConfirmationPolicy,
    /// Upper bound on the fee paid per transaction.
    pub max_fee: Drops,
    /// Ledgers after the current one in which the transaction may be included.
    pub last_ledger_offset: u32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            confirmation: ConfirmationPolicy::default(),
            max_fee: Drops(2_000),
            last_ledger_offset: 20,
        }
    }
}

impl OrchestratorConfig {
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self {
            confirmation: ConfirmationPolicy {
                max_attempts: config.confirmation.max_attempts,
                delay: Duration::from_millis(config.confirmation.delay_ms),
            },
            max_fee: Drops(config.ledger.max_fee_drops),
            last_ledger_offset: config.ledger.last_ledger_offset,
        }
    }
}

/// Submits transactions and waits for them to validate.
pub struct PaymentOrchestrator {
    client: Arc<dyn LedgerClient>,
    config: OrchestratorConfig,
    /// Serializes autofill → sign → submit so one account's sequence is never
    /// handed out twice.
    submit_lock: Mutex<()>,
    registry: Option<SubmissionRegistry>,
    cancel: CancellationToken,
}

impl PaymentOrchestrator {
    pub fn new(client: Arc<dyn LedgerClient>, config: OrchestratorConfig) -> Self {
        Self {
            client,
            config,
            submit_lock: Mutex::new(()),
            registry: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Record every obtained hash in `registry`.
    pub fn with_registry(mut self, registry: SubmissionRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Abort confirmation waits started by [`pay`](Self::pay) when `token` fires.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Root token; per-request deadlines should be children of it.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn client(&self) -> &Arc<dyn LedgerClient> {
        &self.client
    }

    pub fn registry(&self) -> Option<&SubmissionRegistry> {
        self.registry.as_ref()
    }

    pub fn policy(&self) -> ConfirmationPolicy {
        self.config.confirmation
    }

    /// Build, sign and submit a payment. Returns the provisional hash.
    pub async fn submit(&self, intent: &PaymentIntent, wallet: &Wallet) -> Result<TxHash, PaymentError> {
        self.submit_transaction(payment_tx(intent), wallet, &self.cancel).await
    }

    /// Sign and submit `tx`.
    ///
    /// `cancel` is honoured until the blob is sent. Once it is, the call runs
    /// to completion so the outcome is never lost. A broken connection after
    /// sending yields [`PaymentError::SubmissionIndeterminate`] with the local
    /// hash, and the record stays pending for reconciliation.
    async fn submit_transaction(
        &self,
        tx: UnsignedTransaction,
        wallet: &Wallet,
        cancel: &CancellationToken,
    ) -> Result<TxHash, PaymentError> {
        tx.validate_intent()?;
        if wallet.account() != &tx.account {
            return Err(PaymentError::Signing(format!(
                "wallet {} does not control account {}",
                wallet.account(),
                tx.account
            )));
        }

        let kind = tx.kind.type_name();
        let (submitted, local_hash) = {
            let prepare = async {
                let guard = self.submit_lock.lock().await;
                let state = self.client.account_state(&tx.account).await?;
                let network_fee = self.client.fee().await?;
                Ok::<_, PaymentError>((guard, state, network_fee))
            };
            let (_guard, state, network_fee) = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!(kind, account = %tx.account, "Cancelled before submission");
                    return Err(PaymentError::Cancelled);
                }
                prepared = prepare => prepared?,
            };

            let fee = network_fee.min(self.config.max_fee);
            if fee < network_fee {
                tracing::warn!(network_fee = %network_fee, max_fee = %self.config.max_fee, "Fee capped below open ledger fee");
            }

            let last_ledger = state.ledger_current_index.saturating_add(self.config.last_ledger_offset);
            let signed = tx.clone().autofill(fee, state.sequence, last_ledger).sign(wallet)?;

            tracing::debug!(
                kind,
                account = %tx.account,
                sequence = state.sequence,
                fee = %fee,
                last_ledger_sequence = last_ledger,
                "Submitting transaction"
            );
            (self.client.submit(&signed.blob).await, signed.hash)
        };

        let response = match submitted {
            Ok(response) => response,
            Err(error) if error.may_have_been_delivered() => {
                tracing::warn!(hash = %local_hash, kind, error = %error, "Submission outcome unknown");
                metrics::record_submission(kind, "indeterminate");
                if let Some(registry) = &self.registry {
                    registry.record(submission_record(&tx, local_hash.clone()));
                }
                return Err(PaymentError::SubmissionIndeterminate {
                    hash: local_hash,
                    error,
                });
            }
            Err(error) => return Err(error.into()),
        };

        // Prefer the server's hash; it is what lookups will be keyed on.
        let hash = response.hash.clone().unwrap_or(local_hash);
        metrics::record_submission(kind, &response.engine_result);

        if let Some(registry) = &self.registry {
            registry.record(submission_record(&tx, hash.clone()));
        }

        if !response.is_success() {
            tracing::warn!(
                hash = %hash,
                engine_result = %response.engine_result,
                message = %response.engine_result_message,
                "Submission rejected"
            );
            self.update_record(&hash, RecordStatus::Rejected, Some(response.engine_result.clone()));
            return Err(PaymentError::SubmissionRejected {
                engine_result: response.engine_result,
                message: response.engine_result_message,
                hash: Some(hash),
            });
        }

        tracing::info!(hash = %hash, kind, "Transaction submitted");
        Ok(hash)
    }

    /// Poll `lookup` until the transaction validates.
    ///
    /// Makes at most `max_attempts` lookups, `delay` apart, with no pause after
    /// the last one. Lookup errors are expected right after submission and do
    /// not end the loop. Cancellation ends it early as a timeout, also while a
    /// lookup is in flight.
    pub async fn confirm(
        &self,
        hash: &TxHash,
        max_attempts: u32,
        delay: Duration,
        cancel: &CancellationToken,
    ) -> Result<SubmissionResult, PaymentError> {
        let mut attempts = 0;

        while attempts < max_attempts {
            if cancel.is_cancelled() {
                break;
            }
            attempts += 1;

            let lookup = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!(hash = %hash, attempts, "Confirmation cancelled");
                    break;
                }
                lookup = self.client.lookup(hash) => lookup,
            };

            match lookup {
                Ok(lookup) => match lookup.status {
                    LookupStatus::Validated => {
                        tracing::info!(hash = %hash, attempts, "Transaction validated");
                        metrics::record_confirmation("validated", attempts);
                        self.update_record(hash, RecordStatus::Validated, lookup.engine_result.clone());
                        return Ok(SubmissionResult {
                            hash: hash.clone(),
                            validated: true,
                            engine_result: lookup.engine_result,
                            raw: lookup.raw,
                        });
                    }
                    LookupStatus::Failed => {
                        let engine_result = lookup.engine_result.unwrap_or_default();
                        tracing::warn!(hash = %hash, engine_result = %engine_result, "Transaction failed in validated ledger");
                        metrics::record_confirmation("failed", attempts);
                        self.update_record(hash, RecordStatus::Failed, Some(engine_result.clone()));
                        return Err(PaymentError::LedgerFailure {
                            hash: hash.clone(),
                            engine_result,
                        });
                    }
                    LookupStatus::Pending => {
                        tracing::debug!(hash = %hash, attempt = attempts, "Transaction pending");
                    }
                },
                Err(e) => {
                    tracing::debug!(hash = %hash, attempt = attempts, error = %e, "Lookup failed, retrying");
                    metrics::record_lookup_error();
                }
            }

            if attempts == max_attempts {
                break;
            }
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!(hash = %hash, attempts, "Confirmation cancelled");
                    break;
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }

        tracing::warn!(hash = %hash, attempts, "Transaction not validated in time");
        metrics::record_confirmation("timeout", attempts);
        self.update_record(hash, RecordStatus::TimedOut, None);
        Err(PaymentError::ConfirmationTimeout {
            hash: hash.clone(),
            attempts,
        })
    }

    /// [`confirm`](Self::confirm) with the configured policy and cancellation.
    pub async fn confirm_with_policy(&self, hash: &TxHash) -> Result<SubmissionResult, PaymentError> {
        self.confirm_cancellable(hash, &self.cancel).await
    }

    /// [`confirm`](Self::confirm) with the configured policy, ending at `cancel`.
    pub async fn confirm_cancellable(
        &self,
        hash: &TxHash,
        cancel: &CancellationToken,
    ) -> Result<SubmissionResult, PaymentError> {
        let policy = self.config.confirmation;
        self.confirm(hash, policy.max_attempts, policy.delay, cancel).await
    }

    /// Submit then confirm a payment.
    pub async fn pay(&self, intent: &PaymentIntent, wallet: &Wallet) -> Result<SubmissionResult, PaymentError> {
        self.pay_cancellable(intent, wallet, &self.cancel).await
    }

    /// [`pay`](Self::pay) that gives up when `cancel` fires. Before submission
    /// that is [`PaymentError::Cancelled`]; after, a confirmation timeout
    /// carrying the hash.
    pub async fn pay_cancellable(
        &self,
        intent: &PaymentIntent,
        wallet: &Wallet,
        cancel: &CancellationToken,
    ) -> Result<SubmissionResult, PaymentError> {
        let hash = self.submit_transaction(payment_tx(intent), wallet, cancel).await?;
        self.confirm_cancellable(&hash, cancel).await
    }

    /// Pay `principal`, then `fee`, as two independent payments.
    ///
    /// Nothing is rolled back. If the fee leg fails, the error still carries
    /// the confirmed principal payment.
    pub async fn pay_with_fee(
        &self,
        principal: &PaymentIntent,
        fee: &PaymentIntent,
        wallet: &Wallet,
    ) -> Result<FeePaymentReceipt, FeePaymentError> {
        self.pay_with_fee_cancellable(principal, fee, wallet, &self.cancel).await
    }

    /// [`pay_with_fee`](Self::pay_with_fee) under a caller deadline. Both legs
    /// share `cancel`; a fee leg cut short still reports the principal.
    pub async fn pay_with_fee_cancellable(
        &self,
        principal: &PaymentIntent,
        fee: &PaymentIntent,
        wallet: &Wallet,
        cancel: &CancellationToken,
    ) -> Result<FeePaymentReceipt, FeePaymentError> {
        let principal_result = self
            .pay_cancellable(principal, wallet, cancel)
            .await
            .map_err(|error| FeePaymentError {
                leg: PaymentLeg::Principal,
                principal: None,
                error,
            })?;

        match self.pay_cancellable(fee, wallet, cancel).await {
            Ok(fee_result) => Ok(FeePaymentReceipt {
                principal: principal_result,
                fee: fee_result,
            }),
            Err(error) => {
                tracing::error!(
                    principal_hash = %principal_result.hash,
                    error = %error,
                    "Fee leg failed after principal payment validated"
                );
                Err(FeePaymentError {
                    leg: PaymentLeg::Fee,
                    principal: Some(principal_result),
                    error,
                })
            }
        }
    }

    /// Submit then confirm a TrustSet.
    pub async fn set_trust_line(
        &self,
        intent: &TrustLineIntent,
        wallet: &Wallet,
    ) -> Result<SubmissionResult, PaymentError> {
        let tx = UnsignedTransaction::trust_set(intent.account.clone(), intent.limit.clone());
        let hash = self.submit_transaction(tx, wallet, &self.cancel).await?;
        self.confirm_with_policy(&hash).await
    }

    /// Submit then confirm an AccountSet turning on `set_flag` for `account`.
    pub async fn set_account_flag(
        &self,
        account: &Account,
        set_flag: u32,
        wallet: &Wallet,
    ) -> Result<SubmissionResult, PaymentError> {
        let tx = UnsignedTransaction::account_set(account.clone(), set_flag);
        let hash = self.submit_transaction(tx, wallet, &self.cancel).await?;
        self.confirm_with_policy(&hash).await
    }

    fn update_record(&self, hash: &TxHash, status: RecordStatus, engine_result: Option<String>) {
        if let Some(registry) = &self.registry {
            registry.update_status(hash, status, engine_result);
        }
    }
}

fn payment_tx(intent: &PaymentIntent) -> UnsignedTransaction {
    UnsignedTransaction::payment(
        intent.source.clone(),
        intent.destination.clone(),
        intent.amount.clone(),
    )
}

fn submission_record(tx: &UnsignedTransaction, hash: TxHash) -> SubmissionRecord {
    let (destination, amount) = match &tx.kind {
        TransactionKind::Payment { destination, amount } => (
            Some(destination.to_string()),
            format!("{} {}", amount.value, amount.currency),
        ),
        TransactionKind::TrustSet { limit } => (
            Some(limit.issuer.to_string()),
            format!("{} {}", limit.value, limit.currency),
        ),
        TransactionKind::AccountSet { set_flag } => (None, format!("SetFlag {}", set_flag)),
    };
    SubmissionRecord::new(hash, tx.kind.type_name(), tx.account.to_string(), destination, amount)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::types::{AccountState, LedgerResult, SubmitResponse, TxLookup};
    use crate::ledger::{Account, CurrencyAmount, CurrencyCode, DecimalValue, KeyAlgorithm};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::Mutex as StdMutex;

    const GENESIS_SEED: &str = "snoPBrXtMeMyMHUVTgbuqAfg1SUTb";
    const DESTINATION: &str = "rLUEXYuLiQptky37CqLcm9USQpPiz5rkpD";

    /// Accepts everything and validates on first lookup; records submitted blobs.
    struct AcceptingLedger {
        fee: u64,
        blobs: StdMutex<Vec<String>>,
    }

    #[async_trait]
    impl LedgerClient for AcceptingLedger {
        async fn submit(&self, tx_blob: &str) -> LedgerResult<SubmitResponse> {
            self.blobs.lock().unwrap().push(tx_blob.to_string());
            Ok(SubmitResponse {
                engine_result: "tesSUCCESS".into(),
                engine_result_message: String::new(),
                hash: None,
                raw: Value::Null,
            })
        }
        async fn lookup(&self, _hash: &TxHash) -> LedgerResult<TxLookup> {
            Ok(TxLookup::from_result(json!({"validated": true})))
        }
        async fn account_state(&self, _account: &Account) -> LedgerResult<AccountState> {
            Ok(AccountState {
                sequence: 5,
                ledger_current_index: 100,
            })
        }
        async fn fee(&self) -> LedgerResult<Drops> {
            Ok(Drops(self.fee))
        }
        async fn account_info(&self, _account: &Account) -> LedgerResult<Value> {
            Ok(Value::Null)
        }
        async fn account_lines(&self, _account: &Account) -> LedgerResult<Value> {
            Ok(Value::Null)
        }
        async fn server_info(&self) -> LedgerResult<Value> {
            Ok(Value::Null)
        }
    }

    fn intent(wallet: &Wallet) -> PaymentIntent {
        let issuer = wallet.account().clone();
        PaymentIntent::new(
            issuer.clone(),
            Account::parse(DESTINATION).unwrap(),
            CurrencyAmount::new(
                CurrencyCode::parse("VIP").unwrap(),
                DecimalValue::parse("500").unwrap(),
                issuer,
            ),
        )
    }

    fn ledger(fee: u64) -> Arc<AcceptingLedger> {
        Arc::new(AcceptingLedger {
            fee,
            blobs: StdMutex::new(Vec::new()),
        })
    }

    #[test]
    fn test_default_policy() {
        let policy = ConfirmationPolicy::default();
        assert_eq!(policy.max_attempts, 30);
        assert_eq!(policy.delay, Duration::from_secs(2));
    }

    #[test]
    fn test_config_from_gateway_config() {
        let mut gateway = GatewayConfig::default();
        gateway.confirmation.max_attempts = 3;
        gateway.confirmation.delay_ms = 250;
        gateway.ledger.max_fee_drops = 100;

        let config = OrchestratorConfig::from_config(&gateway);
        assert_eq!(config.confirmation.max_attempts, 3);
        assert_eq!(config.confirmation.delay, Duration::from_millis(250));
        assert_eq!(config.max_fee, Drops(100));
    }

    #[tokio::test]
    async fn test_fee_is_capped() {
        let stub = ledger(50_000);
        let config = OrchestratorConfig {
            max_fee: Drops(12),
            ..OrchestratorConfig::default()
        };
        let orchestrator = PaymentOrchestrator::new(stub.clone(), config);
        let wallet = Wallet::from_seed(GENESIS_SEED).unwrap();

        orchestrator.submit(&intent(&wallet), &wallet).await.unwrap();

        let blobs = stub.blobs.lock().unwrap();
        // Fee field header 0x68 followed by the native amount of 12 drops.
        assert!(blobs[0].contains("68400000000000000C"));
    }

    #[tokio::test]
    async fn test_local_hash_used_when_server_omits_it() {
        let stub = ledger(10);
        let orchestrator = PaymentOrchestrator::new(stub, OrchestratorConfig::default());
        let wallet = Wallet::from_seed(GENESIS_SEED).unwrap();

        let hash = orchestrator.submit(&intent(&wallet), &wallet).await.unwrap();
        assert_eq!(hash.as_str().len(), 64);
    }

    #[tokio::test]
    async fn test_foreign_source_account_is_signing_error() {
        let stub = ledger(10);
        let orchestrator = PaymentOrchestrator::new(stub.clone(), OrchestratorConfig::default());
        let wallet = Wallet::from_seed(GENESIS_SEED).unwrap();
        let mut foreign = intent(&wallet);
        let stranger = Wallet::from_seed(&Wallet::generate_seed(KeyAlgorithm::Ed25519)).unwrap();
        foreign.source = stranger.account().clone();

        let err = orchestrator.submit(&foreign, &wallet).await.unwrap_err();
        assert!(matches!(err, PaymentError::Signing(_)));
        assert!(stub.blobs.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_account_set_records_flag() {
        let stub = ledger(10);
        let registry = SubmissionRegistry::new(None);
        let orchestrator =
            PaymentOrchestrator::new(stub.clone(), OrchestratorConfig::default()).with_registry(registry.clone());
        let wallet = Wallet::from_seed(GENESIS_SEED).unwrap();

        let result = orchestrator
            .set_account_flag(wallet.account(), crate::ledger::ASF_DISALLOW_XRP, &wallet)
            .await
            .unwrap();
        let blobs = stub.blobs.lock().unwrap();
        assert!(blobs[0].starts_with("120003"));
        assert!(blobs[0].contains("202100000008"));

        let record = registry.get(&result.hash).unwrap();
        assert_eq!(record.kind, "AccountSet");
        assert_eq!(record.amount, "SetFlag 8");
        assert!(record.destination.is_none());
    }

    #[tokio::test]
    async fn test_cancelled_before_submission_sends_nothing() {
        let stub = ledger(10);
        let orchestrator = PaymentOrchestrator::new(stub.clone(), OrchestratorConfig::default());
        let wallet = Wallet::from_seed(GENESIS_SEED).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = orchestrator
            .pay_cancellable(&intent(&wallet), &wallet, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::Cancelled));
        assert!(stub.blobs.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_registry_tracks_outcome() {
        let registry = SubmissionRegistry::new(None);
        let orchestrator =
            PaymentOrchestrator::new(ledger(10), OrchestratorConfig::default()).with_registry(registry.clone());
        let wallet = Wallet::from_seed(GENESIS_SEED).unwrap();

        let result = orchestrator.pay(&intent(&wallet), &wallet).await.unwrap();
        let record = registry.get(&result.hash).unwrap();
        assert_eq!(record.status, RecordStatus::Validated);
        assert_eq!(record.amount, "500 VIP");
    }
}
