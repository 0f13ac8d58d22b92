//! Submit-and-confirm behavior against a scripted ledger.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use ledger_gateway::ledger::{CurrencyAmount, CurrencyCode, DecimalValue, TxHash, ASF_DISALLOW_XRP};
use ledger_gateway::payments::{
    ConfirmationPolicy, ErrorKind, OrchestratorConfig, PaymentError, PaymentLeg, PaymentOrchestrator,
    RecordStatus, SubmissionRegistry, TrustLineIntent,
};

mod common;
use common::{LookupStep, ScriptedLedger, SubmitStep, DESTINATION, FEE_WALLET};

fn orchestrator(ledger: Arc<ScriptedLedger>, max_attempts: u32, delay: Duration) -> PaymentOrchestrator {
    let config = OrchestratorConfig {
        confirmation: ConfirmationPolicy { max_attempts, delay },
        ..OrchestratorConfig::default()
    };
    PaymentOrchestrator::new(ledger, config)
}

#[tokio::test(start_paused = true)]
async fn test_validated_on_first_lookup() {
    let ledger = ScriptedLedger::new(vec![SubmitStep::Accept("ABC123")], vec![LookupStep::Validated]);
    let orchestrator = orchestrator(ledger.clone(), 30, Duration::from_secs(2));
    let wallet = common::issuer_wallet();

    let hash = orchestrator
        .submit(&common::vip_payment(&wallet, DESTINATION, "500"), &wallet)
        .await
        .unwrap();
    let result = orchestrator.confirm_with_policy(&hash).await.unwrap();

    assert!(result.validated);
    assert_eq!(result.hash, hash);
    assert_eq!(result.hash.as_str(), "ABC123");
    assert_eq!(result.engine_result.as_deref(), Some("tesSUCCESS"));
    assert_eq!(ledger.lookups(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_never_validates_times_out_after_max_attempts() {
    let ledger = ScriptedLedger::new(vec![SubmitStep::Accept("DEAD01")], vec![]);
    let delay = Duration::from_secs(2);
    let orchestrator = orchestrator(ledger.clone(), 5, delay);
    let wallet = common::issuer_wallet();

    let err = orchestrator
        .pay(&common::vip_payment(&wallet, DESTINATION, "500"), &wallet)
        .await
        .unwrap_err();

    match &err {
        PaymentError::ConfirmationTimeout { hash, attempts } => {
            assert_eq!(hash.as_str(), "DEAD01");
            assert_eq!(*attempts, 5);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err.kind(), ErrorKind::ConfirmationTimeout);
    assert_eq!(ledger.lookups(), 5);

    let times = ledger.lookup_times.lock().unwrap().clone();
    for pair in times.windows(2) {
        assert_eq!(pair[1] - pair[0], delay);
    }
}

#[tokio::test(start_paused = true)]
async fn test_no_sleep_after_last_attempt() {
    let ledger = ScriptedLedger::new(vec![], vec![]);
    let delay = Duration::from_secs(2);
    let orchestrator = orchestrator(ledger.clone(), 3, delay);
    let hash = TxHash::parse("ABC123").unwrap();

    let start = tokio::time::Instant::now();
    let err = orchestrator
        .confirm(&hash, 3, delay, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, PaymentError::ConfirmationTimeout { .. }));
    assert_eq!(start.elapsed(), delay * 2);
}

#[tokio::test(start_paused = true)]
async fn test_transient_lookup_errors_are_retried() {
    let ledger = ScriptedLedger::new(
        vec![SubmitStep::Accept("FEED02")],
        vec![
            LookupStep::NotFound,
            LookupStep::NotFound,
            LookupStep::NotFound,
            LookupStep::Validated,
        ],
    );
    let orchestrator = orchestrator(ledger.clone(), 10, Duration::from_secs(1));
    let wallet = common::issuer_wallet();

    let result = orchestrator
        .pay(&common::vip_payment(&wallet, DESTINATION, "500"), &wallet)
        .await
        .unwrap();

    assert!(result.validated);
    assert_eq!(result.hash.as_str(), "FEED02");
    assert_eq!(ledger.lookups(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_rejected_submission_skips_confirmation() {
    let ledger = ScriptedLedger::new(
        vec![SubmitStep::Reject {
            engine_result: "tecNO_LINE",
            hash: "BAD003",
        }],
        vec![LookupStep::Validated],
    );
    let orchestrator = orchestrator(ledger.clone(), 30, Duration::from_secs(2));
    let wallet = common::issuer_wallet();

    let err = orchestrator
        .pay(&common::vip_payment(&wallet, DESTINATION, "500"), &wallet)
        .await
        .unwrap_err();

    match &err {
        PaymentError::SubmissionRejected { engine_result, hash, .. } => {
            assert_eq!(engine_result, "tecNO_LINE");
            assert_eq!(hash.as_ref().map(TxHash::as_str), Some("BAD003"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(ledger.lookups(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_fee_leg_failure_exposes_principal_hash() {
    let ledger = ScriptedLedger::new(
        vec![
            SubmitStep::Accept("AAAA01"),
            SubmitStep::Reject {
                engine_result: "tecPATH_DRY",
                hash: "BBBB02",
            },
        ],
        vec![LookupStep::Validated],
    );
    let orchestrator = orchestrator(ledger.clone(), 30, Duration::from_secs(2));
    let wallet = common::issuer_wallet();

    let err = orchestrator
        .pay_with_fee(
            &common::vip_payment(&wallet, DESTINATION, "500"),
            &common::vip_payment(&wallet, FEE_WALLET, "5"),
            &wallet,
        )
        .await
        .unwrap_err();

    assert_eq!(err.leg, PaymentLeg::Fee);
    let principal = err.principal.as_ref().unwrap();
    assert_eq!(principal.hash.as_str(), "AAAA01");
    assert!(principal.validated);
    assert_eq!(err.error.hash().map(TxHash::as_str), Some("BBBB02"));
    assert_eq!(ledger.submits(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_principal_leg_failure_sends_no_fee() {
    let ledger = ScriptedLedger::new(vec![SubmitStep::Unreachable], vec![]);
    let orchestrator = orchestrator(ledger.clone(), 30, Duration::from_secs(2));
    let wallet = common::issuer_wallet();

    let err = orchestrator
        .pay_with_fee(
            &common::vip_payment(&wallet, DESTINATION, "500"),
            &common::vip_payment(&wallet, FEE_WALLET, "5"),
            &wallet,
        )
        .await
        .unwrap_err();

    assert_eq!(err.leg, PaymentLeg::Principal);
    assert!(err.principal.is_none());
    assert_eq!(err.error.kind(), ErrorKind::LedgerUnavailable);
    assert_eq!(ledger.submits(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_both_legs_confirmed() {
    let ledger = ScriptedLedger::new(
        vec![SubmitStep::Accept("AAAA01"), SubmitStep::Accept("CCCC03")],
        vec![LookupStep::Validated, LookupStep::Pending, LookupStep::Validated],
    );
    let orchestrator = orchestrator(ledger.clone(), 30, Duration::from_secs(2));
    let wallet = common::issuer_wallet();

    let receipt = orchestrator
        .pay_with_fee(
            &common::vip_payment(&wallet, DESTINATION, "500"),
            &common::vip_payment(&wallet, FEE_WALLET, "5"),
            &wallet,
        )
        .await
        .unwrap();

    assert_eq!(receipt.principal.hash.as_str(), "AAAA01");
    assert_eq!(receipt.fee.hash.as_str(), "CCCC03");
    assert!(receipt.principal.validated && receipt.fee.validated);
}

#[tokio::test(start_paused = true)]
async fn test_decimal_amount_survives_exactly() {
    let ledger = ScriptedLedger::new(vec![], vec![LookupStep::Validated]);
    let registry = SubmissionRegistry::default();
    let orchestrator = orchestrator(ledger.clone(), 30, Duration::from_secs(2)).with_registry(registry.clone());
    let wallet = common::issuer_wallet();

    let amount: DecimalValue = serde_json::from_str("1000000000").unwrap();
    assert_eq!(amount.as_str(), "1000000000");
    let mut intent = common::vip_payment(&wallet, DESTINATION, "1");
    intent.amount = CurrencyAmount::new(CurrencyCode::parse("VIP").unwrap(), amount, wallet.account().clone());

    let result = orchestrator.pay(&intent, &wallet).await.unwrap();

    let record = registry.get(&result.hash).unwrap();
    assert_eq!(record.amount, "1000000000 VIP");
    assert_eq!(record.status, RecordStatus::Validated);
    assert_eq!(serde_json::to_value(&intent.amount).unwrap()["value"], "1000000000");
}

#[tokio::test(start_paused = true)]
async fn test_pending_pending_validated_scenario() {
    let ledger = ScriptedLedger::new(
        vec![SubmitStep::Accept("ABC123")],
        vec![LookupStep::Pending, LookupStep::Pending, LookupStep::Validated],
    );
    let orchestrator = orchestrator(ledger.clone(), 30, Duration::from_secs(2));
    let wallet = common::issuer_wallet();

    let result = orchestrator
        .pay(&common::vip_payment(&wallet, DESTINATION, "500"), &wallet)
        .await
        .unwrap();

    assert_eq!(result.hash.as_str(), "ABC123");
    assert!(result.validated);
    assert_eq!(ledger.lookups(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_validated_failure_is_terminal() {
    let ledger = ScriptedLedger::new(
        vec![SubmitStep::Accept("FA11ED")],
        vec![LookupStep::Pending, LookupStep::Failed("tecPATH_PARTIAL")],
    );
    let registry = SubmissionRegistry::default();
    let orchestrator = orchestrator(ledger.clone(), 30, Duration::from_secs(2)).with_registry(registry.clone());
    let wallet = common::issuer_wallet();

    let err = orchestrator
        .pay(&common::vip_payment(&wallet, DESTINATION, "500"), &wallet)
        .await
        .unwrap_err();

    match &err {
        PaymentError::LedgerFailure { hash, engine_result } => {
            assert_eq!(hash.as_str(), "FA11ED");
            assert_eq!(engine_result, "tecPATH_PARTIAL");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(ledger.lookups(), 2);
    let record = registry.get(err.hash().unwrap()).unwrap();
    assert_eq!(record.status, RecordStatus::Failed);
}

#[tokio::test(start_paused = true)]
async fn test_lost_submission_reports_local_hash() {
    let ledger = ScriptedLedger::new(vec![SubmitStep::Lost], vec![]);
    let registry = SubmissionRegistry::default();
    let orchestrator = orchestrator(ledger.clone(), 30, Duration::from_secs(2)).with_registry(registry.clone());
    let wallet = common::issuer_wallet();

    let err = orchestrator
        .pay_with_fee(
            &common::vip_payment(&wallet, DESTINATION, "500"),
            &common::vip_payment(&wallet, FEE_WALLET, "5"),
            &wallet,
        )
        .await
        .unwrap_err();

    assert_eq!(err.leg, PaymentLeg::Principal);
    let hash = match &err.error {
        PaymentError::SubmissionIndeterminate { hash, .. } => hash.clone(),
        other => panic!("unexpected error: {other:?}"),
    };
    assert_eq!(hash.as_str().len(), 64);
    assert_eq!(err.error.kind(), ErrorKind::LedgerUnavailable);
    assert_eq!(err.error.hash(), Some(&hash));

    // Kept pending for reconciliation, not marked rejected.
    assert_eq!(registry.get(&hash).unwrap().status, RecordStatus::Pending);
    assert_eq!(ledger.submits(), 1);
    assert_eq!(ledger.lookups(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_token_skips_lookups() {
    let ledger = ScriptedLedger::new(vec![], vec![]);
    let orchestrator = orchestrator(ledger.clone(), 30, Duration::from_secs(2));
    let hash = TxHash::parse("ABC123").unwrap();
    let token = CancellationToken::new();
    token.cancel();

    let err = orchestrator.confirm_cancellable(&hash, &token).await.unwrap_err();
    assert!(matches!(err, PaymentError::ConfirmationTimeout { attempts: 0, .. }));
    assert_eq!(ledger.lookups(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_issuer_disallows_xrp() {
    let ledger = ScriptedLedger::new(vec![SubmitStep::Accept("ACC5E7")], vec![LookupStep::Validated]);
    let orchestrator = orchestrator(ledger.clone(), 30, Duration::from_secs(2));
    let wallet = common::issuer_wallet();

    let result = orchestrator
        .set_account_flag(wallet.account(), ASF_DISALLOW_XRP, &wallet)
        .await
        .unwrap();

    assert_eq!(result.hash.as_str(), "ACC5E7");
    let blobs = ledger.blobs.lock().unwrap();
    assert!(blobs[0].starts_with("120003"));
    assert!(blobs[0].contains("202100000008"));
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_ends_wait_as_timeout() {
    let ledger = ScriptedLedger::new(vec![], vec![]);
    let orchestrator = Arc::new(orchestrator(ledger.clone(), 30, Duration::from_secs(2)));
    let hash = TxHash::parse("ABC123").unwrap();
    let token = CancellationToken::new();

    let task = {
        let orchestrator = orchestrator.clone();
        let token = token.clone();
        let hash = hash.clone();
        tokio::spawn(async move { orchestrator.confirm(&hash, 30, Duration::from_secs(2), &token).await })
    };

    tokio::time::sleep(Duration::from_secs(5)).await;
    token.cancel();
    let err = task.await.unwrap().unwrap_err();

    match err {
        PaymentError::ConfirmationTimeout { hash: h, attempts } => {
            assert_eq!(h, hash);
            assert!(attempts < 30);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(ledger.lookups() < 30);
}

#[tokio::test(start_paused = true)]
async fn test_self_payment_rejected_before_submit() {
    let ledger = ScriptedLedger::new(vec![], vec![]);
    let orchestrator = orchestrator(ledger.clone(), 30, Duration::from_secs(2));
    let wallet = common::issuer_wallet();
    let issuer = wallet.account().to_string();

    let err = orchestrator
        .pay(&common::vip_payment(&wallet, &issuer, "500"), &wallet)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ValidationError);
    assert!(err.hash().is_none());
    assert_eq!(ledger.submits(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_trust_line_signed_by_holder() {
    let ledger = ScriptedLedger::new(vec![SubmitStep::Accept("7105E7")], vec![LookupStep::Validated]);
    let orchestrator = orchestrator(ledger.clone(), 30, Duration::from_secs(2));
    let holder = ledger_gateway::ledger::Wallet::from_seed(&ledger_gateway::ledger::Wallet::generate_seed(
        ledger_gateway::ledger::KeyAlgorithm::Ed25519,
    ))
    .unwrap();
    let issuer = common::issuer_wallet();

    let intent = TrustLineIntent {
        account: holder.account().clone(),
        limit: CurrencyAmount::new(
            CurrencyCode::parse("VIP").unwrap(),
            DecimalValue::parse("1000000000").unwrap(),
            issuer.account().clone(),
        ),
    };
    let result = orchestrator.set_trust_line(&intent, &holder).await.unwrap();
    assert_eq!(result.hash.as_str(), "7105E7");

    let err = orchestrator.set_trust_line(&intent, &issuer).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SigningError);
    assert_eq!(ledger.submits(), 1);
}
