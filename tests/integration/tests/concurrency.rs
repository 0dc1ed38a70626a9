//! Integration test: single-flight per payment reference and independent
//! progress across references that share one signing identity.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;

use fiatmint_core::{FiatAmount, MintState, OrchestratorConfig, PaymentReference, RecipientAddress};
use fiatmint_ledger::{SimulatedLedger, U256};
use fiatmint_node::Storage;
use fiatmint_orchestrator::{
    MemoryPaymentRegistry, MemoryRecordStore, MintOrchestrator, OrchestrationError,
    PaymentRegistry, PaymentStatus, RecordStore, RegistryVerifier, SettledPayment,
};

fn recipient() -> RecipientAddress {
    format!("0x{}", "2".repeat(40)).parse().unwrap()
}

fn nth_recipient(i: usize) -> RecipientAddress {
    format!("0x{:040x}", i + 1).parse().unwrap()
}

async fn settle(registry: &dyn PaymentRegistry, reference: &str, amount: i64) {
    settle_for(registry, reference, amount, recipient()).await;
}

async fn settle_for(
    registry: &dyn PaymentRegistry,
    reference: &str,
    amount: i64,
    recipient: RecipientAddress,
) {
    registry
        .record_payment(SettledPayment::new(
            PaymentReference::new(reference).unwrap(),
            FiatAmount::new(Decimal::from(amount), 2).unwrap(),
            Some(recipient),
            PaymentStatus::Completed,
        ))
        .await
        .unwrap();
}

fn quick_escrow_polls() -> OrchestratorConfig {
    OrchestratorConfig {
        escrow_poll_ms: 5,
        ..OrchestratorConfig::default()
    }
}

#[tokio::test]
async fn test_concurrent_requests_for_one_reference_mint_once() {
    let ledger = Arc::new(SimulatedLedger::new(6).with_confirm_delay(Duration::from_millis(50)));
    let records = Arc::new(MemoryRecordStore::new());
    let registry = Arc::new(MemoryPaymentRegistry::new());
    settle(registry.as_ref(), "SAME-1", 500).await;

    let orchestrator = Arc::new(MintOrchestrator::new(
        records.clone(),
        Arc::new(RegistryVerifier::new(registry.clone())),
        ledger.clone(),
        OrchestratorConfig::default(),
    ));

    let recipient = recipient().to_string();
    let tasks = (0..8).map(|_| {
        let orchestrator = orchestrator.clone();
        let recipient = recipient.clone();
        tokio::spawn(async move {
            orchestrator
                .submit("SAME-1", Decimal::from(500), &recipient)
                .await
        })
    });
    let results: Vec<_> = futures::future::join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let released = results.iter().filter(|r| r.is_ok()).count();
    let in_progress = results
        .iter()
        .filter(|r| matches!(r, Err(OrchestrationError::InProgress(_))))
        .count();
    assert_eq!(released, 1);
    assert_eq!(in_progress, 7);
    assert_eq!(ledger.mint_calls(), 1);
    assert_eq!(ledger.release_calls(), 1);

    // Once settled, every further request replays the same hash.
    let winner = results.into_iter().find_map(Result::ok).unwrap();
    let replay = orchestrator
        .submit("SAME-1", Decimal::from(500), &recipient)
        .await
        .unwrap();
    assert!(replay.replayed);
    assert_eq!(replay.tx_hash, winner.tx_hash);
}

#[tokio::test]
async fn test_distinct_references_progress_independently() {
    let dir = std::env::temp_dir().join(format!("fiatmint-it-{}", uuid::Uuid::now_v7()));
    let storage = Arc::new(Storage::open(&dir).unwrap());
    let ledger = Arc::new(SimulatedLedger::new(18).with_confirm_delay(Duration::from_millis(5)));

    // Every reference pays the same recipient, so their escrows take turns.
    const COUNT: usize = 12;
    for i in 0..COUNT {
        settle(storage.as_ref(), &format!("REF-{}", i), 10 + i as i64).await;
    }

    let orchestrator = Arc::new(MintOrchestrator::new(
        storage.clone(),
        Arc::new(RegistryVerifier::new(storage.clone())),
        ledger.clone(),
        quick_escrow_polls(),
    ));

    let recipient = recipient().to_string();
    let tasks = (0..COUNT).map(|i| {
        let orchestrator = orchestrator.clone();
        let recipient = recipient.clone();
        tokio::spawn(async move {
            orchestrator
                .submit(&format!("REF-{}", i), Decimal::from(10 + i as i64), &recipient)
                .await
        })
    });
    let outcomes: Vec<_> = futures::future::join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    // Each release has its own transaction; the shared signer never reused a nonce.
    let hashes: HashSet<_> = outcomes.iter().map(|o| o.tx_hash.clone()).collect();
    assert_eq!(hashes.len(), COUNT);
    assert_eq!(ledger.submitted_txs(), COUNT * 2);

    for i in 0..COUNT {
        let reference = PaymentReference::new(&format!("REF-{}", i)).unwrap();
        let record = storage.get(&reference).await.unwrap().unwrap();
        assert_eq!(record.state, MintState::Released);
        let payment = storage.get_payment(&reference).await.unwrap().unwrap();
        assert!(payment.consumed);
    }

    let total: u64 = (0..COUNT as u64).map(|i| 10 + i).sum();
    let one_token = U256::from(10u64).pow(U256::from(18u64));
    let shared: RecipientAddress = recipient.parse().unwrap();
    assert_eq!(ledger.balance_of(shared.address()), U256::from(total) * one_token);
    assert_eq!(ledger.escrowed(shared.address()), U256::ZERO);

    drop(orchestrator);
    drop(storage);
    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn test_references_for_distinct_recipients_run_in_parallel() {
    let ledger = Arc::new(SimulatedLedger::new(6).with_confirm_delay(Duration::from_millis(5)));
    let records = Arc::new(MemoryRecordStore::new());
    let registry = Arc::new(MemoryPaymentRegistry::new());

    const COUNT: usize = 8;
    for i in 0..COUNT {
        settle_for(registry.as_ref(), &format!("OWN-{}", i), 3, nth_recipient(i)).await;
    }

    let orchestrator = Arc::new(MintOrchestrator::new(
        records.clone(),
        Arc::new(RegistryVerifier::new(registry.clone())),
        ledger.clone(),
        OrchestratorConfig {
            // Nobody should ever wait on another recipient's escrow.
            escrow_wait_ms: 0,
            ..OrchestratorConfig::default()
        },
    ));

    let tasks = (0..COUNT).map(|i| {
        let orchestrator = orchestrator.clone();
        let recipient = nth_recipient(i).to_string();
        tokio::spawn(async move {
            orchestrator
                .submit(&format!("OWN-{}", i), Decimal::from(3), &recipient)
                .await
        })
    });
    let outcomes: Vec<_> = futures::future::join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    let hashes: HashSet<_> = outcomes.iter().map(|o| o.tx_hash.clone()).collect();
    assert_eq!(hashes.len(), COUNT);
    assert_eq!(ledger.submitted_txs(), COUNT * 2);
    for i in 0..COUNT {
        assert_eq!(ledger.balance_of(nth_recipient(i).address()), U256::from(3_000_000u64));
    }
}
