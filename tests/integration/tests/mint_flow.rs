//! Integration test: a payment flows from the webhook through verification,
//! escrow mint and release, backed by RocksDB storage and the simulated ledger.

use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use fiatmint_core::{MintState, OrchestratorConfig, PaymentReference};
use fiatmint_ledger::{Address, ChainError, FailurePoint, SimulatedLedger, U256};
use fiatmint_node::api::build_router;
use fiatmint_node::{webhook, AppState, Storage};
use fiatmint_orchestrator::{MintOrchestrator, RecordStore, RegistryVerifier};

const SECRET: &str = "integration-secret";

struct Harness {
    state: Arc<AppState>,
    ledger: Arc<SimulatedLedger>,
    storage: Arc<Storage>,
    dir: PathBuf,
}

impl Harness {
    fn new() -> Self {
        let dir = std::env::temp_dir().join(format!("fiatmint-it-{}", uuid::Uuid::now_v7()));
        let storage = Arc::new(Storage::open(&dir).unwrap());
        Self::with_storage(storage, dir)
    }

    fn with_storage(storage: Arc<Storage>, dir: PathBuf) -> Self {
        let ledger = Arc::new(SimulatedLedger::new(18));
        let verifier = Arc::new(RegistryVerifier::new(storage.clone()));
        let orchestrator = Arc::new(MintOrchestrator::new(
            storage.clone(),
            verifier,
            ledger.clone(),
            OrchestratorConfig::default(),
        ));
        let state = Arc::new(AppState::new(
            Ok(orchestrator),
            storage.clone(),
            storage.clone(),
            Some(SECRET),
            "simulated",
        ));
        Self {
            state,
            ledger,
            storage,
            dir,
        }
    }

    async fn call(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let body = body.map(|b| b.to_string()).unwrap_or_default();
        self.send(method, uri, body, None).await
    }

    async fn webhook(&self, body: Value) -> (StatusCode, Value) {
        let body = body.to_string();
        let key = webhook::signing_key(SECRET);
        let signature = webhook::sign(&key, body.as_bytes());
        self.send("POST", "/webhook", body, Some(signature)).await
    }

    async fn send(
        &self,
        method: &str,
        uri: &str,
        body: String,
        signature: Option<String>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(sig) = signature {
            builder = builder.header(webhook::SIGNATURE_HEADER, sig);
        }
        let response = build_router(self.state.clone())
            .oneshot(builder.body(Body::from(body)).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.dir);
    }
}

fn ones() -> String {
    format!("0x{}", "1".repeat(40))
}

fn one_token() -> U256 {
    U256::from(10u64).pow(U256::from(18u64))
}

fn paid(reference: &str, amount: Value) -> Value {
    json!({
        "paymentReference": reference,
        "amount": amount,
        "recipientAddress": ones(),
        "status": "completed",
    })
}

#[tokio::test]
async fn test_webhook_mints_and_releases() {
    let h = Harness::new();

    let (status, body) = h.webhook(paid("BNK1", json!(100000))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["paymentReference"], "BNK1");
    let tx_hash = body["txHash"].as_str().unwrap().to_string();
    assert!(tx_hash.starts_with("0x"));

    let recipient: Address = ones().parse().unwrap();
    assert_eq!(h.ledger.balance_of(recipient), U256::from(100000u64) * one_token());
    assert_eq!(h.ledger.escrowed(recipient), U256::ZERO);

    let reference = PaymentReference::new("BNK1").unwrap();
    let record = h.storage.get(&reference).await.unwrap().unwrap();
    assert_eq!(record.state, MintState::Released);
    assert_eq!(record.transaction_hash.as_deref(), Some(tx_hash.as_str()));
    assert_eq!(record.lease_expires_at, None);
}

#[tokio::test]
async fn test_mint_after_registration_then_replay() {
    let h = Harness::new();
    let (status, _) = h
        .call("POST", "/api/v1/payments", Some(paid("BNK2", json!("250.75"))))
        .await;
    assert_eq!(status, StatusCode::OK);

    let request = json!({
        "amount": 250.75,
        "recipientAddress": ones(),
        "paymentReference": "BNK2",
    });
    let (status, first) = h.call("POST", "/mint", Some(request.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["replayed"], false);

    let calls = h.ledger.chain_calls();
    let (status, second) = h.call("POST", "/mint", Some(request)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["txHash"], first["txHash"]);
    assert_eq!(second["replayed"], true);
    assert_eq!(h.ledger.chain_calls(), calls);
}

#[tokio::test]
async fn test_unpaid_reference_is_rejected_without_chain_calls() {
    let h = Harness::new();
    let request = json!({
        "amount": 10,
        "recipientAddress": ones(),
        "paymentReference": "NOPE",
    });
    let (status, body) = h.call("POST", "/mint", Some(request)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "Payment not verified");
    assert_eq!(body["reason"], "not found");
    assert_eq!(h.ledger.chain_calls(), 0);

    let (_, record) = h.call("GET", "/api/v1/records/NOPE", None).await;
    assert_eq!(record["state"], "VerificationFailed");
}

#[tokio::test]
async fn test_invalid_requests_leave_no_record() {
    let h = Harness::new();
    let cases = [
        (json!({"amount": 0, "recipientAddress": ones(), "paymentReference": "B1"}), "Invalid amount"),
        (json!({"amount": 5, "recipientAddress": "0x123", "paymentReference": "B1"}), "Invalid recipient address"),
        (json!({"amount": 5, "recipientAddress": ones(), "paymentReference": ""}), "Payment reference is required"),
    ];
    for (body, message) in cases {
        let (status, response) = h.call("POST", "/mint", Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(response["error"], message);
    }

    let (_, list) = h.call("GET", "/api/v1/records", None).await;
    assert_eq!(list["count"], 0);
    assert_eq!(h.ledger.chain_calls(), 0);
}

#[tokio::test]
async fn test_incomplete_payment_webhook_mints_nothing() {
    let h = Harness::new();
    let mut event = paid("BNK5", json!(10));
    event["status"] = json!("pending");

    let (status, body) = h.webhook(event).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Payment not completed, no tokens minted");
    assert_eq!(h.ledger.chain_calls(), 0);
}

#[tokio::test]
async fn test_unsigned_webhook_is_refused() {
    let h = Harness::new();
    let (status, _) = h.call("POST", "/webhook", Some(paid("BNK6", json!(10)))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(h.ledger.chain_calls(), 0);
}

#[tokio::test]
async fn test_release_failure_is_resumed_by_process() {
    let h = Harness::new();
    h.ledger.inject_failure(
        FailurePoint::ReleaseSubmit,
        ChainError::RpcUnavailable("connection reset".into()),
    );

    let (status, body) = h.webhook(paid("BNK3", json!(42))).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body["escrowTxHash"].as_str().unwrap().starts_with("0x"));

    let (_, record) = h.call("GET", "/api/v1/records/BNK3", None).await;
    assert_eq!(record["state"], "Minting");
    assert_eq!(record["escrow_confirmed"], true);

    let mints = h.ledger.mint_calls();
    let (status, body) = h.call("POST", "/api/v1/records/BNK3/process", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    // Escrow is not minted twice.
    assert_eq!(h.ledger.mint_calls(), mints);

    let recipient: Address = ones().parse().unwrap();
    assert_eq!(h.ledger.balance_of(recipient), U256::from(42u64) * one_token());
}

#[tokio::test]
async fn test_released_record_survives_restart() {
    let dir = std::env::temp_dir().join(format!("fiatmint-it-{}", uuid::Uuid::now_v7()));
    let tx_hash = {
        let storage = Arc::new(Storage::open(&dir).unwrap());
        let h = Harness::with_storage(storage, PathBuf::new());
        let (status, body) = h.webhook(paid("BNK4", json!(7))).await;
        assert_eq!(status, StatusCode::OK);
        body["txHash"].clone()
    };

    let storage = Arc::new(Storage::open(&dir).unwrap());
    let h = Harness::with_storage(storage, dir);
    let request = json!({
        "amount": 7,
        "recipientAddress": ones(),
        "paymentReference": "BNK4",
    });
    let (status, body) = h.call("POST", "/mint", Some(request)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["txHash"], tx_hash);
    assert_eq!(body["replayed"], true);
    assert_eq!(h.ledger.chain_calls(), 0);
}
