//! HTTP API server for the FiatMint node.
//!
//! Provides the payment-facing endpoints (`/mint`, `/webhook`) and the admin
//! endpoints under `/api/v1` for health, status, ledger records, manual
//! reconciliation and payment registration.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;

use fiatmint_core::{
    CoreError, FiatAmount, LedgerRecord, MintRequest, MintState, PaymentReference, RecipientAddress,
};
use fiatmint_ledger::ChainError;
use fiatmint_orchestrator::{
    MintOrchestrator, MintOutcome, OrchestrationError, PaymentStatus, RecordFilter,
    SettledPayment, StoreError,
};

use crate::state::AppState;
use crate::webhook;

// --- Request / response types ---

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MintBody {
    pub amount: Option<Value>,
    pub recipient_address: Option<String>,
    pub payment_reference: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookBody {
    pub payment_reference: Option<String>,
    pub amount: Option<Value>,
    pub recipient_address: Option<String>,
    pub status: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterPaymentBody {
    pub payment_reference: String,
    pub amount: Value,
    pub recipient_address: Option<String>,
    pub status: Option<String>,
}

#[derive(Deserialize)]
pub struct RecordsQuery {
    pub state: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MintResponse {
    pub success: bool,
    pub tx_hash: String,
    pub amount: Value,
    pub recipient: String,
    pub payment_reference: String,
    pub replayed: bool,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub version: String,
    pub ledger_mode: String,
    pub ledger_id: Option<String>,
    pub signer: Option<String>,
    pub configuration_error: Option<String>,
    pub uptime_secs: u64,
    pub records: BTreeMap<String, usize>,
}

#[derive(Serialize)]
pub struct RecordsResponse {
    pub records: Vec<LedgerRecord>,
    pub count: usize,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Serialize, Debug)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(rename = "escrowTxHash", skip_serializing_if = "Option::is_none")]
    pub escrow_tx_hash: Option<String>,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
            reason: None,
            escrow_tx_hash: None,
        }),
    )
}

// --- Helpers ---

fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| {
        tracing::debug!(error = %e, "rejecting malformed request body");
        api_error(StatusCode::BAD_REQUEST, "Invalid JSON body")
    })
}

fn parse_amount(value: Option<&Value>) -> Result<Decimal, ApiError> {
    let text = match value {
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::String(s)) => s.trim().to_string(),
        _ => return Err(api_error(StatusCode::BAD_REQUEST, "Invalid amount")),
    };
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map_err(|_| api_error(StatusCode::BAD_REQUEST, "Invalid amount"))
}

/// Echo an amount back as a JSON number where it fits.
fn amount_json(amount: Decimal) -> Value {
    let text = amount.normalize().to_string();
    serde_json::Number::from_str(&text)
        .map(Value::Number)
        .unwrap_or(Value::String(text))
}

fn parse_reference(raw: &str) -> Result<PaymentReference, ApiError> {
    PaymentReference::new(raw).map_err(|e| validation_error(&e, raw))
}

fn validation_error(err: &CoreError, raw_reference: &str) -> ApiError {
    let message = match err {
        CoreError::InvalidAmount(_) | CoreError::AmountOverflow { .. } => "Invalid amount".to_string(),
        CoreError::InvalidAddress(_) => "Invalid recipient address".to_string(),
        CoreError::InvalidReference(_) if raw_reference.trim().is_empty() => {
            "Payment reference is required".to_string()
        }
        other => other.to_string(),
    };
    tracing::debug!(error = %err, "request failed validation");
    api_error(StatusCode::BAD_REQUEST, message)
}

fn configured(state: &AppState) -> Result<&Arc<MintOrchestrator>, ApiError> {
    state.orchestrator().map_err(|reason| {
        tracing::error!(%reason, "mint request refused: node is not configured");
        api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Server configuration error: {}", reason),
        )
    })
}

fn validate_fields(
    orchestrator: &MintOrchestrator,
    reference: Option<&str>,
    amount: Option<&Value>,
    recipient: Option<&str>,
) -> Result<MintRequest, ApiError> {
    let amount = parse_amount(amount)?;
    let reference = reference.unwrap_or_default();
    orchestrator
        .validate(reference, amount, recipient.unwrap_or_default())
        .map_err(|e| match e {
            OrchestrationError::Validation(core) => validation_error(&core, reference),
            other => mint_error(other),
        })
}

fn store_error(e: StoreError) -> ApiError {
    tracing::error!(error = %e, "storage failure");
    api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

fn mint_error(e: OrchestrationError) -> ApiError {
    let status = match &e {
        OrchestrationError::Validation(core) => return validation_error(core, "-"),
        OrchestrationError::PaymentNotVerified { reason } => {
            return (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(ErrorResponse {
                    error: "Payment not verified".into(),
                    reason: Some(reason.clone()),
                    escrow_tx_hash: None,
                }),
            );
        }
        OrchestrationError::ReleaseFailed { escrow_tx, .. } => {
            tracing::error!(error = %e, "mint left partial");
            return (
                StatusCode::BAD_GATEWAY,
                Json(ErrorResponse {
                    error: e.to_string(),
                    reason: None,
                    escrow_tx_hash: Some(escrow_tx.clone()),
                }),
            );
        }
        OrchestrationError::ChainFailure(ChainError::InsufficientFunds(_)) => {
            return api_error(
                StatusCode::BAD_REQUEST,
                "Insufficient funds to execute transaction",
            );
        }
        OrchestrationError::InProgress(_)
        | OrchestrationError::RecipientBusy { .. }
        | OrchestrationError::ReferenceConflict(_)
        | OrchestrationError::NeedsManualReview { .. } => StatusCode::CONFLICT,
        OrchestrationError::NotFound(_) => StatusCode::NOT_FOUND,
        OrchestrationError::ChainFailure(_)
        | OrchestrationError::PreviouslyFailed { .. }
        | OrchestrationError::Internal(_)
        | OrchestrationError::Store(_)
        | OrchestrationError::Verifier(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if status.is_server_error() {
        tracing::error!(kind = e.kind(), error = %e, "mint request failed");
    } else {
        tracing::info!(kind = e.kind(), error = %e, "mint request refused");
    }
    api_error(status, e.to_string())
}

fn mint_response(result: Result<MintOutcome, OrchestrationError>) -> Result<Json<MintResponse>, ApiError> {
    let outcome = result.map_err(mint_error)?;
    Ok(Json(MintResponse {
        success: true,
        tx_hash: outcome.tx_hash,
        amount: amount_json(outcome.amount.value()),
        recipient: outcome.recipient.to_string(),
        payment_reference: outcome.payment_reference.to_string(),
        replayed: outcome.replayed,
    }))
}

// --- Handlers ---

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
    })
}

async fn handle_status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<StatusResponse>, ApiError> {
    let mut records = BTreeMap::new();
    for record in state
        .records
        .list(&RecordFilter::default())
        .await
        .map_err(store_error)?
    {
        *records.entry(record.state.to_string()).or_insert(0) += 1;
    }

    let (ledger_id, signer, configuration_error) = match state.orchestrator() {
        Ok(o) => (
            Some(o.ledger().ledger_id().to_string()),
            Some(o.ledger().signer_address().to_checksum(None)),
            None,
        ),
        Err(reason) => (None, None, Some(reason.to_string())),
    };

    Ok(Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        ledger_mode: state.ledger_mode.clone(),
        ledger_id,
        signer,
        configuration_error,
        uptime_secs: state.start_time.elapsed().as_secs(),
        records,
    }))
}

async fn handle_mint(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<MintResponse>, ApiError> {
    let orchestrator = configured(&state)?;
    let body: MintBody = parse_body(&body)?;
    let request = validate_fields(
        orchestrator,
        body.payment_reference.as_deref(),
        body.amount.as_ref(),
        body.recipient_address.as_deref(),
    )?;

    mint_response(orchestrator.process(request).await)
}

async fn handle_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let signed = state.webhook_key().is_some();
    if let Some(key) = state.webhook_key() {
        let signature = headers
            .get(webhook::SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if !webhook::verify(key, &body, signature) {
            tracing::warn!("rejecting webhook with missing or invalid signature");
            return Err(api_error(StatusCode::UNAUTHORIZED, "Invalid signature"));
        }
    }

    let event: WebhookBody = parse_body(&body)?;
    if event.status.as_deref() != Some("completed") {
        tracing::info!(
            payment_reference = event.payment_reference.as_deref().unwrap_or_default(),
            status = event.status.as_deref().unwrap_or_default(),
            "ignoring webhook for incomplete payment"
        );
        return Ok(Json(MessageResponse {
            message: "Payment not completed, no tokens minted".into(),
        })
        .into_response());
    }

    let orchestrator = configured(&state)?;
    let request = validate_fields(
        orchestrator,
        event.payment_reference.as_deref(),
        event.amount.as_ref(),
        event.recipient_address.as_deref(),
    )?;

    // Only an authenticated event may settle a payment. Unsigned events are
    // checked against whatever the registry already holds.
    if signed {
        state
            .registry
            .record_payment(SettledPayment::new(
                request.payment_reference.clone(),
                request.amount,
                Some(request.recipient),
                PaymentStatus::Completed,
            ))
            .await
            .map_err(store_error)?;
    } else {
        tracing::debug!(
            payment_reference = %request.payment_reference,
            "unsigned webhook, verifying against registered payments"
        );
    }

    mint_response(orchestrator.process(request).await).map(IntoResponse::into_response)
}

async fn handle_list_records(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RecordsQuery>,
) -> Result<Json<RecordsResponse>, ApiError> {
    let state_filter = match query.state.as_deref() {
        Some(s) if !s.trim().is_empty() => Some(
            MintState::from_str(s).map_err(|e| api_error(StatusCode::BAD_REQUEST, e.to_string()))?,
        ),
        _ => None,
    };
    let filter = RecordFilter {
        state: state_filter,
        limit: query.limit,
    };

    let records = state.records.list(&filter).await.map_err(store_error)?;
    let count = records.len();
    Ok(Json(RecordsResponse { records, count }))
}

async fn handle_get_record(
    State(state): State<Arc<AppState>>,
    Path(reference): Path<String>,
) -> Result<Json<LedgerRecord>, ApiError> {
    let reference = parse_reference(&reference)?;
    state
        .records
        .get(&reference)
        .await
        .map_err(store_error)?
        .map(Json)
        .ok_or_else(|| {
            api_error(
                StatusCode::NOT_FOUND,
                format!("no ledger record for payment reference {}", reference),
            )
        })
}

async fn handle_process_record(
    State(state): State<Arc<AppState>>,
    Path(reference): Path<String>,
) -> Result<Json<MintResponse>, ApiError> {
    let orchestrator = configured(&state)?;
    let reference = parse_reference(&reference)?;
    mint_response(orchestrator.reconcile(&reference).await)
}

async fn handle_register_payment(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<SettledPayment>, ApiError> {
    let body: RegisterPaymentBody = parse_body(&body)?;
    let reference = parse_reference(&body.payment_reference)?;
    let amount = parse_amount(Some(&body.amount))?;
    let minor_units = state
        .orchestrator()
        .map(|o| o.config().fiat_minor_units)
        .unwrap_or(2);
    let amount = FiatAmount::new(amount, minor_units)
        .map_err(|e| validation_error(&e, reference.as_str()))?;
    let recipient = match body.recipient_address.as_deref() {
        Some(addr) if !addr.trim().is_empty() => Some(
            addr.parse::<RecipientAddress>()
                .map_err(|e| validation_error(&e, reference.as_str()))?,
        ),
        _ => None,
    };
    let status = match body.status.as_deref() {
        Some(s) => PaymentStatus::from_str(s).map_err(|e| api_error(StatusCode::BAD_REQUEST, e))?,
        None => PaymentStatus::Completed,
    };

    let payment = state
        .registry
        .record_payment(SettledPayment::new(reference, amount, recipient, status))
        .await
        .map_err(store_error)?;
    tracing::info!(
        payment_reference = %payment.payment_reference,
        status = %payment.status,
        "payment registered"
    );
    Ok(Json(payment))
}

// --- Server ---

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/mint", post(handle_mint))
        .route("/api/mint-tokens", post(handle_mint))
        .route("/webhook", post(handle_webhook))
        .route("/api/webhook", post(handle_webhook))
        .route("/api/v1/health", get(handle_health))
        .route("/api/v1/status", get(handle_status))
        .route("/api/v1/records", get(handle_list_records))
        .route("/api/v1/records/{reference}", get(handle_get_record))
        .route("/api/v1/records/{reference}/process", post(handle_process_record))
        .route("/api/v1/payments", post(handle_register_payment))
        .with_state(state)
}

pub async fn start_api_server(listen_addr: SocketAddr, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    tracing::info!(%listen_addr, "HTTP API server started");
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use fiatmint_core::OrchestratorConfig;
    use fiatmint_ledger::{FailurePoint, SimulatedLedger};
    use fiatmint_orchestrator::{MemoryPaymentRegistry, MemoryRecordStore, RegistryVerifier};
    use http_body_util::BodyExt;
    use serde_json::json;
    use tower::ServiceExt;

    struct TestNode {
        state: Arc<AppState>,
        ledger: Arc<SimulatedLedger>,
    }

    fn node(secret: Option<&str>, allow_unregistered: bool) -> TestNode {
        let ledger = Arc::new(SimulatedLedger::new(18));
        let records = Arc::new(MemoryRecordStore::new());
        let registry = Arc::new(MemoryPaymentRegistry::new());
        let verifier =
            Arc::new(RegistryVerifier::new(registry.clone()).allow_unregistered(allow_unregistered));
        let orchestrator = Arc::new(MintOrchestrator::new(
            records.clone(),
            verifier,
            ledger.clone(),
            OrchestratorConfig::default(),
        ));
        let state = Arc::new(AppState::new(
            Ok(orchestrator),
            records,
            registry,
            secret,
            "simulated",
        ));
        TestNode { state, ledger }
    }

    fn unconfigured() -> Arc<AppState> {
        Arc::new(AppState::new(
            Err("Missing private key".into()),
            Arc::new(MemoryRecordStore::new()),
            Arc::new(MemoryPaymentRegistry::new()),
            None,
            "evm",
        ))
    }

    async fn call(
        state: &Arc<AppState>,
        method: &str,
        uri: &str,
        body: Option<Value>,
        headers: &[(&str, String)],
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        for (name, value) in headers {
            builder = builder.header(*name, value.as_str());
        }
        let body = body.map(|b| b.to_string()).unwrap_or_default();
        let response = build_router(state.clone())
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

    fn ones() -> String {
        format!("0x{}", "1".repeat(40))
    }

    fn mint_body(reference: &str) -> Value {
        json!({
            "amount": 100000,
            "recipientAddress": ones(),
            "paymentReference": reference,
        })
    }

    async fn register(state: &Arc<AppState>, reference: &str, amount: Value) {
        let (status, _) = call(
            state,
            "POST",
            "/api/v1/payments",
            Some(json!({ "paymentReference": reference, "amount": amount })),
            &[],
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_health() {
        let node = node(None, false);
        let (status, body) = call(&node.state, "GET", "/api/v1/health", None, &[]).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_mint_success_and_replay() {
        let node = node(None, false);
        register(&node.state, "BNK1", json!(100000)).await;

        let (status, first) = call(&node.state, "POST", "/mint", Some(mint_body("BNK1")), &[]).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(first["success"], true);
        assert_eq!(first["amount"], 100000);
        assert!(first["txHash"].as_str().unwrap().starts_with("0x"));
        assert_eq!(first["replayed"], false);

        let calls = node.ledger.chain_calls();
        let (status, second) =
            call(&node.state, "POST", "/api/mint-tokens", Some(mint_body("BNK1")), &[]).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(second["txHash"], first["txHash"]);
        assert_eq!(second["replayed"], true);
        assert_eq!(node.ledger.chain_calls(), calls);

        let (status, record) = call(&node.state, "GET", "/api/v1/records/BNK1", None, &[]).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(record["state"], "Released");
        assert_eq!(record["transaction_hash"], first["txHash"]);
    }

    #[tokio::test]
    async fn test_mint_validation_errors() {
        let node = node(None, false);

        let cases = [
            (json!({"amount": 0, "recipientAddress": ones(), "paymentReference": "A"}), "Invalid amount"),
            (json!({"amount": -5, "recipientAddress": ones(), "paymentReference": "A"}), "Invalid amount"),
            (json!({"recipientAddress": ones(), "paymentReference": "A"}), "Invalid amount"),
            (json!({"amount": 10, "recipientAddress": "not-an-address", "paymentReference": "A"}), "Invalid recipient address"),
            (json!({"amount": 10, "recipientAddress": ones()}), "Payment reference is required"),
        ];
        for (body, expected) in cases {
            let (status, response) = call(&node.state, "POST", "/mint", Some(body), &[]).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(response["error"], expected);
        }

        let (status, records) = call(&node.state, "GET", "/api/v1/records", None, &[]).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(records["count"], 0);
        assert_eq!(node.ledger.chain_calls(), 0);
    }

    #[tokio::test]
    async fn test_malformed_json() {
        let node = node(None, false);
        let response = build_router(node.state.clone())
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/mint")
                    .body(Body::from("{not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unverified_payment_is_422() {
        let node = node(None, false);
        let (status, body) = call(&node.state, "POST", "/mint", Some(mint_body("NOPE")), &[]).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"], "Payment not verified");
        assert_eq!(body["reason"], "not found");
        assert_eq!(node.ledger.chain_calls(), 0);

        let (_, listed) = call(
            &node.state,
            "GET",
            "/api/v1/records?state=verificationfailed",
            None,
            &[],
        )
        .await;
        assert_eq!(listed["count"], 1);
    }

    #[tokio::test]
    async fn test_allow_unregistered_demo_policy() {
        let node = node(None, true);
        let (status, body) = call(&node.state, "POST", "/mint", Some(mint_body("DEMO")), &[]).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
    }

    #[tokio::test]
    async fn test_missing_signing_key_is_500_not_crash() {
        let state = unconfigured();
        let (status, body) = call(&state, "POST", "/mint", Some(mint_body("BNK1")), &[]).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Server configuration error: Missing private key");

        let webhook = json!({
            "paymentReference": "BNK1",
            "amount": 10,
            "recipientAddress": ones(),
            "status": "completed",
        });
        let (status, _) = call(&state, "POST", "/webhook", Some(webhook), &[]).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

        // Read-only endpoints still work.
        let (status, body) = call(&state, "GET", "/api/v1/status", None, &[]).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["configuration_error"], "Missing private key");
    }

    #[tokio::test]
    async fn test_webhook_incomplete_payment_is_ignored() {
        let node = node(None, false);
        let (status, body) = call(
            &node.state,
            "POST",
            "/webhook",
            Some(json!({"paymentReference": "P1", "amount": 10, "recipientAddress": ones(), "status": "pending"})),
            &[],
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Payment not completed, no tokens minted");

        let (_, records) = call(&node.state, "GET", "/api/v1/records", None, &[]).await;
        assert_eq!(records["count"], 0);
    }

    #[tokio::test]
    async fn test_webhook_completed_payment_mints() {
        let node = node(None, false);
        register(&node.state, "WH1", json!("250.50")).await;
        let event = json!({
            "paymentReference": "WH1",
            "amount": "250.50",
            "recipientAddress": ones(),
            "status": "completed",
        });
        let (status, body) = call(&node.state, "POST", "/webhook", Some(event.clone()), &[]).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["amount"], 250.5);

        // Re-delivery replays instead of minting again.
        let (status, again) = call(&node.state, "POST", "/webhook", Some(event), &[]).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(again["replayed"], true);
        assert_eq!(node.ledger.mint_calls(), 1);
    }

    #[tokio::test]
    async fn test_webhook_signature_required_when_configured() {
        let node = node(Some("whsec_test"), false);
        let event = json!({
            "paymentReference": "SIG1",
            "amount": 5,
            "recipientAddress": ones(),
            "status": "completed",
        });

        let (status, _) = call(&node.state, "POST", "/webhook", Some(event.clone()), &[]).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = call(
            &node.state,
            "POST",
            "/webhook",
            Some(event.clone()),
            &[(webhook::SIGNATURE_HEADER, "00".repeat(32))],
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let key = webhook::signing_key("whsec_test");
        let signature = webhook::sign(&key, event.to_string().as_bytes());
        let (status, body) = call(
            &node.state,
            "POST",
            "/webhook",
            Some(event),
            &[(webhook::SIGNATURE_HEADER, signature)],
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
    }

    #[tokio::test]
    async fn test_unsigned_webhook_cannot_settle_a_payment() {
        let node = node(None, false);
        let event = json!({
            "paymentReference": "FORGED",
            "amount": 1000000,
            "recipientAddress": ones(),
            "status": "completed",
        });
        let (status, body) = call(&node.state, "POST", "/webhook", Some(event), &[]).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"], "Payment not verified");
        assert!(body["reason"].as_str().unwrap().contains("not found"));

        let reference = PaymentReference::new("FORGED").unwrap();
        assert!(node.state.registry.get_payment(&reference).await.unwrap().is_none());
        assert_eq!(node.ledger.chain_calls(), 0);
    }

    #[tokio::test]
    async fn test_unsigned_webhook_cannot_inflate_registered_payment() {
        let node = node(None, false);
        register(&node.state, "ADM1", json!(100)).await;
        let event = json!({
            "paymentReference": "ADM1",
            "amount": 1000000,
            "recipientAddress": ones(),
            "status": "completed",
        });
        let (status, body) = call(&node.state, "POST", "/webhook", Some(event), &[]).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["reason"].as_str().unwrap().contains("amount mismatch"));
        assert_eq!(node.ledger.chain_calls(), 0);

        let reference = PaymentReference::new("ADM1").unwrap();
        let stored = node.state.registry.get_payment(&reference).await.unwrap().unwrap();
        assert_eq!(stored.amount.value(), Decimal::from(100));
    }

    #[tokio::test]
    async fn test_signed_webhook_cannot_change_completed_amount() {
        let node = node(Some("whsec_test"), false);
        register(&node.state, "ADM2", json!(100)).await;
        let event = json!({
            "paymentReference": "ADM2",
            "amount": 1000000,
            "recipientAddress": ones(),
            "status": "completed",
        });
        let key = webhook::signing_key("whsec_test");
        let signature = webhook::sign(&key, event.to_string().as_bytes());
        let (status, body) = call(
            &node.state,
            "POST",
            "/webhook",
            Some(event),
            &[(webhook::SIGNATURE_HEADER, signature)],
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["reason"].as_str().unwrap().contains("amount mismatch"));
        assert_eq!(node.ledger.chain_calls(), 0);

        let reference = PaymentReference::new("ADM2").unwrap();
        let stored = node.state.registry.get_payment(&reference).await.unwrap().unwrap();
        assert_eq!(stored.amount.value(), Decimal::from(100));
    }

    #[tokio::test]
    async fn test_release_failure_is_502_then_process_finishes() {
        let node = node(None, false);
        register(&node.state, "PART", json!(100000)).await;
        node.ledger.inject_failure(
            FailurePoint::ReleaseSubmit,
            ChainError::RpcUnavailable("connection reset".into()),
        );

        let (status, body) = call(&node.state, "POST", "/mint", Some(mint_body("PART")), &[]).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(body["escrowTxHash"].as_str().unwrap().starts_with("0x"));

        let (status, _) = call(&node.state, "POST", "/mint", Some(mint_body("PART")), &[]).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, body) =
            call(&node.state, "POST", "/api/v1/records/PART/process", None, &[]).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(node.ledger.mint_calls(), 1);
    }

    #[tokio::test]
    async fn test_insufficient_funds_is_400() {
        let node = node(None, false);
        register(&node.state, "GAS", json!(100000)).await;
        node.ledger.inject_failure(
            FailurePoint::MintSubmit,
            ChainError::InsufficientFunds("balance 0".into()),
        );

        let (status, body) = call(&node.state, "POST", "/mint", Some(mint_body("GAS")), &[]).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Insufficient funds to execute transaction");

        let (_, record) = call(&node.state, "GET", "/api/v1/records/GAS", None, &[]).await;
        assert_eq!(record["state"], "MintFailed");
    }

    #[tokio::test]
    async fn test_records_endpoints() {
        let node = node(None, false);

        let (status, _) = call(&node.state, "GET", "/api/v1/records/UNKNOWN", None, &[]).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) =
            call(&node.state, "POST", "/api/v1/records/UNKNOWN/process", None, &[]).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = call(&node.state, "GET", "/api/v1/records?state=Bogus", None, &[]).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        register(&node.state, "R1", json!(100000)).await;
        call(&node.state, "POST", "/mint", Some(mint_body("R1")), &[]).await;

        let (status, status_body) = call(&node.state, "GET", "/api/v1/status", None, &[]).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(status_body["ledger_id"], "simulated");
        assert_eq!(status_body["records"]["Released"], 1);
    }

    #[tokio::test]
    async fn test_register_payment_validation() {
        let node = node(None, false);
        let (status, _) = call(
            &node.state,
            "POST",
            "/api/v1/payments",
            Some(json!({"paymentReference": "X", "amount": 1, "status": "settled"})),
            &[],
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = call(
            &node.state,
            "POST",
            "/api/v1/payments",
            Some(json!({"paymentReference": "X", "amount": "12.34", "recipientAddress": ones(), "status": "pending"})),
            &[],
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "pending");
        assert_eq!(body["consumed"], false);
    }
}
