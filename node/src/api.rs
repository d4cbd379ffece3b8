//! # HTTP API
//!
//! The axum router of a provider or acquirer node.
//!
//! ## Endpoints
//!
//! | Method | Path         | Description                                   |
//! |--------|--------------|-----------------------------------------------|
//! | GET    | `/health`    | Liveness check                                |
//! | GET    | `/authority` | The node's signed Authority document          |
//! | POST   | `/transact`  | Reserve, debit or finalize, by qualifier      |
//!
//! Protocol replies are always HTTP 200 with `application/json`. Failures are
//! reported in the body as an `ErrorResponse` envelope, and caching is
//! disabled on every protocol reply.

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use webpay_protocol::authority::{Authority, AuthorityResolver, EncryptionParameters};
use webpay_protocol::config::{AUTHORITY_PATH, JSON_CONTENT_TYPE, TRANSACT_PATH};
use webpay_protocol::correlation::ReferenceIdGenerator;
use webpay_protocol::provider::{
    DuplicateFinalizePolicy, FinalizeConfig, FinalizeOrchestrator, ProviderConfig,
    ProviderEndpoint, ReserveOrDebitOrchestrator,
};
use webpay_protocol::transport::Transport;

use crate::cli::NodeRole;
use crate::credentials::Credentials;
use crate::metrics::SharedMetrics;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared state of all handlers. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub role: NodeRole,
    pub version: String,
    pub endpoint: ProviderEndpoint,
    /// Canonical bytes of the signed Authority, built once at startup.
    pub authority: Arc<Vec<u8>>,
    pub metrics: SharedMetrics,
}

/// Where this node is reachable from the outside.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublicUrls {
    pub authority_url: String,
    pub transaction_url: String,
}

impl PublicUrls {
    pub fn from_base(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            authority_url: format!("{base}{AUTHORITY_PATH}"),
            transaction_url: format!("{base}{TRANSACT_PATH}"),
        }
    }
}

/// Wire orchestrators for `role` and sign the Authority document.
///
/// A provider finalizes its own reservations. An acquirer finalizes card
/// reservations signed by the devnet bank and decrypts the card data with
/// its own key.
pub fn build_state(
    role: NodeRole,
    credentials: &Credentials,
    urls: &PublicUrls,
    duplicate_policy: DuplicateFinalizePolicy,
    transport: Arc<dyn Transport>,
    metrics: SharedMetrics,
) -> anyhow::Result<AppState> {
    let keys = credentials.keys(role);
    let signer = keys.signer()?;
    let decryption_key = keys.decryption_key()?;
    let anchors = &credentials.anchors;
    let reference_ids = Arc::new(ReferenceIdGenerator::default());

    let authority = Authority::signed(
        urls.authority_url.clone(),
        urls.transaction_url.clone(),
        EncryptionParameters::new(decryption_key.public_key()),
        &signer,
    )?
    .to_canonical_bytes()?;

    let endpoint = match role {
        NodeRole::Provider => {
            let finalize = FinalizeOrchestrator::new(
                Arc::new(FinalizeConfig {
                    signer: signer.clone(),
                    expected_issuer: signer.certificate_path().clone(),
                    merchant_root: anchors.merchant_root.clone(),
                    decryption_keys: Vec::new(),
                    duplicate_policy,
                }),
                Arc::clone(&reference_ids),
            );
            let reserve = ReserveOrDebitOrchestrator::new(
                Arc::new(ProviderConfig {
                    signer,
                    decryption_keys: vec![decryption_key],
                    client_root: anchors.client_root.clone(),
                    merchant_root: anchors.merchant_root.clone(),
                    acquirer_root: anchors.acquirer_root.clone(),
                }),
                AuthorityResolver::new(transport),
                reference_ids,
            );
            ProviderEndpoint::provider(reserve, finalize)
        }
        NodeRole::Acquirer => ProviderEndpoint::acquirer(FinalizeOrchestrator::new(
            Arc::new(FinalizeConfig {
                signer,
                expected_issuer: credentials.provider.certificate_path.clone(),
                merchant_root: anchors.merchant_root.clone(),
                decryption_keys: vec![decryption_key],
                duplicate_policy,
            }),
            reference_ids,
        )),
    };

    Ok(AppState {
        role,
        version: format!(
            "{} (protocol {})",
            env!("CARGO_PKG_VERSION"),
            webpay_protocol::config::PROTOCOL_VERSION
        ),
        endpoint,
        authority: Arc::new(authority),
        metrics,
    })
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route(AUTHORITY_PATH, get(authority_handler))
        .route(TRANSACT_PATH, post(transact_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health`
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "ok",
            "role": state.role.as_str(),
            "version": state.version,
        })),
    )
}

/// `GET /authority`
async fn authority_handler(State(state): State<AppState>) -> Response {
    protocol_reply(state.authority.as_ref().clone())
}

/// `POST /transact`
async fn transact_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let started = Instant::now();
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok());
    let reply = state.endpoint.handle(content_type, &body).await;
    state.metrics.record(&reply, started.elapsed());
    tracing::debug!(
        qualifier = %reply.qualifier,
        operation = ?reply.operation,
        status = ?reply.status,
        "transact handled"
    );
    protocol_reply(reply.body)
}

fn protocol_reply(body: Vec<u8>) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, JSON_CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache"),
            (header::PRAGMA, "no-cache"),
            (header::EXPIRES, "0"),
        ],
        body,
    )
        .into_response()
}
