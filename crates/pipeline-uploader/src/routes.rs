//! HTTP routes for upload issuance

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tower_http::classify::{ServerErrorsAsFailures, SharedClassifier};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{info, Level};

use crate::approvals::ApprovalStore;
use crate::audit::{record_in_background, AuditRecorder, UploadRecord};
use crate::error::{ApiError, ApiResult};
use crate::identity::{bearer_token, IdentityVerifier};
use crate::signer::{UrlSigner, DEFAULT_CONTENT_TYPE};

#[derive(Clone)]
pub struct AppState {
    pub verifier: Arc<dyn IdentityVerifier>,
    pub approvals: Arc<dyn ApprovalStore>,
    pub signer: Arc<dyn UrlSigner>,
    pub audit: Arc<dyn AuditRecorder>,
    pub upload_prefix: String,
    pub expires_in: Duration,
}

#[derive(Debug, Default, Deserialize)]
pub struct SignedUrlRequest {
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub content_type: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SignedUrlResponse {
    pub url: String,
    pub object: String,
    pub expires_at: String,
}

/// Flatten a client-supplied name so it cannot leave the upload prefix.
pub fn sanitize_filename(filename: &str) -> String {
    filename.replace("..", "_").replace('/', "_")
}

pub fn tracing_layer() -> TraceLayer<SharedClassifier<ServerErrorsAsFailures>> {
    TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_response(
            DefaultOnResponse::new()
                .level(Level::INFO)
                .latency_unit(tower_http::LatencyUnit::Micros),
        )
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/get-signed-url", post(get_signed_url))
        .route("/health", get(health))
        .layer(tracing_layer())
        .with_state(state)
}

async fn get_signed_url(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<SignedUrlResponse>> {
    let token = bearer_token(&headers).ok_or(ApiError::Unauthenticated)?;
    let identity = state.verifier.verify(token).await?;

    if !state.approvals.is_approved(&identity.uid).await? {
        return Err(ApiError::NotApproved);
    }

    // Unparsable bodies are treated like empty ones
    let request: SignedUrlRequest = serde_json::from_slice(&body).unwrap_or_default();
    let filename = request
        .filename
        .filter(|f| !f.is_empty())
        .ok_or(ApiError::MissingFilename)?;
    let content_type = request
        .content_type
        .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());

    let object = format!("{}{}", state.upload_prefix, sanitize_filename(&filename));
    let url = state
        .signer
        .put_url(&object, &content_type, state.expires_in)
        .await?;

    let issued_at = Utc::now();
    let expires_at = issued_at + expiry_delta(state.expires_in);

    record_in_background(
        state.audit.clone(),
        UploadRecord::issued(&identity, &object, issued_at, expires_at),
    );

    info!(uid = %identity.uid, object = %object, "Issued upload URL");

    Ok(Json(SignedUrlResponse {
        url,
        object,
        expires_at: rfc3339(expires_at),
    }))
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

fn expiry_delta(expires_in: Duration) -> chrono::Duration {
    chrono::Duration::from_std(expires_in).unwrap_or(chrono::Duration::zero())
}

fn rfc3339(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}
