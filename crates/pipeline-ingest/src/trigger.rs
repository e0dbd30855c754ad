//! Trigger surface: object-notification events over HTTP
//!
//! Delivery is at least once. Every accepted event answers 200 with the batch
//! report, whatever the batch result, so a redelivery is never caused by a
//! row-level failure. Only events that cannot name an object are refused.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::classify::{ServerErrorsAsFailures, SharedClassifier};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{info, warn, Level};

use crate::pipeline::BatchRunner;
use crate::storage::ObjectRef;

/// Bucket/object pair as delivered by an object-finalize notification.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ObjectEvent {
    pub bucket: Option<String>,
    pub name: Option<String>,
}

/// Either a bare notification or a CloudEvent-style envelope carrying it
/// under `data`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum EventBody {
    Envelope { data: ObjectEvent },
    Bare(ObjectEvent),
}

impl EventBody {
    pub fn into_event(self) -> ObjectEvent {
        match self {
            EventBody::Envelope { data } => data,
            EventBody::Bare(event) => event,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventError {
    MissingBucket,
    MissingObject,
}

impl EventError {
    fn message(&self) -> &'static str {
        match self {
            EventError::MissingBucket => "missing bucket",
            EventError::MissingObject => "missing object name",
        }
    }
}

/// Resolve the object to ingest. A configured bucket wins over the event's.
pub fn resolve_object(event: ObjectEvent, bucket_override: Option<&str>) -> Result<ObjectRef, EventError> {
    let non_blank = |s: Option<String>| s.filter(|v| !v.trim().is_empty());

    let container = bucket_override
        .map(str::to_string)
        .or_else(|| non_blank(event.bucket))
        .ok_or(EventError::MissingBucket)?;
    let object = non_blank(event.name).ok_or(EventError::MissingObject)?;

    Ok(ObjectRef::new(container, object))
}

pub struct TriggerState {
    runner: Arc<dyn BatchRunner>,
    bucket_override: Option<String>,
    /// One batch at a time per process.
    gate: Mutex<()>,
}

impl TriggerState {
    pub fn new(runner: Arc<dyn BatchRunner>, bucket_override: Option<String>) -> Self {
        Self {
            runner,
            bucket_override,
            gate: Mutex::new(()),
        }
    }
}

/// Request spans at INFO with latency in milliseconds; batches are slow.
pub fn tracing_layer() -> TraceLayer<SharedClassifier<ServerErrorsAsFailures>> {
    TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_response(
            DefaultOnResponse::new()
                .level(Level::INFO)
                .latency_unit(tower_http::LatencyUnit::Millis),
        )
}

pub fn trigger_routes(state: Arc<TriggerState>) -> Router {
    Router::new()
        .route("/", post(handle_event))
        .route("/health", get(health))
        .layer(tracing_layer())
        .with_state(state)
}

async fn handle_event(State(state): State<Arc<TriggerState>>, Json(body): Json<EventBody>) -> Response {
    let event = body.into_event();
    info!(bucket = ?event.bucket, name = ?event.name, "Event received");

    let object = match resolve_object(event, state.bucket_override.as_deref()) {
        Ok(object) => object,
        Err(e) => {
            warn!(error = e.message(), "Ignoring event");
            return (StatusCode::BAD_REQUEST, Json(json!({ "error": e.message() }))).into_response();
        },
    };

    let _serial = state.gate.lock().await;
    let outcome = state.runner.run_batch(object).await;

    (StatusCode::OK, Json(outcome)).into_response()
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}
