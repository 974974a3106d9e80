//! HTTP surface: `POST /` for push deliveries, `GET /healthz` for liveness.
//!
//! A push that can never succeed (bad envelope, bad finding, permanent
//! collaborator refusal) is answered `400`. An outage worth redelivering
//! (timeout, 5xx, stale etag) is answered `503`. Success is `200` with an
//! empty body.

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use log::{info, warn};
use std::sync::Arc;
use uuid::Uuid;

use bucketwarden_core::{Pipeline, PipelineError};

/// State shared by all requests.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
}

/// Builds the router.
pub fn router(pipeline: Arc<Pipeline>, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/", post(push_handler))
        .route("/healthz", get(health_handler))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(AppState { pipeline })
}

async fn health_handler() -> &'static str {
    "ok"
}

/// POST /: handles one push delivery.
pub async fn push_handler(State(state): State<AppState>, body: Bytes) -> Response {
    let request_id = Uuid::new_v4();
    match state.pipeline.process(&body).await {
        Ok(report) => {
            info!(
                "request {}: message {} done ({}, alert sent: {})",
                request_id, report.message_id, report.action, report.alert_sent
            );
            StatusCode::OK.into_response()
        }
        Err(err) => {
            let status = status_for(&err);
            warn!("request {}: answering {} ({})", request_id, status.as_u16(), err);
            (status, status.canonical_reason().unwrap_or_default()).into_response()
        }
    }
}

/// Maps a pipeline failure to the status returned to the push service.
pub fn status_for(err: &PipelineError) -> StatusCode {
    if err.is_retryable() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::BAD_REQUEST
    }
}
