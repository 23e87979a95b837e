//! Ingestion routes.
//!
//! The public webhook and the inter-service call.

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::routing::post;
use axum::{Json, Router};
use serde::Serialize;
use uuid::Uuid;

use herald_common::error::AppError;
use herald_common::types::{ServiceEventRequest, WebhookRequest};
use herald_engine::ingestion::{IngestOutcome, validate_service_event, validate_webhook};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/webhook/like", post(webhook))
        .route("/webhook/notifications", post(webhook))
        .route("/internal/notifications", post(service_event))
}

/// Response for a successful ingestion.
#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub message: &'static str,
    pub id: Uuid,
    pub delivered: bool,
}

impl IngestResponse {
    fn new(message: &'static str, outcome: &IngestOutcome) -> Self {
        Self {
            message,
            id: outcome.notification.id,
            delivered: outcome.delivery.is_delivered(),
        }
    }
}

/// Malformed or incomplete JSON bodies are client errors in the common error shape.
fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload
        .map(|Json(inner)| inner)
        .map_err(|e| AppError::Validation(e.body_text()))
}

/// POST /webhook/like: Store a notification event and push it to the responsible party.
async fn webhook(
    State(state): State<AppState>,
    payload: Result<Json<WebhookRequest>, JsonRejection>,
) -> Result<Json<IngestResponse>, AppError> {
    let req = body(payload)?;
    tracing::debug!(event = %req.event, notification_type = %req.data.notification_type, "Webhook received");

    let notification = validate_webhook(&req)?;
    let outcome = state.ingestion.ingest(notification).await?;

    Ok(Json(IngestResponse::new(
        "Notification created successfully!",
        &outcome,
    )))
}

/// POST /internal/notifications: Same ingestion path for calls from other services.
async fn service_event(
    State(state): State<AppState>,
    payload: Result<Json<ServiceEventRequest>, JsonRejection>,
) -> Result<Json<IngestResponse>, AppError> {
    let req = body(payload)?;
    let notification = validate_service_event(&req)?;
    let outcome = state.ingestion.ingest(notification).await?;

    Ok(Json(IngestResponse::new(
        "Notification saved successfully",
        &outcome,
    )))
}
