//! Ingestion path.
//!
//! Validate an inbound event, upsert it, then dispatch it.
//!
//! Both inbound surfaces (the webhook and the inter-service call) funnel into
//! [`IngestionService::ingest`]. Persistence failures are hard failures; the
//! delivery outcome is informational only.

use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, Utc};
use uuid::Uuid;

use herald_common::error::AppError;
use herald_common::types::{NewNotification, Notification, ServiceEventRequest, WebhookRequest};

use crate::dispatcher::{DeliveryOutcome, Dispatcher};
use crate::store::{DedupPolicy, NotificationStore};

/// Naive ISO-8601 layout accepted in addition to RFC 3339 (interpreted as UTC).
const NAIVE_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// A stored notification together with how its live delivery went.
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub notification: Notification,
    pub delivery: DeliveryOutcome,
}

/// Parse a well-formed identifier field.
pub fn parse_id(field: &str, value: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(value.trim())
        .map_err(|_| AppError::Validation(format!("Invalid {field} UUID")))
}

/// Parse an event timestamp: RFC 3339, or naive `YYYY-MM-DDTHH:MM:SS[.f]` as UTC.
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, AppError> {
    let value = value.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, NAIVE_TIMESTAMP_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|_| AppError::Validation("Invalid timestamp format".to_string()))
}

fn require(field: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("Field '{field}' is required")));
    }
    Ok(())
}

/// Validate a webhook body into a notification ready for upsert.
pub fn validate_webhook(req: &WebhookRequest) -> Result<NewNotification, AppError> {
    require("event", &req.event)?;
    let data = &req.data;
    require("type", &data.notification_type)?;
    require("content", &data.content)?;

    Ok(NewNotification {
        actor_id: parse_id("actorId", &data.actor_id)?,
        recipient_id: parse_id("recipientId", &data.recipient_id)?,
        responsible_id: parse_id("responsibleId", &data.responsible_id)?,
        notification_type: data.notification_type.clone(),
        content: data.content.clone(),
        timestamp: parse_timestamp(&data.timestamp)?,
    })
}

/// Validate an inter-service call. A missing timestamp means "now".
pub fn validate_service_event(req: &ServiceEventRequest) -> Result<NewNotification, AppError> {
    require("type", &req.notification_type)?;
    require("content", &req.content)?;

    let timestamp = match req.timestamp.as_deref() {
        Some(ts) => parse_timestamp(ts)?,
        None => Utc::now(),
    };

    Ok(NewNotification {
        actor_id: parse_id("actorId", &req.actor_id)?,
        recipient_id: parse_id("recipientId", &req.recipient_id)?,
        responsible_id: parse_id("responsibleId", &req.responsible_id)?,
        notification_type: req.notification_type.clone(),
        content: req.content.clone(),
        timestamp,
    })
}

/// Idempotent upsert followed by a best-effort live push.
#[derive(Clone)]
pub struct IngestionService {
    store: Arc<dyn NotificationStore>,
    dispatcher: Dispatcher,
    dedup: DedupPolicy,
}

impl IngestionService {
    pub fn new(store: Arc<dyn NotificationStore>, dispatcher: Dispatcher, dedup: DedupPolicy) -> Self {
        Self {
            store,
            dispatcher,
            dedup,
        }
    }

    /// Store `event` (refreshing the timestamp of an existing duplicate) and
    /// attempt live delivery to its responsible party.
    pub async fn ingest(&self, event: NewNotification) -> Result<IngestOutcome, AppError> {
        let key = self.dedup.key(&event);
        let notification = self.store.upsert(&event, &key).await?;

        tracing::info!(
            notification_id = %notification.id,
            actor_id = %notification.actor_id,
            user_id = %notification.responsible_id,
            notification_type = %notification.notification_type,
            "Notification saved"
        );

        let delivery = self.dispatcher.dispatch(&notification).await;

        Ok(IngestOutcome {
            notification,
            delivery,
        })
    }
}

impl std::fmt::Debug for IngestionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestionService")
            .field("dispatcher", &self.dispatcher)
            .field("dedup", &self.dedup)
            .finish_non_exhaustive()
    }
}
