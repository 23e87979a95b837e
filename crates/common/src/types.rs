use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A stored notification.
///
/// `recipient_id` is who the event is about; `responsible_id` is who receives it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Uuid,
    pub actor_id: Uuid,
    pub recipient_id: Uuid,
    pub responsible_id: Uuid,
    #[serde(rename = "type")]
    pub notification_type: String,
    pub content: String,
    #[sqlx(rename = "is_read")]
    pub read: bool,
    #[sqlx(rename = "occurred_at")]
    pub timestamp: DateTime<Utc>,
}

/// A validated notification ready to be upserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNotification {
    pub actor_id: Uuid,
    pub recipient_id: Uuid,
    pub responsible_id: Uuid,
    pub notification_type: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Inbound webhook body: an event tag wrapping the notification fields.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookRequest {
    pub event: String,
    pub data: WebhookData,
}

/// Raw, unvalidated webhook fields. Identifiers and timestamp are parsed during ingestion.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookData {
    #[serde(rename = "type")]
    pub notification_type: String,
    pub actor_id: String,
    pub recipient_id: String,
    pub responsible_id: String,
    pub timestamp: String,
    pub content: String,
}

/// Inbound inter-service call. `timestamp` defaults to the server clock when absent.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceEventRequest {
    pub actor_id: String,
    pub recipient_id: String,
    #[serde(alias = "responsableId")]
    pub responsible_id: String,
    #[serde(rename = "type")]
    pub notification_type: String,
    pub content: String,
    pub timestamp: Option<String>,
}

/// Messages pushed from the server to a connected session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    Welcome {
        message: String,
        #[serde(rename = "userId")]
        user_id: Uuid,
    },
    Notification(NotificationFrame),
    Echo {
        message: String,
        original: String,
    },
}

/// Wire form of a notification pushed over a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationFrame {
    pub id: Uuid,
    pub actor_id: Uuid,
    pub recipient_id: Uuid,
    pub responsible_id: Uuid,
    pub notification_type: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub read: bool,
    /// True when the frame is part of reconnect replay rather than live delivery.
    pub pending: bool,
}

impl ServerMessage {
    pub fn welcome(user_id: Uuid) -> Self {
        ServerMessage::Welcome {
            message: "Connected successfully".to_string(),
            user_id,
        }
    }

    pub fn notification(notification: &Notification, pending: bool) -> Self {
        ServerMessage::Notification(NotificationFrame {
            id: notification.id,
            actor_id: notification.actor_id,
            recipient_id: notification.recipient_id,
            responsible_id: notification.responsible_id,
            notification_type: notification.notification_type.clone(),
            content: notification.content.clone(),
            timestamp: notification.timestamp,
            read: notification.read,
            pending,
        })
    }

    pub fn echo(original: impl Into<String>) -> Self {
        ServerMessage::Echo {
            message: "Message received".to_string(),
            original: original.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::Welcome { .. } => "welcome",
            ServerMessage::Notification(_) => "notification",
            ServerMessage::Echo { .. } => "echo",
        }
    }
}
