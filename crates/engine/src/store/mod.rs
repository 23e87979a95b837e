//! Notification store.
//!
//! Durable, idempotent persistence of notification records.
//!
//! The [`NotificationStore`] trait is the seam between the delivery core and the
//! database. [`PgNotificationStore`] is the production implementation;
//! [`MemoryNotificationStore`] implements the same contract in-process.

mod memory;
mod postgres;

pub use memory::MemoryNotificationStore;
pub use postgres::PgNotificationStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use herald_common::error::AppError;
use herald_common::types::{NewNotification, Notification};

/// Default page size for the read endpoint.
pub const DEFAULT_LIST_LIMIT: i64 = 50;

/// Largest page size the read endpoint will honour.
pub const MAX_LIST_LIMIT: i64 = 100;

/// Filter for listing a responsible party's notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListQuery {
    pub limit: i64,
    pub unread_only: bool,
}

impl ListQuery {
    /// Build a query from raw request input. A missing, unparseable or
    /// out-of-range limit falls back to [`DEFAULT_LIST_LIMIT`].
    pub fn from_params(limit: Option<&str>, unread_only: bool) -> Self {
        let limit = limit
            .and_then(|l| l.trim().parse::<i64>().ok())
            .filter(|l| (1..=MAX_LIST_LIMIT).contains(l))
            .unwrap_or(DEFAULT_LIST_LIMIT);
        Self { limit, unread_only }
    }
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIST_LIMIT,
            unread_only: false,
        }
    }
}

/// Which fields make up the natural dedup key for ingestion.
///
/// The key is always (actor, recipient, type, content); `include_responsible`
/// additionally separates events that differ only in their responsible party.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DedupPolicy {
    pub include_responsible: bool,
}

impl DedupPolicy {
    pub fn new(include_responsible: bool) -> Self {
        Self {
            include_responsible,
        }
    }

    /// Compute the dedup key: SHA-256 hex of the JSON-encoded key tuple.
    ///
    /// JSON encoding keeps field boundaries unambiguous; hashing keeps the
    /// unique index small regardless of content length.
    pub fn key(&self, notification: &NewNotification) -> String {
        let tuple = if self.include_responsible {
            serde_json::json!([
                notification.actor_id,
                notification.recipient_id,
                notification.notification_type,
                notification.content,
                notification.responsible_id,
            ])
        } else {
            serde_json::json!([
                notification.actor_id,
                notification.recipient_id,
                notification.notification_type,
                notification.content,
            ])
        };

        let digest = Sha256::digest(tuple.to_string().as_bytes());
        hex::encode(digest)
    }
}

/// Durable storage of notifications.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Insert a notification, or refresh only the timestamp of the existing row
    /// with the same `dedup_key`. Returns the stored row.
    async fn upsert(
        &self,
        notification: &NewNotification,
        dedup_key: &str,
    ) -> Result<Notification, AppError>;

    /// Unread notifications for `responsible_id` with a timestamp at or after
    /// `since`, newest first, at most `limit` rows.
    async fn pending_for(
        &self,
        responsible_id: Uuid,
        since: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Notification>, AppError>;

    /// Notifications for `responsible_id`, newest first.
    async fn list_for(
        &self,
        responsible_id: Uuid,
        query: ListQuery,
    ) -> Result<Vec<Notification>, AppError>;

    /// Mark a notification read if it belongs to `responsible_id`.
    ///
    /// Returns `None` both when the row does not exist and when it belongs to
    /// someone else.
    async fn mark_read(
        &self,
        notification_id: Uuid,
        responsible_id: Uuid,
    ) -> Result<Option<Notification>, AppError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(responsible_id: Uuid) -> NewNotification {
        NewNotification {
            actor_id: Uuid::from_u128(1),
            recipient_id: Uuid::from_u128(2),
            responsible_id,
            notification_type: "like".to_string(),
            content: "post1".to_string(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_key_ignores_timestamp() {
        let policy = DedupPolicy::default();
        let a = event(Uuid::from_u128(3));
        let mut b = a.clone();
        b.timestamp = a.timestamp + chrono::Duration::hours(1);
        assert_eq!(policy.key(&a), policy.key(&b));
    }

    #[test]
    fn test_key_responsible_is_configurable() {
        let a = event(Uuid::from_u128(3));
        let b = event(Uuid::from_u128(4));

        let default = DedupPolicy::default();
        assert_eq!(default.key(&a), default.key(&b));

        let strict = DedupPolicy::new(true);
        assert_ne!(strict.key(&a), strict.key(&b));
    }

    #[test]
    fn test_key_field_boundaries() {
        let policy = DedupPolicy::default();
        let mut a = event(Uuid::from_u128(3));
        let mut b = a.clone();
        a.notification_type = "lik".to_string();
        a.content = "epost1".to_string();
        b.notification_type = "like".to_string();
        b.content = "post1".to_string();
        assert_ne!(policy.key(&a), policy.key(&b));
    }

    #[test]
    fn test_list_query_limit_fallback() {
        assert_eq!(ListQuery::from_params(None, false).limit, 50);
        assert_eq!(ListQuery::from_params(Some("20"), false).limit, 20);
        assert_eq!(ListQuery::from_params(Some("100"), false).limit, 100);
        assert_eq!(ListQuery::from_params(Some("101"), false).limit, 50);
        assert_eq!(ListQuery::from_params(Some("0"), false).limit, 50);
        assert_eq!(ListQuery::from_params(Some("abc"), true).limit, 50);
        assert!(ListQuery::from_params(None, true).unread_only);
    }
}
