//! In-process notification store with the same semantics as the PostgreSQL one.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use herald_common::error::AppError;
use herald_common::types::{NewNotification, Notification};

use super::{ListQuery, NotificationStore};

#[derive(Debug, Default)]
struct Tables {
    rows: HashMap<Uuid, Notification>,
    by_key: HashMap<String, Uuid>,
}

/// Notification store held entirely in memory. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryNotificationStore {
    tables: Mutex<Tables>,
}

impl MemoryNotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored rows.
    pub async fn len(&self) -> usize {
        self.tables.lock().await.rows.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn get(&self, id: Uuid) -> Option<Notification> {
        self.tables.lock().await.rows.get(&id).cloned()
    }
}

/// Newest first, truncated to `limit`.
fn newest_first(mut rows: Vec<Notification>, limit: i64) -> Vec<Notification> {
    rows.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    rows.truncate(usize::try_from(limit.max(0)).unwrap_or(usize::MAX));
    rows
}

#[async_trait]
impl NotificationStore for MemoryNotificationStore {
    async fn upsert(
        &self,
        notification: &NewNotification,
        dedup_key: &str,
    ) -> Result<Notification, AppError> {
        let mut tables = self.tables.lock().await;

        if let Some(id) = tables.by_key.get(dedup_key).copied() {
            let row = tables
                .rows
                .get_mut(&id)
                .ok_or_else(|| AppError::Internal(format!("dedup key points at missing row {id}")))?;
            row.timestamp = notification.timestamp;
            return Ok(row.clone());
        }

        let row = Notification {
            id: Uuid::new_v4(),
            actor_id: notification.actor_id,
            recipient_id: notification.recipient_id,
            responsible_id: notification.responsible_id,
            notification_type: notification.notification_type.clone(),
            content: notification.content.clone(),
            read: false,
            timestamp: notification.timestamp,
        };
        tables.by_key.insert(dedup_key.to_string(), row.id);
        tables.rows.insert(row.id, row.clone());
        Ok(row)
    }

    async fn pending_for(
        &self,
        responsible_id: Uuid,
        since: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Notification>, AppError> {
        let tables = self.tables.lock().await;
        let rows = tables
            .rows
            .values()
            .filter(|n| n.responsible_id == responsible_id && !n.read && n.timestamp >= since)
            .cloned()
            .collect();
        Ok(newest_first(rows, limit))
    }

    async fn list_for(
        &self,
        responsible_id: Uuid,
        query: ListQuery,
    ) -> Result<Vec<Notification>, AppError> {
        let tables = self.tables.lock().await;
        let rows = tables
            .rows
            .values()
            .filter(|n| n.responsible_id == responsible_id && (!query.unread_only || !n.read))
            .cloned()
            .collect();
        Ok(newest_first(rows, query.limit))
    }

    async fn mark_read(
        &self,
        notification_id: Uuid,
        responsible_id: Uuid,
    ) -> Result<Option<Notification>, AppError> {
        let mut tables = self.tables.lock().await;
        Ok(tables
            .rows
            .get_mut(&notification_id)
            .filter(|n| n.responsible_id == responsible_id)
            .map(|n| {
                n.read = true;
                n.clone()
            }))
    }
}
