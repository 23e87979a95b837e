//! PostgreSQL-backed notification store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use herald_common::error::AppError;
use herald_common::types::{NewNotification, Notification};

use super::{ListQuery, NotificationStore};

const COLUMNS: &str =
    "id, actor_id, recipient_id, responsible_id, notification_type, content, is_read, occurred_at";

/// Notification store over the `notifications` table.
#[derive(Debug, Clone)]
pub struct PgNotificationStore {
    pool: PgPool,
}

impl PgNotificationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationStore for PgNotificationStore {
    async fn upsert(
        &self,
        notification: &NewNotification,
        dedup_key: &str,
    ) -> Result<Notification, AppError> {
        let stored: Notification = sqlx::query_as(&format!(
            r#"
            INSERT INTO notifications
                (id, actor_id, recipient_id, responsible_id, notification_type, content, is_read, occurred_at, dedup_key)
            VALUES ($1, $2, $3, $4, $5, $6, false, $7, $8)
            ON CONFLICT (dedup_key) DO UPDATE SET occurred_at = EXCLUDED.occurred_at
            RETURNING {COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(notification.actor_id)
        .bind(notification.recipient_id)
        .bind(notification.responsible_id)
        .bind(&notification.notification_type)
        .bind(&notification.content)
        .bind(notification.timestamp)
        .bind(dedup_key)
        .fetch_one(&self.pool)
        .await?;

        Ok(stored)
    }

    async fn pending_for(
        &self,
        responsible_id: Uuid,
        since: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Notification>, AppError> {
        let rows: Vec<Notification> = sqlx::query_as(&format!(
            r#"
            SELECT {COLUMNS}
            FROM notifications
            WHERE responsible_id = $1
              AND is_read = false
              AND occurred_at >= $2
            ORDER BY occurred_at DESC
            LIMIT $3
            "#
        ))
        .bind(responsible_id)
        .bind(since)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn list_for(
        &self,
        responsible_id: Uuid,
        query: ListQuery,
    ) -> Result<Vec<Notification>, AppError> {
        let rows: Vec<Notification> = sqlx::query_as(&format!(
            r#"
            SELECT {COLUMNS}
            FROM notifications
            WHERE responsible_id = $1
              AND ($2 = false OR is_read = false)
            ORDER BY occurred_at DESC
            LIMIT $3
            "#
        ))
        .bind(responsible_id)
        .bind(query.unread_only)
        .bind(query.limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn mark_read(
        &self,
        notification_id: Uuid,
        responsible_id: Uuid,
    ) -> Result<Option<Notification>, AppError> {
        let row: Option<Notification> = sqlx::query_as(&format!(
            r#"
            UPDATE notifications
            SET is_read = true
            WHERE id = $1 AND responsible_id = $2
            RETURNING {COLUMNS}
            "#
        ))
        .bind(notification_id)
        .bind(responsible_id)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(n) = &row {
            tracing::info!(notification_id = %n.id, user_id = %responsible_id, "Notification marked as read");
        }

        Ok(row)
    }
}
