//! Pending replay.
//!
//! Backfill unread notifications when a recipient connects.
//!
//! Replay is best-effort and at-most-once per connection: the first failed
//! push stops it, nothing is retried and nothing is marked read.

use std::time::Duration;

use chrono::{DateTime, Utc};

use herald_common::types::ServerMessage;

use crate::registry::SessionHandle;
use crate::store::NotificationStore;

/// Default recency window for replay, in days.
pub const DEFAULT_REPLAY_WINDOW_DAYS: i64 = 30;

/// Default cap on replayed notifications per connection.
pub const DEFAULT_REPLAY_LIMIT: i64 = 50;

/// Which unread notifications a new session gets replayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayPolicy {
    pub window: chrono::Duration,
    pub limit: i64,
    pub send_timeout: Duration,
}

impl ReplayPolicy {
    /// Negative inputs are treated as zero; a window too large to represent saturates.
    pub fn new(window_days: i64, limit: i64, send_timeout: Duration) -> Self {
        Self {
            window: chrono::Duration::try_days(window_days.max(0))
                .unwrap_or(chrono::Duration::MAX),
            limit: limit.max(0),
            send_timeout,
        }
    }

    /// Oldest timestamp still inside the window, as seen from `now`.
    pub fn since(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_sub_signed(self.window)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

impl Default for ReplayPolicy {
    fn default() -> Self {
        Self::new(
            DEFAULT_REPLAY_WINDOW_DAYS,
            DEFAULT_REPLAY_LIMIT,
            Duration::from_secs(2),
        )
    }
}

/// What a replay run did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayReport {
    /// Notifications found in the window.
    pub found: usize,
    /// Notifications actually queued on the session.
    pub sent: usize,
}

impl ReplayReport {
    pub fn completed(&self) -> bool {
        self.sent == self.found
    }
}

/// Push the session owner's pending notifications, newest first.
pub async fn replay_pending(
    store: &dyn NotificationStore,
    policy: ReplayPolicy,
    session: &SessionHandle,
) -> ReplayReport {
    let user_id = session.recipient_id();
    let since = policy.since(Utc::now());

    let pending = match store.pending_for(user_id, since, policy.limit).await {
        Ok(rows) => rows,
        Err(e) => {
            tracing::warn!(user_id = %user_id, error = %e, "Failed to fetch pending notifications");
            return ReplayReport::default();
        }
    };

    let mut report = ReplayReport {
        found: pending.len(),
        sent: 0,
    };

    if pending.is_empty() {
        tracing::debug!(user_id = %user_id, "No pending notifications");
        return report;
    }

    tracing::info!(user_id = %user_id, count = pending.len(), "Replaying pending notifications");

    for notification in &pending {
        let message = ServerMessage::notification(notification, true);
        if let Err(e) = session.send(message, policy.send_timeout).await {
            tracing::warn!(
                user_id = %user_id,
                notification_id = %notification.id,
                error = ?e,
                "Replay push failed, stopping"
            );
            break;
        }
        report.sent += 1;
    }

    tracing::debug!(user_id = %user_id, sent = report.sent, found = report.found, "Replay finished");
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;
    use uuid::Uuid;

    use herald_common::types::NewNotification;

    use crate::store::{DedupPolicy, MemoryNotificationStore};

    async fn seed(store: &MemoryNotificationStore, user: Uuid, content: &str, ts: DateTime<Utc>) {
        let n = NewNotification {
            actor_id: Uuid::new_v4(),
            recipient_id: user,
            responsible_id: user,
            notification_type: "like".to_string(),
            content: content.to_string(),
            timestamp: ts,
        };
        store.upsert(&n, &DedupPolicy::default().key(&n)).await.unwrap();
    }

    fn collect(rx: &mut mpsc::Receiver<ServerMessage>) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            match msg {
                ServerMessage::Notification(frame) => {
                    assert!(frame.pending);
                    out.push(frame.content);
                }
                other => panic!("unexpected message: {other:?}"),
            }
        }
        out
    }

    #[tokio::test]
    async fn test_replay_newest_first_capped_and_windowed() {
        let store = MemoryNotificationStore::new();
        let user = Uuid::new_v4();
        let now = Utc::now();
        for i in 0..60 {
            seed(&store, user, &format!("n{i:02}"), now - ChronoDuration::minutes(i)).await;
        }
        seed(&store, user, "ancient", now - ChronoDuration::days(31)).await;

        let (tx, mut rx) = mpsc::channel(100);
        let session = SessionHandle::new(user, tx, CancellationToken::new());
        let report = replay_pending(&store, ReplayPolicy::default(), &session).await;

        assert_eq!(report, ReplayReport { found: 50, sent: 50 });
        let contents = collect(&mut rx);
        assert_eq!(contents.len(), 50);
        assert_eq!(contents[0], "n00");
        assert_eq!(contents[49], "n49");
        assert!(!contents.contains(&"ancient".to_string()));
    }

    #[tokio::test]
    async fn test_replay_stops_on_first_failure_without_marking_read() {
        let store = MemoryNotificationStore::new();
        let user = Uuid::new_v4();
        let now = Utc::now();
        for i in 0..5 {
            seed(&store, user, &format!("n{i}"), now - ChronoDuration::minutes(i)).await;
        }

        // Room for two messages and nobody draining the queue.
        let (tx, mut rx) = mpsc::channel(2);
        let session = SessionHandle::new(user, tx, CancellationToken::new());
        let policy = ReplayPolicy::new(30, 50, Duration::from_millis(20));
        let report = replay_pending(&store, policy, &session).await;

        assert_eq!(report, ReplayReport { found: 5, sent: 2 });
        assert!(!report.completed());
        assert_eq!(collect(&mut rx), vec!["n0", "n1"]);

        let still_pending = store
            .pending_for(user, now - ChronoDuration::days(30), 50)
            .await
            .unwrap();
        assert_eq!(still_pending.len(), 5);
    }

    #[tokio::test]
    async fn test_replay_on_closed_session_sends_nothing() {
        let store = MemoryNotificationStore::new();
        let user = Uuid::new_v4();
        seed(&store, user, "post1", Utc::now()).await;

        let (tx, _rx) = mpsc::channel(4);
        let session = SessionHandle::new(user, tx, CancellationToken::new());
        session.close();

        let report = replay_pending(&store, ReplayPolicy::default(), &session).await;
        assert_eq!(report, ReplayReport { found: 1, sent: 0 });
    }

    #[test]
    fn test_policy_saturates_oversized_window() {
        let now = Utc::now();

        let huge = ReplayPolicy::new(200_000_000_000_000, 50, Duration::from_secs(1));
        assert_eq!(huge.window, ChronoDuration::MAX);
        assert_eq!(huge.since(now), DateTime::<Utc>::MIN_UTC);

        let wide = ReplayPolicy::new(100_000_000, 50, Duration::from_secs(1));
        assert_eq!(wide.since(now), DateTime::<Utc>::MIN_UTC);

        let negative = ReplayPolicy::new(-3, -10, Duration::from_secs(1));
        assert_eq!(negative.window, ChronoDuration::zero());
        assert_eq!(negative.limit, 0);
        assert_eq!(negative.since(now), now);
    }

    #[tokio::test]
    async fn test_replay_with_unbounded_window_reaches_old_rows() {
        let store = MemoryNotificationStore::new();
        let user = Uuid::new_v4();
        seed(&store, user, "ancient", Utc::now() - ChronoDuration::days(3000)).await;

        let (tx, mut rx) = mpsc::channel(4);
        let session = SessionHandle::new(user, tx, CancellationToken::new());
        let policy = ReplayPolicy::new(100_000_000, 50, Duration::from_millis(50));
        let report = replay_pending(&store, policy, &session).await;

        assert_eq!(report, ReplayReport { found: 1, sent: 1 });
        assert_eq!(collect(&mut rx), vec!["ancient"]);
    }
}
