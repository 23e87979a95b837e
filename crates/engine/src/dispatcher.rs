//! Delivery dispatcher.
//!
//! Best-effort live push of a stored notification.
//!
//! Delivery never touches the store. A notification that could not be pushed
//! stays unread and is picked up by replay on the next connection.

use std::sync::Arc;
use std::time::Duration;

use herald_common::types::{Notification, ServerMessage};

use crate::registry::{ConnectionRegistry, SendError};

/// Result of one delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    /// No live session for the responsible party.
    NotConnected,
    /// The session went away during the attempt.
    SendFailed,
    /// The session's outbound queue stayed full for the whole send timeout.
    TimedOut,
}

impl DeliveryOutcome {
    pub fn is_delivered(self) -> bool {
        self == DeliveryOutcome::Delivered
    }
}

impl std::fmt::Display for DeliveryOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryOutcome::Delivered => write!(f, "delivered"),
            DeliveryOutcome::NotConnected => write!(f, "not_connected"),
            DeliveryOutcome::SendFailed => write!(f, "send_failed"),
            DeliveryOutcome::TimedOut => write!(f, "timed_out"),
        }
    }
}

/// Routes freshly stored notifications to the responsible party's session.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<ConnectionRegistry>,
    send_timeout: Duration,
}

impl Dispatcher {
    pub fn new(registry: Arc<ConnectionRegistry>, send_timeout: Duration) -> Self {
        Self {
            registry,
            send_timeout,
        }
    }

    /// Attempt one bounded push of `notification` to its responsible party.
    pub async fn dispatch(&self, notification: &Notification) -> DeliveryOutcome {
        let user_id = notification.responsible_id;

        let Some(session) = self.registry.lookup(user_id).await else {
            tracing::debug!(
                user_id = %user_id,
                notification_id = %notification.id,
                "User not connected, notification kept for replay"
            );
            return DeliveryOutcome::NotConnected;
        };

        let message = ServerMessage::notification(notification, false);
        let outcome = match session.send(message, self.send_timeout).await {
            Ok(()) => DeliveryOutcome::Delivered,
            Err(SendError::Closed) => DeliveryOutcome::SendFailed,
            Err(SendError::TimedOut) => DeliveryOutcome::TimedOut,
        };

        if outcome.is_delivered() {
            tracing::debug!(user_id = %user_id, notification_id = %notification.id, "Notification delivered");
        } else {
            tracing::warn!(
                user_id = %user_id,
                notification_id = %notification.id,
                connection_id = %session.connection_id(),
                %outcome,
                "Live delivery failed"
            );
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;
    use uuid::Uuid;

    use crate::registry::SessionHandle;

    fn notification(responsible_id: Uuid) -> Notification {
        Notification {
            id: Uuid::new_v4(),
            actor_id: Uuid::new_v4(),
            recipient_id: responsible_id,
            responsible_id,
            notification_type: "like".to_string(),
            content: "post1".to_string(),
            read: false,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_not_connected() {
        let dispatcher = Dispatcher::new(Arc::new(ConnectionRegistry::new()), Duration::from_millis(50));
        let outcome = dispatcher.dispatch(&notification(Uuid::new_v4())).await;
        assert_eq!(outcome, DeliveryOutcome::NotConnected);
    }

    #[tokio::test]
    async fn test_delivered_to_responsible_party() {
        let registry = Arc::new(ConnectionRegistry::new());
        let user = Uuid::new_v4();
        let (tx, mut rx) = mpsc::channel(4);
        registry
            .install(SessionHandle::new(user, tx, CancellationToken::new()))
            .await;

        let dispatcher = Dispatcher::new(registry, Duration::from_millis(50));
        let n = notification(user);
        assert_eq!(dispatcher.dispatch(&n).await, DeliveryOutcome::Delivered);

        match rx.recv().await.unwrap() {
            ServerMessage::Notification(frame) => {
                assert_eq!(frame.id, n.id);
                assert!(!frame.pending);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_stalled_session_times_out() {
        let registry = Arc::new(ConnectionRegistry::new());
        let user = Uuid::new_v4();
        let (tx, _rx) = mpsc::channel(1);
        tx.send(ServerMessage::echo("filler")).await.unwrap();
        registry
            .install(SessionHandle::new(user, tx, CancellationToken::new()))
            .await;

        let dispatcher = Dispatcher::new(registry, Duration::from_millis(20));
        assert_eq!(dispatcher.dispatch(&notification(user)).await, DeliveryOutcome::TimedOut);
    }

    #[tokio::test]
    async fn test_closed_session_reports_send_failed() {
        let registry = Arc::new(ConnectionRegistry::new());
        let user = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(1);
        registry
            .install(SessionHandle::new(user, tx, CancellationToken::new()))
            .await;
        drop(rx);

        let dispatcher = Dispatcher::new(registry, Duration::from_millis(20));
        assert_eq!(dispatcher.dispatch(&notification(user)).await, DeliveryOutcome::SendFailed);
    }
}
