//! Connection registry.
//!
//! At most one live delivery channel per recipient.
//!
//! Each entry is a [`SessionHandle`]: the sending half of the session's
//! outbound queue plus a cancellation token that closes the session. The map
//! lock is only held for the map operation itself; closing an evicted session
//! happens after the lock is released.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{RwLock, mpsc};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use herald_common::types::ServerMessage;

/// Why a push over a session handle did not go through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendError {
    /// The session's writer is gone.
    Closed,
    /// The outbound queue stayed full for the whole timeout.
    TimedOut,
}

/// Cloneable handle to one live session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    connection_id: Uuid,
    recipient_id: Uuid,
    connected_at: DateTime<Utc>,
    sender: mpsc::Sender<ServerMessage>,
    shutdown: CancellationToken,
}

impl SessionHandle {
    pub fn new(
        recipient_id: Uuid,
        sender: mpsc::Sender<ServerMessage>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            connection_id: Uuid::new_v4(),
            recipient_id,
            connected_at: Utc::now(),
            sender,
            shutdown,
        }
    }

    /// Identifies this particular connection, distinct from any later one for the same recipient.
    pub fn connection_id(&self) -> Uuid {
        self.connection_id
    }

    pub fn recipient_id(&self) -> Uuid {
        self.recipient_id
    }

    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    /// Queue a message for this session, waiting at most `timeout` for queue space.
    pub async fn send(&self, message: ServerMessage, timeout: Duration) -> Result<(), SendError> {
        if self.is_closed() {
            return Err(SendError::Closed);
        }
        match tokio::time::timeout(timeout, self.sender.send(message)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(SendError::Closed),
            Err(_) => Err(SendError::TimedOut),
        }
    }

    /// Signal the session to shut down. Never blocks.
    pub fn close(&self) {
        self.shutdown.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled() || self.sender.is_closed()
    }

    /// Resolves once [`close`](Self::close) has been called on any clone.
    pub async fn closed(&self) {
        self.shutdown.cancelled().await;
    }
}

/// Concurrency-safe map from recipient id to its single live session.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    sessions: RwLock<HashMap<Uuid, SessionHandle>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `handle` as the session for its recipient, evicting and closing
    /// any previous one. Returns the evicted handle, already closed.
    pub async fn install(&self, handle: SessionHandle) -> Option<SessionHandle> {
        let recipient_id = handle.recipient_id;
        let connection_id = handle.connection_id;

        let evicted = {
            let mut sessions = self.sessions.write().await;
            sessions.insert(recipient_id, handle)
        };

        if let Some(old) = &evicted {
            old.close();
            tracing::info!(
                user_id = %recipient_id,
                evicted_connection = %old.connection_id,
                connection_id = %connection_id,
                "Evicted existing session"
            );
        }

        tracing::info!(user_id = %recipient_id, connection_id = %connection_id, "Session installed");
        evicted
    }

    pub async fn lookup(&self, recipient_id: Uuid) -> Option<SessionHandle> {
        self.sessions.read().await.get(&recipient_id).cloned()
    }

    /// Remove the recipient's session only if it is still `connection_id`.
    ///
    /// Returns `false` when a newer session has taken the slot (or none exists),
    /// in which case the registry is untouched.
    pub async fn remove(&self, recipient_id: Uuid, connection_id: Uuid) -> bool {
        let mut sessions = self.sessions.write().await;
        match sessions.get(&recipient_id) {
            Some(current) if current.connection_id == connection_id => {
                sessions.remove(&recipient_id);
                true
            }
            _ => false,
        }
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
