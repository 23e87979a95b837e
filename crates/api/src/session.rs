//! Session manager.
//!
//! Lifecycle of one authenticated live-delivery connection.
//!
//! `Authenticating → Upgrading → Connected → Draining → Closed`
//!
//! Authentication happens in the upgrade handler before the transport is
//! upgraded. Everything from `Upgrading` on runs here:
//!
//! 1. Create the outbound queue, queue the welcome, start the writer task
//! 2. Install the session in the registry (evicting any older one)
//! 3. Run pending replay concurrently with the read loop
//! 4. On read-loop exit: close the handle, release the registry slot, drain the writer
//!
//! A notification stored while replay is starting can reach the session both
//! live and through replay. The writer sends each notification id over one
//! path only, whichever arrives first.

use std::collections::HashSet;
use std::fmt::Display;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use herald_common::types::ServerMessage;
use herald_engine::registry::SessionHandle;
use herald_engine::replay::replay_pending;

use crate::state::AppState;

/// Phases of a single connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Authenticating,
    Upgrading,
    Connected,
    Draining,
    Closed,
}

impl SessionPhase {
    /// The phase that follows this one, if any.
    pub fn next(self) -> Option<Self> {
        match self {
            SessionPhase::Authenticating => Some(SessionPhase::Upgrading),
            SessionPhase::Upgrading => Some(SessionPhase::Connected),
            SessionPhase::Connected => Some(SessionPhase::Draining),
            SessionPhase::Draining => Some(SessionPhase::Closed),
            SessionPhase::Closed => None,
        }
    }
}

/// Tracks and logs the phase of one connection.
#[derive(Debug)]
struct Lifecycle {
    user_id: Uuid,
    phase: SessionPhase,
}

impl Lifecycle {
    fn new(user_id: Uuid) -> Self {
        Self {
            user_id,
            phase: SessionPhase::Upgrading,
        }
    }

    fn advance(&mut self) {
        if let Some(next) = self.phase.next() {
            tracing::debug!(user_id = %self.user_id, from = ?self.phase, to = ?next, "Session phase");
            self.phase = next;
        }
    }
}

/// Run a session over an upgraded WebSocket for the verified `user_id`.
pub async fn run(socket: WebSocket, state: AppState, user_id: Uuid) {
    let (writer, reader) = socket.split();
    drive(writer, reader, state, user_id).await;
}

/// Run a session over any message sink/stream pair.
pub async fn drive<W, R, E>(writer: W, mut reader: R, state: AppState, user_id: Uuid)
where
    W: Sink<Message> + Unpin + Send + 'static,
    W::Error: Display,
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let mut lifecycle = Lifecycle::new(user_id);
    let send_timeout = state.config.delivery_send_timeout();

    let shutdown = CancellationToken::new();
    let (tx, rx) = mpsc::channel(state.config.session_outbound_buffer.max(1));
    let handle = SessionHandle::new(user_id, tx, shutdown.clone());

    // Queued before install so nothing can overtake it.
    if handle
        .send(ServerMessage::welcome(user_id), send_timeout)
        .await
        .is_err()
    {
        return;
    }
    let writer_task = tokio::spawn(write_loop(writer, rx, shutdown, send_timeout, user_id));

    state.registry.install(handle.clone()).await;
    lifecycle.advance();
    let active_sessions = state.registry.len().await;
    tracing::info!(
        user_id = %user_id,
        connection_id = %handle.connection_id(),
        active_sessions,
        "Session connected"
    );

    let replay_task = {
        let store = state.store.clone();
        let policy = state.replay;
        let handle = handle.clone();
        tokio::spawn(async move { replay_pending(store.as_ref(), policy, &handle).await })
    };

    read_loop(&mut reader, &handle, send_timeout).await;

    lifecycle.advance();
    handle.close();
    replay_task.abort();
    let released = state
        .registry
        .remove(user_id, handle.connection_id())
        .await;
    if !released {
        tracing::debug!(user_id = %user_id, connection_id = %handle.connection_id(), "Slot already taken by a newer session");
    }
    if let Err(e) = writer_task.await {
        tracing::warn!(user_id = %user_id, error = %e, "Session writer task failed");
    }

    lifecycle.advance();
    tracing::info!(
        user_id = %user_id,
        connection_id = %handle.connection_id(),
        connected_for_secs = (chrono::Utc::now() - handle.connected_at()).num_seconds(),
        "Session closed"
    );
}

/// Echo inbound frames until the peer goes away, a read fails, or the handle is closed.
async fn read_loop<R, E>(reader: &mut R, handle: &SessionHandle, send_timeout: Duration)
where
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let user_id = handle.recipient_id();

    loop {
        let frame = tokio::select! {
            _ = handle.closed() => {
                tracing::debug!(user_id = %user_id, "Session closed by server");
                break;
            }
            frame = reader.next() => frame,
        };

        let original = match frame {
            Some(Ok(Message::Text(text))) => text.as_str().to_string(),
            Some(Ok(Message::Binary(bytes))) => String::from_utf8_lossy(&bytes).into_owned(),
            Some(Ok(Message::Close(_))) | None => {
                tracing::debug!(user_id = %user_id, "Peer closed connection");
                break;
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                tracing::warn!(user_id = %user_id, error = %e, "WebSocket read error");
                break;
            }
        };

        tracing::debug!(user_id = %user_id, bytes = original.len(), "Message received");
        if handle
            .send(ServerMessage::echo(original), send_timeout)
            .await
            .is_err()
        {
            break;
        }
    }
}

/// Suppresses a notification frame already sent through the other delivery path.
#[derive(Debug, Default)]
struct FrameFilter {
    live: HashSet<Uuid>,
    replayed: HashSet<Uuid>,
}

impl FrameFilter {
    fn admit(&mut self, message: &ServerMessage) -> bool {
        let ServerMessage::Notification(frame) = message else {
            return true;
        };
        if frame.pending {
            !self.live.contains(&frame.id) && self.replayed.insert(frame.id)
        } else if self.replayed.remove(&frame.id) {
            false
        } else {
            self.live.insert(frame.id);
            true
        }
    }
}

/// Serialise queued messages onto the socket.
///
/// A socket write error cancels the session. On shutdown, whatever is already
/// queued is flushed (bounded by `send_timeout`) before the close frame.
async fn write_loop<W>(
    mut writer: W,
    mut rx: mpsc::Receiver<ServerMessage>,
    shutdown: CancellationToken,
    send_timeout: Duration,
    user_id: Uuid,
) where
    W: Sink<Message> + Unpin,
    W::Error: Display,
{
    let mut filter = FrameFilter::default();

    loop {
        let message = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            message = rx.recv() => match message {
                Some(message) => message,
                None => break,
            },
        };

        if !filter.admit(&message) {
            tracing::debug!(user_id = %user_id, "Duplicate notification frame dropped");
            continue;
        }
        if let Err(e) = write_message(&mut writer, &message).await {
            tracing::warn!(user_id = %user_id, kind = message.kind(), error = %e, "WebSocket write failed");
            shutdown.cancel();
            return;
        }
    }

    let drain = async {
        while let Ok(message) = rx.try_recv() {
            if !filter.admit(&message) {
                continue;
            }
            if write_message(&mut writer, &message).await.is_err() {
                return;
            }
        }
        let _ = writer.send(Message::Close(None)).await;
    };
    if tokio::time::timeout(send_timeout, drain).await.is_err() {
        tracing::debug!(user_id = %user_id, "Drain timed out");
    }
    let _ = writer.close().await;
}

async fn write_message<W>(writer: &mut W, message: &ServerMessage) -> Result<(), String>
where
    W: Sink<Message> + Unpin,
    W::Error: Display,
{
    let text = serde_json::to_string(message).map_err(|e| e.to_string())?;
    writer
        .send(Message::Text(text.into()))
        .await
        .map_err(|e| e.to_string())
}
