//! WebSocket upgrade route.

use axum::extract::{State, WebSocketUpgrade};
use axum::response::Response;
use axum::routing::get;
use axum::Router;

use crate::middleware::auth::AuthUser;
use crate::session;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/ws", get(ws_upgrade))
}

/// GET /ws: Open a live-delivery session.
///
/// `AuthUser` is extracted before `WebSocketUpgrade`, so a missing, malformed
/// or expired credential is answered with 401 and the connection is never upgraded.
async fn ws_upgrade(
    State(state): State<AppState>,
    auth: AuthUser,
    ws: WebSocketUpgrade,
) -> Response {
    let user_id = auth.user_id;
    tracing::info!(
        user_id = %user_id,
        expires_at = %auth.identity.expires_at,
        "Token valid, upgrading connection"
    );

    ws.on_upgrade(move |socket| session::run(socket, state, user_id))
}
