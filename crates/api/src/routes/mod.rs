pub mod health;
pub mod notifications;
pub mod webhook;
pub mod ws;

use axum::Router;

use crate::state::AppState;

/// Build the complete API router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .merge(webhook::router())
        .merge(notifications::router())
        .merge(ws::router())
        .with_state(state)
}
