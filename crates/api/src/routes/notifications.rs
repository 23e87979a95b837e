//! Read endpoint and mark-as-read.

use axum::extract::{Path, Query, State};
use axum::routing::{get, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use herald_common::error::AppError;
use herald_common::types::Notification;
use herald_engine::store::ListQuery;

use crate::middleware::auth::AuthUser;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/notifications/{id}", get(list_notifications))
        .route("/notifications/{id}/read", put(mark_as_read))
}

/// Query parameters for listing. Both are lenient: bad values fall back to defaults.
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub limit: Option<String>,
    #[serde(rename = "unreadOnly", alias = "unread")]
    pub unread_only: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct NotificationList {
    pub notifications: Vec<Notification>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct MarkReadResponse {
    pub message: &'static str,
    pub id: Uuid,
}

/// GET /notifications/{id}: List the caller's own notifications, newest first.
///
/// A malformed id is rejected before the credential is checked.
async fn list_notifications(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    auth: Result<AuthUser, AppError>,
    Query(params): Query<ListParams>,
) -> Result<Json<NotificationList>, AppError> {
    let user_id = Uuid::parse_str(&user_id)
        .map_err(|_| AppError::Validation("Invalid userId format".to_string()))?;
    let auth = auth?;

    if auth.user_id != user_id {
        return Err(AppError::Forbidden(
            "unauthorized to access these notifications".to_string(),
        ));
    }

    let unread_only = params
        .unread_only
        .as_deref()
        .is_some_and(|v| v.eq_ignore_ascii_case("true"));
    let query = ListQuery::from_params(params.limit.as_deref(), unread_only);

    let notifications = state.store.list_for(user_id, query).await?;
    Ok(Json(NotificationList {
        count: notifications.len(),
        notifications,
    }))
}

/// PUT /notifications/{id}/read: Mark one of the caller's notifications read.
///
/// Someone else's notification is reported as not found.
async fn mark_as_read(
    State(state): State<AppState>,
    Path(notification_id): Path<String>,
    auth: Result<AuthUser, AppError>,
) -> Result<Json<MarkReadResponse>, AppError> {
    let notification_id = Uuid::parse_str(&notification_id)
        .map_err(|_| AppError::Validation("Invalid notificationId format".to_string()))?;
    let auth = auth?;

    let notification = state
        .store
        .mark_read(notification_id, auth.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Notification not found or unauthorized".to_string()))?;

    Ok(Json(MarkReadResponse {
        message: "Notification marked as read",
        id: notification.id,
    }))
}
