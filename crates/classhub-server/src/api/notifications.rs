use crate::auth::AuthUser;
use crate::error::Result;
use crate::models::Notification;
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
};

pub async fn list_notifications(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
) -> Result<Json<Vec<Notification>>> {
    let notifications = state.store.notifications(identity.id()).await?;
    Ok(Json(notifications))
}

pub async fn mark_read(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<Notification>> {
    let notification = state
        .store
        .mark_notification_read(identity.id(), id)
        .await?;
    Ok(Json(notification))
}
