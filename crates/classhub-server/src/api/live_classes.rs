use crate::auth::AuthUser;
use crate::error::Result;
use crate::models::{CreateLiveClass, LiveClass};
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
};
use serde_json::{Value, json};

pub async fn list_live_classes(State(state): State<AppState>) -> Result<Json<Vec<LiveClass>>> {
    let classes = state.live_classes.list_active().await?;
    Ok(Json(classes))
}

pub async fn create_live_class(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    Json(input): Json<CreateLiveClass>,
) -> Result<Json<LiveClass>> {
    let class = state.live_classes.create(&identity, input).await?;
    Ok(Json(class))
}

pub async fn get_live_class(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<LiveClass>> {
    let class = state.live_classes.get(id).await?;
    Ok(Json(class))
}

pub async fn close_live_class(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<Value>> {
    state.live_classes.deactivate(id, &identity).await?;
    Ok(Json(json!({ "status": "live class closed" })))
}
