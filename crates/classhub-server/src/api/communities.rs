use crate::auth::AuthUser;
use crate::error::{AppError, Result};
use crate::models::{
    Community, CommunitySummary, CreateCommunity, JoinRequest, JoinResponse, MembershipResponse,
    Participant, RemoveParticipantRequest, ResolveRequest,
};
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
};

pub async fn list_communities(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
) -> Result<Json<Vec<CommunitySummary>>> {
    let communities = state.admission.list_communities(&identity).await?;
    Ok(Json(communities))
}

pub async fn create_community(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    Json(input): Json<CreateCommunity>,
) -> Result<Json<Community>> {
    let community = state.admission.create_community(&identity, input).await?;
    Ok(Json(community))
}

pub async fn get_community(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<Community>> {
    let community = state.admission.community(&slug).await?;
    Ok(Json(community))
}

pub async fn join_community(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    Path(slug): Path<String>,
) -> Result<Json<JoinResponse>> {
    let outcome = state.admission.request_join(&slug, &identity).await?;
    Ok(Json(outcome.into()))
}

pub async fn exit_community(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    Path(slug): Path<String>,
) -> Result<Json<MembershipResponse>> {
    let response = state.admission.exit_participant(&slug, &identity).await?;
    Ok(Json(response))
}

pub async fn list_join_requests(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    Path(slug): Path<String>,
) -> Result<Json<Vec<JoinRequest>>> {
    let requests = state.admission.join_requests(&slug, &identity).await?;
    Ok(Json(requests))
}

pub async fn resolve_join_request(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    Path((slug, id)): Path<(String, i64)>,
    Json(input): Json<ResolveRequest>,
) -> Result<Json<MembershipResponse>> {
    let action = input.action.unwrap_or_default();
    let response = state
        .admission
        .resolve_request(&slug, id, &action, &identity)
        .await?;
    Ok(Json(response))
}

pub async fn remove_participant(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    Path(slug): Path<String>,
    Json(input): Json<RemoveParticipantRequest>,
) -> Result<Json<MembershipResponse>> {
    let user_id = input
        .user_id
        .ok_or_else(|| AppError::BadRequest("user_id is required".to_string()))?;

    let response = state
        .admission
        .remove_participant(&slug, &identity, user_id)
        .await?;
    Ok(Json(response))
}

pub async fn list_participants(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    Path(slug): Path<String>,
) -> Result<Json<Vec<Participant>>> {
    let community = state.admission.community(&slug).await?;

    // Check membership
    if !identity.owns(&community)
        && !state
            .store
            .is_participant(community.id, identity.id())
            .await?
    {
        return Err(AppError::NotAuthorized);
    }

    let participants = state.store.participants(community.id).await?;
    Ok(Json(participants))
}
