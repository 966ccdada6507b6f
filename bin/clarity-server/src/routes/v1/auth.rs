//! Routes for signed-in users under `/api/v1/auth`. Every handler requires
//! a bearer token verified against the auth platform.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{delete, get};
use axum::{Json, Router};
use chrono::Utc;
use clarity_types::{ErrorBody, TherapySessionResponse, UserProfileResponse, UserProfileUpdate, UserSessionSummary};
use utoipa::OpenApi;
use validator::Validate;

use crate::entities::{Profile, ProfileStore, SessionStore, TherapyStore};
use crate::error::ServerError;
use crate::middleware::{ApiJson, RequireUser};
use crate::schemas::{MessageResponse, UserSessionList};
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(get_profile, update_profile, list_sessions, delete_user_session, list_therapy_sessions),
    components(schemas(
        UserProfileResponse,
        UserProfileUpdate,
        UserSessionList,
        UserSessionSummary,
        TherapySessionResponse
    ))
)]
pub struct AuthApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/profile", get(get_profile).put(update_profile))
        .route("/sessions", get(list_sessions))
        .route("/sessions/{id}", delete(delete_user_session))
        .route("/therapy-sessions", get(list_therapy_sessions))
}

/// The caller's profile, created from the token's metadata on first read.
#[utoipa::path(
    get,
    path = "/api/v1/auth/profile",
    tag = "auth",
    responses(
        (status = 200, description = "Profile", body = UserProfileResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorBody),
        (status = 503, description = "Auth platform not configured", body = ErrorBody),
    )
)]
pub async fn get_profile(
    State(state): State<Arc<AppState>>,
    RequireUser(user): RequireUser,
) -> Result<Json<UserProfileResponse>, ServerError> {
    if let Some(profile) = state.store.get_profile(&user.user_id).await? {
        return Ok(Json(profile.to_response()));
    }

    let profile = Profile {
        user_id: user.user_id.clone(),
        email: user.email.clone(),
        full_name: user.metadata_str("full_name").unwrap_or_default().to_string(),
        avatar_url: user.metadata_str("avatar_url").map(str::to_string),
        preferences: HashMap::new(),
        therapy_goals: Vec::new(),
        created_at: Utc::now(),
        updated_at: None,
    };
    let profile = state.store.insert_profile(&profile).await?;
    tracing::info!(user_id = %profile.user_id, "created profile");
    state.auth.mirror_profile(&profile).await;
    Ok(Json(profile.to_response()))
}

#[utoipa::path(
    put,
    path = "/api/v1/auth/profile",
    tag = "auth",
    request_body = UserProfileUpdate,
    responses(
        (status = 200, description = "Updated profile", body = UserProfileResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorBody),
        (status = 404, description = "Profile not created yet", body = ErrorBody),
        (status = 422, description = "Invalid request body", body = ErrorBody),
    )
)]
pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    RequireUser(user): RequireUser,
    ApiJson(update): ApiJson<UserProfileUpdate>,
) -> Result<Json<UserProfileResponse>, ServerError> {
    update.validate()?;
    let profile = state
        .store
        .update_profile(&user.user_id, &update)
        .await?
        .ok_or_else(|| ServerError::NotFound("User profile not found".into()))?;
    Ok(Json(profile.to_response()))
}

/// Active sessions, most recently updated first.
#[utoipa::path(
    get,
    path = "/api/v1/auth/sessions",
    tag = "auth",
    responses(
        (status = 200, description = "Sessions", body = UserSessionList),
        (status = 401, description = "Missing or invalid token", body = ErrorBody),
    )
)]
pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
    RequireUser(user): RequireUser,
) -> Result<Json<UserSessionList>, ServerError> {
    let sessions = state.store.list_user_sessions(&user.user_id).await?;
    Ok(Json(UserSessionList {
        sessions: sessions.iter().map(|s| s.to_summary()).collect(),
    }))
}

/// Hide a session from the caller's list. Messages are kept.
#[utoipa::path(
    delete,
    path = "/api/v1/auth/sessions/{id}",
    tag = "auth",
    params(("id" = String, Path, description = "Chat session id")),
    responses(
        (status = 200, description = "Session deactivated", body = MessageResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorBody),
        (status = 404, description = "Not one of the caller's sessions", body = ErrorBody),
    )
)]
pub async fn delete_user_session(
    State(state): State<Arc<AppState>>,
    RequireUser(user): RequireUser,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ServerError> {
    if !state.store.deactivate_session(&id, &user.user_id).await? {
        return Err(ServerError::NotFound("Session not found".into()));
    }
    Ok(Json(MessageResponse::new("Session deleted successfully")))
}

/// Stored session summaries, newest first.
#[utoipa::path(
    get,
    path = "/api/v1/auth/therapy-sessions",
    tag = "auth",
    responses(
        (status = 200, description = "Therapy sessions", body = Vec<TherapySessionResponse>),
        (status = 401, description = "Missing or invalid token", body = ErrorBody),
    )
)]
pub async fn list_therapy_sessions(
    State(state): State<Arc<AppState>>,
    RequireUser(user): RequireUser,
) -> Result<Json<Vec<TherapySessionResponse>>, ServerError> {
    let records = state.store.list_therapy_sessions(&user.user_id).await?;
    Ok(Json(records.iter().map(|t| t.to_response()).collect()))
}
