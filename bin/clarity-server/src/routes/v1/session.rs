use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use clarity_types::{ErrorBody, HistoryEntry, SessionHistory, TherapySessionResponse};
use utoipa::OpenApi;

use crate::error::ServerError;
use crate::middleware::CurrentUser;
use crate::schemas::MessageResponse;
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(session_history, delete_session, summarize_session),
    components(schemas(SessionHistory, HistoryEntry, TherapySessionResponse, MessageResponse))
)]
pub struct SessionApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/session/{id}/history", get(session_history))
        .route("/session/{id}", delete(delete_session))
        .route("/session/{id}/summary", post(summarize_session))
}

/// Messages of a session in order. Unknown sessions yield an empty history.
#[utoipa::path(
    get,
    path = "/api/v1/session/{id}/history",
    tag = "sessions",
    params(("id" = String, Path, description = "Chat session id")),
    responses(
        (status = 200, description = "Session transcript", body = SessionHistory),
        (status = 403, description = "Session belongs to another user", body = ErrorBody),
    )
)]
pub async fn session_history(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<SessionHistory>, ServerError> {
    Ok(Json(state.therapy.session_history(&id, user.user()).await?))
}

/// Delete a session, its messages and its indexed documents.
#[utoipa::path(
    delete,
    path = "/api/v1/session/{id}",
    tag = "sessions",
    params(("id" = String, Path, description = "Chat session id")),
    responses(
        (status = 200, description = "Session deleted", body = MessageResponse),
        (status = 403, description = "Session belongs to another user", body = ErrorBody),
    )
)]
pub async fn delete_session(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ServerError> {
    state.therapy.delete_session(&id, user.user()).await?;
    Ok(Json(MessageResponse::new("Session deleted successfully")))
}

/// Summarise a session and store it as a completed therapy session.
#[utoipa::path(
    post,
    path = "/api/v1/session/{id}/summary",
    tag = "sessions",
    params(("id" = String, Path, description = "Chat session id")),
    responses(
        (status = 200, description = "Stored summary", body = TherapySessionResponse),
        (status = 403, description = "Session belongs to another user", body = ErrorBody),
        (status = 404, description = "No such session", body = ErrorBody),
    )
)]
pub async fn summarize_session(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<TherapySessionResponse>, ServerError> {
    let record = state.therapy.summarize_session(&id, user.user()).await?;
    Ok(Json(record.to_response()))
}
