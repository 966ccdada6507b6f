//! `POST /api/v1/chat`: one message in, one reply out.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use clarity_types::{ChatRequest, ChatResponse, ErrorBody, PsychologicalInsight};
use serde_json::json;
use utoipa::OpenApi;
use validator::Validate;

use crate::error::ServerError;
use crate::middleware::{ApiJson, CurrentUser};
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(chat),
    components(schemas(ChatRequest, ChatResponse, PsychologicalInsight, ErrorBody))
)]
pub struct ChatApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/chat", post(chat))
}

/// Analyse a message and answer it.
///
/// Signed-in callers own the sessions they create; anonymous sessions are
/// open to anyone holding the id.
#[utoipa::path(
    post,
    path = "/api/v1/chat",
    tag = "chat",
    request_body = ChatRequest,
    responses(
        (status = 200, description = "Generated reply", body = ChatResponse),
        (status = 403, description = "Session belongs to another user", body = ErrorBody),
        (status = 422, description = "Invalid request body", body = ErrorBody),
        (status = 500, description = "Processing failed", body = ErrorBody),
    )
)]
pub async fn chat(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ApiJson(mut req): ApiJson<ChatRequest>,
) -> Result<Json<ChatResponse>, ServerError> {
    req.validate()?;
    if let Some(u) = user.user() {
        req.context.insert("user_id".into(), json!(u.user_id));
        req.context.insert("email".into(), json!(u.email));
    }
    let response = state.therapy.process_message(&req, user.user()).await?;
    Ok(Json(response))
}
