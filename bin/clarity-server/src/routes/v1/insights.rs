//! Read-only views of the analysis pipeline: topics, counters and a dry-run
//! analysis of arbitrary text.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use clarity_types::{
    AnalysisResponse, EmotionalState, ErrorBody, Intervention, PatternMatch, ProcessingStats, TopicInfo,
    TopicPrediction,
};
use utoipa::OpenApi;
use validator::Validate;

use crate::error::ServerError;
use crate::middleware::ApiJson;
use crate::schemas::AnalyzeRequest;
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(list_topics, processing_stats, analyze),
    components(schemas(
        TopicInfo,
        ProcessingStats,
        AnalyzeRequest,
        AnalysisResponse,
        PatternMatch,
        EmotionalState,
        TopicPrediction,
        Intervention
    ))
)]
pub struct InsightsApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/topics", get(list_topics))
        .route("/stats", get(processing_stats))
        .route("/analyze", post(analyze))
}

/// Topics the classifier currently knows.
#[utoipa::path(
    get,
    path = "/api/v1/topics",
    tag = "insights",
    responses((status = 200, description = "Known topics", body = Vec<TopicInfo>))
)]
pub async fn list_topics(State(state): State<Arc<AppState>>) -> Json<Vec<TopicInfo>> {
    Json(state.therapy.topic_model().info())
}

#[utoipa::path(
    get,
    path = "/api/v1/stats",
    tag = "insights",
    responses(
        (status = 200, description = "Corpus and session counters", body = ProcessingStats),
        (status = 500, description = "Database error", body = ErrorBody),
    )
)]
pub async fn processing_stats(State(state): State<Arc<AppState>>) -> Result<Json<ProcessingStats>, ServerError> {
    Ok(Json(state.therapy.stats().await?))
}

/// Patterns, emotional state, topic and interventions for `text`, without
/// generating a reply or storing anything.
#[utoipa::path(
    post,
    path = "/api/v1/analyze",
    tag = "insights",
    request_body = AnalyzeRequest,
    responses(
        (status = 200, description = "Analysis", body = AnalysisResponse),
        (status = 422, description = "Invalid request body", body = ErrorBody),
    )
)]
pub async fn analyze(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<AnalyzeRequest>,
) -> Result<Json<AnalysisResponse>, ServerError> {
    req.validate()?;
    Ok(Json(state.therapy.analyze(&req.text).into_response()))
}
