//! Maintenance of the imported corpus: vector reindexing and topic training.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use clarity_types::ErrorBody;
use utoipa::OpenApi;

use crate::error::ServerError;
use crate::schemas::{ReindexResponse, TrainResponse};
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(paths(reindex, train_topics), components(schemas(ReindexResponse, TrainResponse)))]
pub struct CorpusApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/reindex", post(reindex))
        .route("/topics/train", post(train_topics))
}

/// Rebuild the vector store from `conversation_data`.
#[utoipa::path(
    post,
    path = "/api/v1/admin/reindex",
    tag = "admin",
    responses(
        (status = 200, description = "Store rebuilt", body = ReindexResponse),
        (status = 401, description = "Invalid admin token", body = ErrorBody),
        (status = 500, description = "Reindex failed", body = ErrorBody),
    )
)]
pub async fn reindex(State(state): State<Arc<AppState>>) -> Result<Json<ReindexResponse>, ServerError> {
    let conversations = state.therapy.reindex().await?;
    Ok(Json(ReindexResponse {
        message: format!("Reindexed {conversations} conversations"),
        conversations,
    }))
}

/// Fit the topic model on the corpus and swap it in.
#[utoipa::path(
    post,
    path = "/api/v1/admin/topics/train",
    tag = "admin",
    responses(
        (status = 200, description = "Model trained", body = TrainResponse),
        (status = 400, description = "Corpus is empty", body = ErrorBody),
        (status = 401, description = "Invalid admin token", body = ErrorBody),
    )
)]
pub async fn train_topics(State(state): State<Arc<AppState>>) -> Result<Json<TrainResponse>, ServerError> {
    let report = state.therapy.train_topics().await?;
    Ok(Json(TrainResponse {
        documents: report.documents,
        topics: report.topics,
        assigned: report.assigned,
    }))
}

#[cfg(test)]
mod test {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};

    use crate::config::Config;
    use crate::routes::test_support::{app, send, state_with};
    use crate::services::AuthClient;

    fn post(uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::post(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn open_without_admin_token() {
        let (app, state) = app().await;
        state
            .therapy
            .import_dataset(r#"{"Context": "I cannot sleep at night, insomnia is ruining me", "Response": "Sleep trouble is hard. A steady bedtime routine can help a lot."}"#)
            .await
            .unwrap();

        let (status, body) = send(&app, post("/api/v1/admin/reindex", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["conversations"], 1);
        assert_eq!(body["message"], "Reindexed 1 conversations");

        let (status, body) = send(&app, post("/api/v1/admin/topics/train", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["documents"], 1);
    }

    #[tokio::test]
    async fn training_on_empty_corpus_is_bad_request() {
        let (app, _) = app().await;
        let (status, _) = send(&app, post("/api/v1/admin/topics/train", None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn admin_token_is_enforced() {
        let config = Config {
            admin_token: Some("s3cret".into()),
            ..Default::default()
        };
        let app = crate::routes::build(state_with(config, AuthClient::disabled()).await);

        let (status, body) = send(&app, post("/api/v1/admin/reindex", None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["detail"], "Invalid admin token");
        let (status, _) = send(&app, post("/api/v1/admin/reindex", Some("wrong"))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = send(&app, post("/api/v1/admin/reindex", Some("s3cret"))).await;
        assert_eq!(status, StatusCode::OK);
    }
}
