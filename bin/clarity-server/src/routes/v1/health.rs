//! Dependency health for `/api/v1/health`.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{SecondsFormat, Utc};
use clarity_types::HealthCheck;
use utoipa::OpenApi;

use crate::state::AppState;

const OPERATIONAL: &str = "operational";

#[derive(OpenApi)]
#[openapi(paths(service_health), components(schemas(HealthCheck)))]
pub struct HealthApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(service_health))
}

/// Status of the database, vector store, LLM and topic model.
///
/// Always answers 200; `status` is `"unhealthy"` when the database is down.
/// The LLM reports `fallback` while no API key is configured.
#[utoipa::path(
    get,
    path = "/api/v1/health",
    tag = "health",
    responses((status = 200, description = "Dependency status", body = HealthCheck))
)]
pub async fn service_health(State(state): State<Arc<AppState>>) -> Json<HealthCheck> {
    let mut services = BTreeMap::new();

    let database_ok = match state.store.ping().await {
        Ok(()) => true,
        Err(e) => {
            tracing::error!(error = %e, "database health check failed");
            false
        }
    };
    services.insert("database".to_string(), status(database_ok).to_string());

    let vectors = state.therapy.vectors().stats().await;
    tracing::debug!(documents = vectors.total_documents, collection = %vectors.collection_name, "vector store stats");
    services.insert("vector_store".to_string(), OPERATIONAL.to_string());

    let llm = if state.therapy.llm_configured() { OPERATIONAL } else { "fallback" };
    services.insert("llm_service".to_string(), llm.to_string());

    let topics = !state.therapy.topic_model().topics().is_empty();
    services.insert("topic_modeling".to_string(), status(topics).to_string());

    Json(HealthCheck {
        status: if database_ok { "healthy" } else { "unhealthy" }.to_string(),
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
        version: env!("CARGO_PKG_VERSION").to_string(),
        services,
    })
}

fn status(ok: bool) -> &'static str {
    if ok { OPERATIONAL } else { "error" }
}

#[cfg(test)]
mod test {
    use axum::http::StatusCode;

    use crate::routes::test_support::{app, get, send};

    #[tokio::test]
    async fn reports_each_dependency() {
        let (app, _) = app().await;
        let (status, body) = send(&app, get("/api/v1/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["services"]["database"], "operational");
        assert_eq!(body["services"]["vector_store"], "operational");
        assert_eq!(body["services"]["llm_service"], "fallback");
        assert_eq!(body["services"]["topic_modeling"], "operational");
    }
}
