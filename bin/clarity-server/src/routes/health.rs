//! Banner and liveness endpoints.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{Value, json};
use utoipa::OpenApi;

use crate::routes::doc::OPENAPI_PATH;
use crate::schemas::ServiceInfo;
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(paths(get_root, get_health), components(schemas(ServiceInfo)))]
pub struct HealthApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(get_root))
        .route("/health", get(get_health))
}

#[utoipa::path(
    get,
    path = "/",
    tag = "health",
    responses((status = 200, description = "Service banner", body = ServiceInfo))
)]
pub async fn get_root(State(state): State<Arc<AppState>>) -> Json<ServiceInfo> {
    Json(ServiceInfo {
        message: "Clarity AI Therapy Assistant Backend".into(),
        version: env!("CARGO_PKG_VERSION").into(),
        status: "operational".into(),
        docs: state.config.enable_docs.then(|| OPENAPI_PATH.to_string()),
    })
}

/// Liveness probe for load balancers; does not touch dependencies.
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses((status = 200, description = "Server is up", body = Value))
)]
pub async fn get_health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
