pub mod auth;
pub mod chat;
pub mod health;
pub mod insights;
pub mod session;
pub mod ws;

use std::sync::Arc;

use axum::Router;
use utoipa::OpenApi;

use crate::routes::admin;
use crate::state::AppState;

/// Routes nested under `/api/v1`.
pub fn router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .merge(chat::router())
        .merge(session::router())
        .merge(insights::router())
        .merge(health::router())
        .merge(ws::router())
        .nest("/auth", auth::router())
        .nest("/admin", admin::router(state))
}

#[derive(OpenApi)]
#[openapi()]
pub struct V1Api;

pub fn api_docs() -> utoipa::openapi::OpenApi {
    let mut spec = V1Api::openapi();
    spec.merge(chat::ChatApi::openapi());
    spec.merge(session::SessionApi::openapi());
    spec.merge(insights::InsightsApi::openapi());
    spec.merge(health::HealthApi::openapi());
    spec.merge(ws::WsApi::openapi());
    spec.merge(auth::AuthApi::openapi());
    spec
}
