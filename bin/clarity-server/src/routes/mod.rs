//! Axum router construction.
//!
//! [`build`] assembles the complete application router:
//! - Middleware layers (CORS, per-request trace id)
//! - Optional OpenAPI document (disable with `CLARITY_ENABLE_DOCS=false`)
//! - Banner and liveness routes
//! - `/api/v1` chat, session, analysis and socket routes
//! - `/api/v1/auth` routes for signed-in users
//! - `/api/v1/admin` routes (optionally protected by bearer token)

mod admin;
pub mod doc;
mod health;
mod v1;

use std::sync::Arc;

use axum::routing::get;
use axum::{Router, middleware};
use tower::ServiceBuilder;

use crate::middleware::{cors, trace};
use crate::state::AppState;

/// Build the complete Axum [`Router`] for the application.
pub fn build(state: Arc<AppState>) -> Router {
    let mut app = Router::new()
        .merge(health::router())
        .nest("/api/v1", v1::router(state.clone()));

    if state.config.enable_docs {
        app = app.route(doc::OPENAPI_PATH, get(doc::openapi_json));
    }

    app
        // Outermost layers execute first on the way in.
        .layer(ServiceBuilder::new().layer(cors::cors_layer(&state)))
        .layer(middleware::from_fn(trace::trace_middleware))
        .with_state(state)
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use axum::Router;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::config::Config;
    use crate::services::AuthClient;
    use crate::services::therapy::test::offline_service;
    use crate::state::AppState;

    pub async fn state_with(config: Config, auth: AuthClient) -> Arc<AppState> {
        Arc::new(AppState::new(config, offline_service().await, auth))
    }

    pub async fn app() -> (Router, Arc<AppState>) {
        let state = state_with(Config::default(), AuthClient::disabled()).await;
        (super::build(state.clone()), state)
    }

    /// Sends one request through the router; the body is decoded as JSON
    /// (`Null` when empty).
    pub async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let res = app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    pub fn get(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).unwrap()
    }

    pub fn json(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }
}

#[cfg(test)]
mod test {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;
    use tracing_test::traced_test;

    use super::test_support::*;
    use crate::middleware::trace::X_TRACE_ID;

    #[tokio::test]
    #[traced_test]
    async fn trace_id_is_echoed() {
        let (app, _) = app().await;
        let id = "6f1c1f5e-7a47-4b36-9a37-0b3d8f1e4f11";
        let req = Request::get("/health").header(X_TRACE_ID, id).body(Body::empty()).unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers()[X_TRACE_ID], id);
        assert!(logs_contain("response finished"));
        assert!(logs_contain(id));
    }

    #[tokio::test]
    async fn trace_id_is_generated() {
        let (app, _) = app().await;
        let res = app.oneshot(get("/health")).await.unwrap();
        let header = res.headers()[X_TRACE_ID].to_str().unwrap();
        assert!(uuid::Uuid::parse_str(header).is_ok());
    }

    #[tokio::test]
    async fn openapi_document_lists_chat_route() {
        let (app, _) = app().await;
        let (status, body) = send(&app, get("/api-docs/openapi.json")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["paths"]["/api/v1/chat"]["post"].is_object());
        assert!(body["paths"]["/api/v1/auth/profile"]["get"].is_object());
    }

    #[tokio::test]
    async fn docs_can_be_disabled() {
        let config = crate::config::Config {
            enable_docs: false,
            ..Default::default()
        };
        let state = state_with(config, crate::services::AuthClient::disabled()).await;
        let app = super::build(state);
        let (status, _) = send(&app, get("/api-docs/openapi.json")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
