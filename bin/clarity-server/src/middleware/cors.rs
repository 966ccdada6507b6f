use std::sync::Arc;

use axum::http::HeaderValue;
use tower_http::cors::{Any, CorsLayer};

use crate::state::AppState;

/// CORS from `CLARITY_CORS_ORIGINS`: a comma list of origins, or `*`.
pub fn cors_layer(state: &Arc<AppState>) -> CorsLayer {
    let raw = state.config.cors_allowed_origins.trim();
    let origins: Vec<HeaderValue> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty() && *s != "*")
        .filter_map(|s| s.parse().ok())
        .collect();

    if raw.split(',').any(|s| s.trim() == "*") || origins.is_empty() {
        if raw != "*" {
            tracing::warn!(origins = %raw, "no usable CORS origins configured, allowing any");
        }
        CorsLayer::new()
            .allow_origin(Any)
            .allow_headers(Any)
            .allow_methods(Any)
    } else {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_headers(Any)
            .allow_methods(Any)
    }
}
