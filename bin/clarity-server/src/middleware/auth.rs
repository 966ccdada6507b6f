//! Admin-token guard and caller-identity extractors.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{FromRequestParts, Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::error::ServerError;
use crate::services::AuthUser;
use crate::state::AppState;

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Guards `/admin` with `CLARITY_ADMIN_TOKEN`. Open when no token is set.
pub async fn admin_middleware(State(state): State<Arc<AppState>>, req: Request<Body>, next: Next) -> Response {
    if let Some(expected) = state.config.admin_token.as_deref() {
        match bearer_token(req.headers()) {
            Some(token) if token == expected => {}
            _ => {
                tracing::warn!(path = %req.uri().path(), "rejected admin request");
                return ServerError::Unauthorized("Invalid admin token".into()).into_response();
            }
        }
    }
    next.run(req).await
}

/// The caller when a valid bearer token was sent, anonymous otherwise.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Option<AuthUser>);

impl CurrentUser {
    pub fn user(&self) -> Option<&AuthUser> {
        self.0.as_ref()
    }
}

impl FromRequestParts<Arc<AppState>> for CurrentUser {
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let Some(token) = bearer_token(&parts.headers) else {
            return Ok(CurrentUser(None));
        };
        match state.auth.verify(token).await {
            Ok(user) => Ok(CurrentUser(Some(user))),
            Err(e) => {
                tracing::debug!(error = %e, "token not accepted, continuing anonymously");
                Ok(CurrentUser(None))
            }
        }
    }
}

/// A verified caller; 401 without a valid token, 503 when the auth platform
/// is not configured.
#[derive(Debug, Clone)]
pub struct RequireUser(pub AuthUser);

impl FromRequestParts<Arc<AppState>> for RequireUser {
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)
            .ok_or_else(|| ServerError::Unauthorized("Authentication required".into()))?;
        Ok(RequireUser(state.auth.verify(token).await?))
    }
}
