use axum::extract::FromRequest;

use crate::error::ServerError;

/// `axum::Json` whose rejections render as `{"detail": ...}`: 422 for a
/// body that does not fit the type, 400 for everything else.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ServerError))]
pub struct ApiJson<T>(pub T);
