//! HTTP middleware stack and request extractors.

pub mod auth;
pub mod cors;
pub mod json;
pub mod trace;

pub use auth::{CurrentUser, RequireUser};
pub use json::ApiJson;
