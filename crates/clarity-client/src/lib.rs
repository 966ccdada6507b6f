//! Client side of the Clarity API.
//!
//! [`ApiClient`] wraps the REST endpoints. [`ChatSocket`] keeps one WebSocket
//! per chat session alive in a background task and reconnects with capped
//! exponential backoff. [`ChatClient`] sends over the socket while it is up
//! and falls back to `POST /api/v1/chat` otherwise.

pub mod chat;
pub mod error;
pub mod http;
pub mod reconnect;
pub mod ws;

pub use chat::ChatClient;
pub use error::{ClientError, Result};
pub use http::ApiClient;
pub use reconnect::{Backoff, ReconnectPolicy};
pub use ws::{ChatSocket, SocketEvent};

/// Base URL used when neither `CLARITY_API_URL` nor `VITE_API_URL` is set.
pub const DEFAULT_API_URL: &str = "http://localhost:8000";

/// Resolves the API base URL from the environment.
pub fn api_url_from_env() -> String {
    ["CLARITY_API_URL", "VITE_API_URL"]
        .iter()
        .find_map(|k| std::env::var(k).ok().filter(|v| !v.trim().is_empty()))
        .unwrap_or_else(|| DEFAULT_API_URL.to_string())
}
