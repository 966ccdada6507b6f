use thiserror::Error;

/// Errors raised by the analysis / retrieval / generation pipeline.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A remote service was called without the credentials it needs.
    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    /// Transport failure talking to a remote API.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The remote API answered with a non-success status.
    #[error("api error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The remote API answered 2xx but the body was not what we expected.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("invalid pattern: {0}")]
    Regex(#[from] regex::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
