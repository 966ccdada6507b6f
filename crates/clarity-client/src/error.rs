use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-2xx answer; `detail` comes from the error body when present.
    #[error("api error ({status}): {detail}")]
    Api { status: u16, detail: String },

    #[error("websocket error: {0}")]
    WebSocket(#[from] Box<tokio_tungstenite::tungstenite::Error>),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    /// The socket is not connected; callers fall back to HTTP.
    #[error("websocket not connected")]
    NotConnected,

    #[error("timed out waiting for a reply")]
    Timeout,

    /// The socket dropped after the message was written. It is not resent.
    #[error("connection dropped before the reply arrived")]
    ReplyLost,

    #[error("server error: {0}")]
    Server(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for ClientError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        ClientError::WebSocket(Box::new(e))
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
