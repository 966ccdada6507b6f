use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

/// Upper bound on a single user message, in characters.
pub const MAX_MESSAGE_CHARS: u64 = 2000;

/// Body of `POST /api/v1/chat`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Validate)]
pub struct ChatRequest {
    /// What the user typed.
    #[validate(length(min = 1, max = 2000))]
    pub content: String,
    /// Conversation the message belongs to. Created on first use.
    #[validate(length(min = 1, max = 128))]
    pub session_id: String,
    /// Free-form client context (locale, screen, ...). The server adds
    /// `user_id`/`email` when the caller is authenticated.
    #[serde(default)]
    #[schema(value_type = Object)]
    pub context: HashMap<String, serde_json::Value>,
}

impl ChatRequest {
    pub fn new(session_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            session_id: session_id.into(),
            context: HashMap::new(),
        }
    }
}

/// The pattern the reply was shaped around.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PsychologicalInsight {
    pub pattern_detected: String,
    /// In `[0, 1]`.
    pub confidence: f64,
    pub therapeutic_approach: String,
    pub suggested_response: String,
}

/// A generated reply, as returned by `POST /chat` and carried in the
/// `chat_response` WebSocket event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ChatResponse {
    pub content: String,
    pub session_id: String,
    /// RFC 3339.
    pub timestamp: String,
    /// In `[0, 1]`; reflects how much context backed the reply.
    pub confidence_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub psychological_insight: Option<PsychologicalInsight>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emotional_state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic_classification: Option<String>,
    #[serde(default)]
    pub suggestions: Vec<String>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn empty_content_is_rejected() {
        let req = ChatRequest::new("s-1", "");
        assert!(req.validate().is_err());
    }

    #[test]
    fn overlong_content_is_rejected() {
        let req = ChatRequest::new("s-1", "a".repeat(MAX_MESSAGE_CHARS as usize + 1));
        assert!(req.validate().is_err());
    }

    #[test]
    fn context_defaults_to_empty() {
        let req: ChatRequest =
            serde_json::from_str(r#"{"content":"hi","session_id":"s-1"}"#).unwrap();
        assert!(req.context.is_empty());
        assert!(req.validate().is_ok());
    }

    #[test]
    fn optional_fields_are_omitted() {
        let resp = ChatResponse {
            content: "hello".into(),
            session_id: "s-1".into(),
            timestamp: "2024-01-01T00:00:00Z".into(),
            confidence_score: 0.3,
            psychological_insight: None,
            emotional_state: None,
            topic_classification: None,
            suggestions: vec![],
        };
        let v = serde_json::to_value(&resp).unwrap();
        assert!(v.get("psychological_insight").is_none());
        assert_eq!(v["suggestions"], serde_json::json!([]));
    }
}
