//! Frames exchanged over `/api/v1/ws/{session_id}`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::chat::ChatResponse;

/// A frame sent by the client.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WsClientMessage {
    pub content: String,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub context: HashMap<String, serde_json::Value>,
}

/// A frame sent by the server, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsServerEvent {
    ChatResponse { data: ChatResponse },
    Typing {
        #[serde(rename = "isTyping")]
        is_typing: bool,
    },
    Error { message: String },
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn typing_uses_camel_case_flag() {
        let v = serde_json::to_value(WsServerEvent::Typing { is_typing: true }).unwrap();
        assert_eq!(v, json!({ "type": "typing", "isTyping": true }));
    }

    #[test]
    fn error_event_shape() {
        let v = serde_json::to_value(WsServerEvent::Error { message: "boom".into() }).unwrap();
        assert_eq!(v, json!({ "type": "error", "message": "boom" }));
    }

    #[test]
    fn chat_response_is_nested_under_data() {
        let raw = json!({
            "type": "chat_response",
            "data": {
                "content": "hi",
                "session_id": "s",
                "timestamp": "2024-01-01T00:00:00Z",
                "confidence_score": 0.5
            }
        });
        let ev: WsServerEvent = serde_json::from_value(raw).unwrap();
        match ev {
            WsServerEvent::ChatResponse { data } => assert_eq!(data.content, "hi"),
            other => panic!("unexpected event {other:?}"),
        }
    }
}
