use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::chat::PsychologicalInsight;

/// Author of a stored message.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Sender {
    User,
    Ai,
}

/// One row of `GET /session/{id}/history`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct HistoryEntry {
    pub content: String,
    pub sender: Sender,
    /// RFC 3339.
    pub timestamp: String,
    #[serde(default)]
    pub psychological_insight: Option<PsychologicalInsight>,
    #[serde(default)]
    pub emotional_state: Option<String>,
    #[serde(default)]
    pub topic_classification: Option<String>,
    #[serde(default)]
    pub confidence_score: Option<f64>,
}

/// Full transcript of a session, oldest message first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SessionHistory {
    pub history: Vec<HistoryEntry>,
    pub message_count: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_created: Option<String>,
}

impl SessionHistory {
    /// Returned for sessions that do not exist yet.
    pub fn empty() -> Self {
        Self {
            history: Vec::new(),
            message_count: 0,
            session_created: None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn sender_round_trips_through_strings() {
        assert_eq!(Sender::Ai.to_string(), "ai");
        assert_eq!(Sender::from_str("user").unwrap(), Sender::User);
        assert!(Sender::from_str("therapist").is_err());
    }
}
