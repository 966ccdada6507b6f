use chrono::{DateTime, Utc};
use clarity_types::{HistoryEntry, PsychologicalInsight, Sender};

use crate::entities::format_ts;

/// A row in the `chat_messages` table.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub id: String,
    pub session_id: String,
    /// Position within the session, starting at 1.
    pub seq: i64,
    pub sender: Sender,
    pub content: String,
    pub psychological_insight: Option<PsychologicalInsight>,
    pub emotional_state: Option<String>,
    pub topic_classification: Option<String>,
    pub confidence_score: Option<f64>,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn to_entry(&self) -> HistoryEntry {
        HistoryEntry {
            content: self.content.clone(),
            sender: self.sender,
            timestamp: format_ts(&self.created_at),
            psychological_insight: self.psychological_insight.clone(),
            emotional_state: self.emotional_state.clone(),
            topic_classification: self.topic_classification.clone(),
            confidence_score: self.confidence_score,
        }
    }
}

/// A message about to be appended; id, seq and timestamp are assigned by the
/// store.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    pub sender: Sender,
    pub content: String,
    pub psychological_insight: Option<PsychologicalInsight>,
    pub emotional_state: Option<String>,
    pub topic_classification: Option<String>,
    pub confidence_score: Option<f64>,
}

impl NewMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            sender: Sender::User,
            content: content.into(),
            psychological_insight: None,
            emotional_state: None,
            topic_classification: None,
            confidence_score: None,
        }
    }

    pub fn ai(content: impl Into<String>) -> Self {
        Self {
            sender: Sender::Ai,
            ..Self::user(content)
        }
    }
}
