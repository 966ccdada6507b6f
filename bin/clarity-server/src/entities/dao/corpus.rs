use chrono::{DateTime, Utc};
use clarity_core::vector_store::ConversationRecord;

/// A row in the `conversation_data` table: one imported counseling exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct Conversation {
    pub conversation_id: String,
    pub user_message: String,
    pub therapist_response: String,
    /// Set by topic training.
    pub topic_id: Option<i64>,
    pub topic: Option<String>,
    pub emotional_tone: Option<String>,
    pub patterns: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    pub fn to_record(&self) -> ConversationRecord {
        ConversationRecord {
            conversation_id: self.conversation_id.clone(),
            user_message: self.user_message.clone(),
            therapist_response: self.therapist_response.clone(),
            topic: self.topic.clone(),
            emotional_tone: self.emotional_tone.clone(),
            patterns: self.patterns.clone(),
        }
    }
}
