use chrono::{DateTime, Utc};
use clarity_types::UserSessionSummary;

use crate::entities::format_ts;

/// A row in the `chat_sessions` table.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatSession {
    pub id: String,
    /// `None` for anonymous sessions.
    pub user_id: Option<String>,
    pub title: Option<String>,
    pub is_active: bool,
    pub message_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChatSession {
    /// Owned sessions are visible to their owner only; anonymous ones to
    /// anyone.
    pub fn is_visible_to(&self, user_id: Option<&str>) -> bool {
        match &self.user_id {
            None => true,
            Some(owner) => user_id == Some(owner.as_str()),
        }
    }

    pub fn to_summary(&self) -> UserSessionSummary {
        UserSessionSummary {
            session_id: self.id.clone(),
            title: self.title.clone(),
            created_at: format_ts(&self.created_at),
            updated_at: format_ts(&self.updated_at),
            message_count: self.message_count,
        }
    }
}
