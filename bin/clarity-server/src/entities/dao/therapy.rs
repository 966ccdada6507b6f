use chrono::{DateTime, Utc};
use clarity_types::TherapySessionResponse;

use crate::entities::format_ts;

/// A row in the `therapy_sessions` table; at most one per chat session.
#[derive(Debug, Clone, PartialEq)]
pub struct TherapySession {
    pub id: String,
    pub session_id: String,
    pub user_id: Option<String>,
    pub session_name: Option<String>,
    pub session_summary: Option<String>,
    pub mood_before: Option<String>,
    pub mood_after: Option<String>,
    pub topics_discussed: Vec<String>,
    pub insights_generated: Vec<String>,
    /// Seconds.
    pub session_duration: Option<i64>,
    pub session_rating: Option<i64>,
    pub is_completed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl TherapySession {
    pub fn to_response(&self) -> TherapySessionResponse {
        TherapySessionResponse {
            session_id: self.session_id.clone(),
            user_id: self.user_id.clone(),
            session_name: self.session_name.clone(),
            session_summary: self.session_summary.clone(),
            mood_before: self.mood_before.clone(),
            mood_after: self.mood_after.clone(),
            topics_discussed: self.topics_discussed.clone(),
            insights_generated: self.insights_generated.clone(),
            session_duration: self.session_duration,
            session_rating: self.session_rating,
            is_completed: self.is_completed,
            created_at: format_ts(&self.created_at),
            updated_at: self.updated_at.as_ref().map(format_ts),
        }
    }
}
