use std::collections::HashMap;

use chrono::{DateTime, Utc};
use clarity_types::UserProfileResponse;

use crate::entities::format_ts;

/// A row in the `profiles` table.
#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    pub user_id: String,
    pub email: String,
    pub full_name: String,
    pub avatar_url: Option<String>,
    pub preferences: HashMap<String, serde_json::Value>,
    pub therapy_goals: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Profile {
    pub fn to_response(&self) -> UserProfileResponse {
        UserProfileResponse {
            user_id: self.user_id.clone(),
            email: self.email.clone(),
            full_name: self.full_name.clone(),
            avatar_url: self.avatar_url.clone(),
            preferences: self.preferences.clone(),
            therapy_goals: self.therapy_goals.clone(),
            created_at: format_ts(&self.created_at),
            updated_at: self.updated_at.as_ref().map(format_ts),
        }
    }
}
