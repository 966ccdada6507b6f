use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct UserProfileResponse {
    pub user_id: String,
    pub email: String,
    pub full_name: String,
    pub avatar_url: Option<String>,
    #[schema(value_type = Object)]
    pub preferences: HashMap<String, serde_json::Value>,
    pub therapy_goals: Vec<String>,
    pub created_at: String,
    pub updated_at: Option<String>,
}

/// Partial update; absent fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema, Validate)]
pub struct UserProfileUpdate {
    #[validate(length(max = 200))]
    pub full_name: Option<String>,
    #[validate(url)]
    pub avatar_url: Option<String>,
    #[schema(value_type = Option<Object>)]
    pub preferences: Option<HashMap<String, serde_json::Value>>,
    pub therapy_goals: Option<Vec<String>>,
}

/// One entry of `GET /api/v1/auth/sessions`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct UserSessionSummary {
    pub session_id: String,
    pub title: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub message_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TherapySessionResponse {
    pub session_id: String,
    pub user_id: Option<String>,
    pub session_name: Option<String>,
    pub session_summary: Option<String>,
    pub mood_before: Option<String>,
    pub mood_after: Option<String>,
    pub topics_discussed: Vec<String>,
    pub insights_generated: Vec<String>,
    /// Seconds between the first and last message.
    pub session_duration: Option<i64>,
    pub session_rating: Option<i64>,
    pub is_completed: bool,
    pub created_at: String,
    pub updated_at: Option<String>,
}
