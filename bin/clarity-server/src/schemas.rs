//! Request and response bodies that only the server speaks.

use clarity_types::UserSessionSummary;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

/// Body of `GET /`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    pub message: String,
    pub version: String,
    pub status: String,
    pub docs: Option<String>,
}

/// Acknowledgement for operations without a richer result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Validate)]
pub struct AnalyzeRequest {
    #[validate(length(min = 1, max = 2000))]
    pub text: String,
}

/// Body of `GET /api/v1/auth/sessions`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct UserSessionList {
    pub sessions: Vec<UserSessionSummary>,
}

/// Result of `POST /api/v1/admin/reindex`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ReindexResponse {
    pub message: String,
    pub conversations: usize,
}

/// Result of `POST /api/v1/admin/topics/train`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TrainResponse {
    pub documents: usize,
    pub topics: usize,
    pub assigned: usize,
}
