use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Body of `GET /api/v1/health`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct HealthCheck {
    /// `"healthy"` or `"unhealthy"`.
    pub status: String,
    pub timestamp: String,
    pub version: String,
    /// Per-dependency status, e.g. `{"database": "operational"}`.
    pub services: BTreeMap<String, String>,
}

impl HealthCheck {
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

/// Body of `GET /api/v1/stats`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ProcessingStats {
    pub total_conversations: i64,
    pub active_sessions: i64,
    pub topics_identified: i64,
    pub patterns_detected: i64,
}
