use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A conversation topic known to the topic model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TopicInfo {
    pub topic_id: i64,
    pub topic_name: String,
    pub description: String,
    pub keywords: Vec<String>,
    /// Corpus documents assigned to the topic by the last training run.
    pub document_count: i64,
}
