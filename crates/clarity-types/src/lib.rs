//! Wire types shared by the Clarity server and its clients.
//!
//! Everything here is plain data: serde for the JSON shape, `utoipa` for the
//! OpenAPI document and `validator` for request bounds. No I/O lives in this
//! crate.

pub mod analysis;
pub mod chat;
pub mod history;
pub mod profile;
pub mod system;
pub mod topics;
pub mod ws;

pub use analysis::{
    AnalysisResponse, DetectionMethod, EmotionalState, Intensity, Intervention, InterventionKind,
    PatternCategory, PatternMatch, Severity, TopicPrediction,
};
pub use chat::{ChatRequest, ChatResponse, PsychologicalInsight, MAX_MESSAGE_CHARS};
pub use history::{HistoryEntry, Sender, SessionHistory};
pub use profile::{TherapySessionResponse, UserProfileResponse, UserProfileUpdate, UserSessionSummary};
pub use system::{HealthCheck, ProcessingStats};
pub use topics::TopicInfo;
pub use ws::{WsClientMessage, WsServerEvent};

/// JSON body used for every non-2xx API response.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize, utoipa::ToSchema)]
pub struct ErrorBody {
    pub detail: String,
}
