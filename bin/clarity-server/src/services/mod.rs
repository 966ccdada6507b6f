pub mod auth;
pub mod therapy;

pub use auth::{AuthClient, AuthError, AuthUser};
pub use therapy::{ImportReport, PipelineSettings, TherapyService, TrainReport};
