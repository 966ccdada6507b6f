//! clarity-core: the analysis, retrieval and generation pipeline behind the
//! Clarity chat service.
//!
//! Pattern detection, emotional-state scoring and topic classification are
//! deterministic and in-process. The only network calls are the OpenAI chat
//! and embedding endpoints, each behind a trait ([`llm::LlmClient`],
//! [`embedding::Embedder`]).

pub mod analysis;
pub mod dataset;
pub mod embedding;
pub mod emotion;
pub mod error;
pub mod generation;
pub mod interventions;
pub mod llm;
pub mod openai;
pub mod patterns;
pub mod sentiment;
pub mod text;
pub mod tfidf;
pub mod topics;
pub mod vector_store;

pub use analysis::{Analysis, Analyzer};
pub use error::{CoreError, Result};

/// Rounds to two decimals, the precision every reported score uses.
pub(crate) fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
