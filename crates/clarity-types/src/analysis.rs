//! Outputs of the analysis pipeline: detected patterns, emotional state,
//! topic prediction and suggested interventions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema, strum::Display, strum::AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PatternCategory {
    CognitiveDistortions,
    DefenseMechanisms,
    EmotionalPatterns,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, ToSchema, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Severity {
    Low,
    Moderate,
    High,
}

impl Severity {
    /// Multiplier applied to rule-based confidence.
    pub fn confidence_weight(self) -> f64 {
        match self {
            Severity::Low => 0.7,
            Severity::Moderate => 0.8,
            Severity::High => 1.0,
        }
    }

    /// Score used to rank interventions.
    pub fn priority_score(self) -> f64 {
        match self {
            Severity::Low => 1.0,
            Severity::Moderate => 2.0,
            Severity::High => 3.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DetectionMethod {
    RuleBased,
    MlBased,
    /// Reported by both passes.
    RuleBasedMlBased,
}

/// A psychological pattern found in a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PatternMatch {
    /// `"{category}_{name}"`, e.g. `"cognitive_distortions_catastrophizing"`.
    pub pattern: String,
    pub category: PatternCategory,
    pub name: String,
    pub confidence: f64,
    pub description: String,
    pub therapeutic_approach: String,
    pub severity: Severity,
    #[serde(default)]
    pub keywords_matched: Vec<String>,
    #[serde(default)]
    pub phrases_matched: Vec<String>,
    pub detection_method: DetectionMethod,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Intensity {
    Mild,
    Moderate,
    Severe,
}

impl Intensity {
    pub fn weight(self) -> u32 {
        match self {
            Intensity::Mild => 1,
            Intensity::Moderate => 2,
            Intensity::Severe => 3,
        }
    }
}

/// Result of emotional-state detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct EmotionalState {
    /// One of the indicator emotions, or `positive`/`negative`/`neutral`
    /// when only sentiment was available.
    pub primary_emotion: String,
    pub intensity: Intensity,
    pub confidence: f64,
    pub sentiment_polarity: f64,
    pub sentiment_subjectivity: f64,
    /// Weighted score per emotion that had at least one hit.
    #[serde(default)]
    pub scores: BTreeMap<String, u32>,
}

impl EmotionalState {
    pub fn neutral() -> Self {
        Self {
            primary_emotion: "neutral".into(),
            intensity: Intensity::Mild,
            confidence: 0.0,
            sentiment_polarity: 0.0,
            sentiment_subjectivity: 0.0,
            scores: BTreeMap::new(),
        }
    }

    pub fn is_neutral(&self) -> bool {
        self.primary_emotion == "neutral"
    }
}

/// Result of topic classification. `topic_id == -1` means unknown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TopicPrediction {
    pub topic_id: i64,
    pub topic_name: String,
    pub confidence: f64,
}

impl TopicPrediction {
    pub fn unknown() -> Self {
        Self {
            topic_id: -1,
            topic_name: "unknown".into(),
            confidence: 0.0,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.topic_id < 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum InterventionKind {
    PatternBased,
    EmotionBased,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Intervention {
    #[serde(rename = "type")]
    pub kind: InterventionKind,
    pub target: String,
    pub approach: String,
    pub priority: u32,
    pub techniques: Vec<String>,
}

/// Body of `POST /api/v1/analyze`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AnalysisResponse {
    pub patterns: Vec<PatternMatch>,
    pub emotional_state: EmotionalState,
    pub topic: TopicPrediction,
    pub interventions: Vec<Intervention>,
}
