//! One-call analysis of a message: patterns, emotional state and topic.

use clarity_types::{AnalysisResponse, EmotionalState, Intervention, PatternMatch, TopicPrediction};

use crate::emotion::EmotionDetector;
use crate::error::Result;
use crate::interventions;
use crate::patterns::PatternDetector;
use crate::topics::TopicModel;

#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub patterns: Vec<PatternMatch>,
    pub emotional_state: EmotionalState,
    pub topic: TopicPrediction,
}

impl Analysis {
    pub fn interventions(&self) -> Vec<Intervention> {
        interventions::suggest(&self.patterns, &self.emotional_state)
    }

    pub fn into_response(self) -> AnalysisResponse {
        let interventions = self.interventions();
        AnalysisResponse {
            patterns: self.patterns,
            emotional_state: self.emotional_state,
            topic: self.topic,
            interventions,
        }
    }
}

pub struct Analyzer {
    patterns: PatternDetector,
    emotions: EmotionDetector,
}

impl Analyzer {
    pub fn new() -> Result<Self> {
        Ok(Self {
            patterns: PatternDetector::new()?,
            emotions: EmotionDetector::new()?,
        })
    }

    pub fn analyze(&self, text: &str, topics: &TopicModel) -> Analysis {
        Analysis {
            patterns: self.patterns.detect(text),
            emotional_state: self.emotions.detect(text),
            topic: topics.predict(text),
        }
    }
}
