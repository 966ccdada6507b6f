//! Retrieval-augmented response generation.
//!
//! Builds the therapeutic prompt from the analysis of the current message,
//! retrieved reference responses and recent history, asks the LLM, then
//! shapes the reply into a [`ChatResponse`]. Any LLM failure produces the
//! fixed fallback reply instead of an error.

use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use clarity_types::{ChatResponse, EmotionalState, PatternMatch, PsychologicalInsight, Sender, TopicPrediction};

use crate::interventions::techniques_for;
use crate::llm::{LlmClient, SYSTEM_PROMPT};
use crate::text::truncate_chars;
use crate::vector_store::SearchHit;

pub const FALLBACK_RESPONSE: &str = "I hear you, and I want you to know that your feelings are valid. \
Sometimes it helps to take a moment to breathe and acknowledge what you're experiencing. \
Would you like to share more about what's on your mind right now?";
pub const FALLBACK_CONFIDENCE: f64 = 0.3;
pub const FALLBACK_SUMMARY: &str = "Session completed. Continue exploring your thoughts and feelings.";

const REFERENCE_CHARS: usize = 200;
const HISTORY_CHARS: usize = 100;
const HISTORY_TURNS: usize = 3;
const MAX_SUGGESTIONS: usize = 3;
const SUGGESTION_CUES: &[&str] = &[
    "try",
    "consider",
    "might help",
    "could",
    "perhaps",
    "suggestion",
    "recommend",
    "practice",
    "exercise",
];

const BASE_INSTRUCTIONS: &str = "You are Clarity, an AI-powered therapy assistant. Your role is to provide empathetic, psychologically-informed support while maintaining professional boundaries.

Core Principles:
- Be warm, empathetic, and non-judgmental
- Use evidence-based therapeutic approaches
- Maintain appropriate boundaries (you are not a replacement for professional therapy)
- Focus on the user's emotional well-being and personal growth
- Provide practical, actionable insights when appropriate

Response Structure:
1. Acknowledge the user's feelings and experience
2. Provide gentle insight or reflection
3. Offer 1-2 practical suggestions or coping strategies
4. End with an open-ended question to encourage further exploration";

const CLOSING_INSTRUCTIONS: &str = "Please provide a therapeutic response that:
- Acknowledges their feelings
- Offers gentle insight or reflection
- Provides practical suggestions
- Maintains a warm, supportive tone
- Asks a thoughtful follow-up question

Response:";

/// A prior message of the session, oldest first.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryTurn {
    pub sender: Sender,
    pub content: String,
}

/// Everything known about the message being answered.
#[derive(Debug, Clone, Default)]
pub struct GenerationContext {
    pub session_id: String,
    pub emotional_state: Option<EmotionalState>,
    pub topic: Option<TopicPrediction>,
    pub patterns: Vec<PatternMatch>,
    pub retrieved: Vec<SearchHit>,
    pub history: Vec<HistoryTurn>,
}

impl GenerationContext {
    /// Emotion label worth reporting; `None` for neutral.
    pub fn emotion_label(&self) -> Option<&str> {
        self.emotional_state
            .as_ref()
            .filter(|e| !e.is_neutral())
            .map(|e| e.primary_emotion.as_str())
    }

    /// Topic label worth reporting; `None` for unknown.
    pub fn topic_label(&self) -> Option<&str> {
        self.topic
            .as_ref()
            .filter(|t| !t.is_unknown())
            .map(|t| t.topic_name.as_str())
    }

    /// 0.5 base, +0.1 emotion, +0.1 topic, +0.2 patterns, +0.1 history.
    pub fn confidence_score(&self) -> f64 {
        let mut score = 0.5;
        if self.emotion_label().is_some() {
            score += 0.1;
        }
        if self.topic_label().is_some() {
            score += 0.1;
        }
        if !self.patterns.is_empty() {
            score += 0.2;
        }
        if !self.history.is_empty() {
            score += 0.1;
        }
        crate::round2(f64::min(score, 1.0))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationSettings {
    /// Character budget for the whole prompt.
    pub max_context_length: usize,
    /// Retrieved responses quoted in the prompt.
    pub top_k_responses: usize,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            max_context_length: 4000,
            top_k_responses: 3,
        }
    }
}

pub struct ResponseGenerator {
    llm: Arc<dyn LlmClient>,
    settings: GenerationSettings,
}

impl ResponseGenerator {
    pub fn new(llm: Arc<dyn LlmClient>, settings: GenerationSettings) -> Self {
        Self { llm, settings }
    }

    pub fn llm(&self) -> &dyn LlmClient {
        self.llm.as_ref()
    }

    pub fn build_prompt(&self, message: &str, ctx: &GenerationContext) -> String {
        let mut analysis = String::new();
        if let Some(emotion) = ctx.emotion_label() {
            analysis.push_str(&format!("\nDetected emotional state: {emotion}"));
        }
        if let Some(topic) = ctx.topic_label() {
            analysis.push_str(&format!("\nTopic: {topic}"));
        }
        if !ctx.patterns.is_empty() {
            let names: Vec<&str> = ctx.patterns.iter().map(|p| p.pattern.as_str()).collect();
            analysis.push_str(&format!("\nDetected patterns: {}", names.join(", ")));
        }

        let mut references = String::new();
        if !ctx.retrieved.is_empty() && self.settings.top_k_responses > 0 {
            references.push_str("\n\nSimilar therapeutic responses for reference:\n");
            for (i, hit) in ctx.retrieved.iter().take(self.settings.top_k_responses).enumerate() {
                references.push_str(&format!("{}. {}...\n", i + 1, truncate_chars(&hit.content, REFERENCE_CHARS)));
            }
        }

        let mut recent = String::new();
        if !ctx.history.is_empty() {
            recent.push_str("\n\nRecent conversation context:\n");
            let skip = ctx.history.len().saturating_sub(HISTORY_TURNS);
            for turn in &ctx.history[skip..] {
                recent.push_str(&format!("{}: {}...\n", turn.sender, truncate_chars(&turn.content, HISTORY_CHARS)));
            }
        }

        let head = format!("{BASE_INSTRUCTIONS}\n\n{analysis}\n\n");
        let tail = format!("\n\nUser's current message: \"{message}\"\n\n{CLOSING_INSTRUCTIONS}");
        let head_len = head.chars().count();
        let tail_len = tail.chars().count();

        // Reference and history material is dropped first when over budget.
        let budget = self.settings.max_context_length.saturating_sub(head_len + tail_len);
        let mut middle = format!("{references}\n\n{recent}");
        if middle.chars().count() > budget {
            middle = truncate_chars(&middle, budget).to_string();
        }
        let prompt = format!("{head}{middle}{tail}");
        if prompt.chars().count() > self.settings.max_context_length {
            return truncate_chars(&prompt, self.settings.max_context_length).to_string();
        }
        prompt
    }

    /// Produces the reply for `message`; never fails.
    pub async fn generate(&self, message: &str, ctx: &GenerationContext) -> ChatResponse {
        let prompt = self.build_prompt(message, ctx);
        match self.llm.complete(SYSTEM_PROMPT, &prompt).await {
            Ok(content) => ChatResponse {
                suggestions: extract_suggestions(&content),
                content,
                session_id: ctx.session_id.clone(),
                timestamp: now_rfc3339(),
                confidence_score: ctx.confidence_score(),
                psychological_insight: insight(&ctx.patterns),
                emotional_state: ctx.emotion_label().map(str::to_string),
                topic_classification: ctx.topic_label().map(str::to_string),
            },
            Err(e) => {
                tracing::warn!(session_id = %ctx.session_id, error = %e, "llm unavailable, using fallback reply");
                fallback_response(ctx)
            }
        }
    }

    /// Short summary of a finished session, or the fixed fallback text.
    pub async fn session_summary(&self, turns: &[HistoryTurn]) -> String {
        if turns.is_empty() {
            return FALLBACK_SUMMARY.to_string();
        }
        let mut conversation = String::new();
        for turn in turns {
            let who = match turn.sender {
                Sender::User => "User",
                Sender::Ai => "Clarity",
            };
            conversation.push_str(&format!("{who}: {}\n", turn.content));
        }
        let prompt = format!(
            "Please provide a brief, therapeutic summary of this conversation session:

{conversation}
Summary should include:
- Key themes discussed
- Emotional patterns observed
- Progress or insights gained
- Areas for continued focus

Keep it professional and supportive, around 100-150 words."
        );
        let prompt = truncate_chars(&prompt, self.settings.max_context_length.max(1000));
        match self.llm.complete(SYSTEM_PROMPT, prompt).await {
            Ok(summary) => summary,
            Err(e) => {
                tracing::warn!(error = %e, "session summary failed, using fallback");
                FALLBACK_SUMMARY.to_string()
            }
        }
    }
}

/// Fallback reply. Analysis labels are kept, there is no insight and no
/// suggestions.
pub fn fallback_response(ctx: &GenerationContext) -> ChatResponse {
    ChatResponse {
        content: FALLBACK_RESPONSE.to_string(),
        session_id: ctx.session_id.clone(),
        timestamp: now_rfc3339(),
        confidence_score: FALLBACK_CONFIDENCE,
        psychological_insight: None,
        emotional_state: ctx.emotion_label().map(str::to_string),
        topic_classification: ctx.topic_label().map(str::to_string),
        suggestions: Vec::new(),
    }
}

/// Insight built from the highest-confidence pattern.
pub fn insight(patterns: &[PatternMatch]) -> Option<PsychologicalInsight> {
    let top = patterns.iter().max_by(|a, b| a.confidence.total_cmp(&b.confidence))?;
    let suggested_response = techniques_for(&top.name)
        .and_then(|t| t.first())
        .map(|s| s.to_string())
        .unwrap_or_else(|| top.therapeutic_approach.clone());
    Some(PsychologicalInsight {
        pattern_detected: top.name.clone(),
        confidence: top.confidence,
        therapeutic_approach: top.therapeutic_approach.clone(),
        suggested_response,
    })
}

/// Sentences that read as suggestions, 20 to 150 characters, at most three.
pub fn extract_suggestions(text: &str) -> Vec<String> {
    text.split(['.', '!', '?', '\n'])
        .map(str::trim)
        .filter(|s| {
            let len = s.chars().count();
            len > 20 && len < 150
        })
        .filter(|s| {
            let lower = s.to_lowercase();
            SUGGESTION_CUES.iter().any(|cue| contains_word(&lower, cue))
        })
        .take(MAX_SUGGESTIONS)
        .map(|s| format!("{s}."))
        .collect()
}

fn contains_word(haystack: &str, needle: &str) -> bool {
    haystack.match_indices(needle).any(|(i, _)| {
        let before = haystack[..i].chars().next_back();
        let after = haystack[i + needle.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[cfg(test)]
mod test {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use clarity_types::{DetectionMethod, Intensity, PatternCategory, Severity};

    use super::*;
    use crate::error::{CoreError, Result};

    struct ScriptedLlm {
        reply: Option<String>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedLlm {
        fn new(reply: Option<&str>) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.map(str::to_string),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        fn model(&self) -> &str {
            "scripted"
        }

        fn is_configured(&self) -> bool {
            self.reply.is_some()
        }

        async fn complete(&self, _system: &str, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.reply.clone().ok_or(CoreError::NotConfigured("llm"))
        }
    }

    fn pattern(name: &str, confidence: f64) -> PatternMatch {
        PatternMatch {
            pattern: format!("cognitive_distortions_{name}"),
            category: PatternCategory::CognitiveDistortions,
            name: name.into(),
            confidence,
            description: String::new(),
            therapeutic_approach: "Reality testing and probability assessment".into(),
            severity: Severity::High,
            keywords_matched: vec![],
            phrases_matched: vec![],
            detection_method: DetectionMethod::RuleBased,
        }
    }

    fn rich_context() -> GenerationContext {
        GenerationContext {
            session_id: "s-1".into(),
            emotional_state: Some(EmotionalState {
                primary_emotion: "anxiety".into(),
                intensity: Intensity::Moderate,
                ..EmotionalState::neutral()
            }),
            topic: Some(TopicPrediction {
                topic_id: 4,
                topic_name: "work_stress".into(),
                confidence: 0.8,
            }),
            patterns: vec![pattern("mind_reading", 0.24), pattern("catastrophizing", 0.8)],
            retrieved: vec![SearchHit {
                content: "x".repeat(300),
                similarity: 0.9,
                metadata: Default::default(),
            }],
            history: (0..5)
                .map(|i| HistoryTurn {
                    sender: if i % 2 == 0 { Sender::User } else { Sender::Ai },
                    content: format!("turn {i}"),
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn generate_shapes_llm_reply() {
        let llm = ScriptedLlm::new(Some(
            "That sounds stressful. You could try writing down the evidence for each worry. How does that sound?",
        ));
        let generator = ResponseGenerator::new(llm.clone(), GenerationSettings::default());
        let resp = generator.generate("Everything will go wrong at work", &rich_context()).await;

        assert_eq!(resp.session_id, "s-1");
        assert_eq!(resp.confidence_score, 1.0);
        assert_eq!(resp.emotional_state.as_deref(), Some("anxiety"));
        assert_eq!(resp.topic_classification.as_deref(), Some("work_stress"));
        assert_eq!(
            resp.suggestions,
            vec!["You could try writing down the evidence for each worry.".to_string()]
        );
        let insight = resp.psychological_insight.unwrap();
        assert_eq!(insight.pattern_detected, "catastrophizing");
        assert_eq!(insight.suggested_response, "Examine evidence for and against worst-case scenarios");
        assert_eq!(llm.prompts.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn llm_failure_falls_back() {
        let generator = ResponseGenerator::new(ScriptedLlm::new(None), GenerationSettings::default());
        let resp = generator.generate("hello", &rich_context()).await;
        assert_eq!(resp.content, FALLBACK_RESPONSE);
        assert_eq!(resp.confidence_score, FALLBACK_CONFIDENCE);
        assert!(resp.psychological_insight.is_none());
        assert_eq!(resp.topic_classification.as_deref(), Some("work_stress"));
    }

    #[test]
    fn prompt_carries_context_and_limits() {
        let generator = ResponseGenerator::new(ScriptedLlm::new(None), GenerationSettings::default());
        let prompt = generator.build_prompt("I can't cope", &rich_context());
        assert!(prompt.starts_with("You are Clarity"));
        assert!(prompt.contains("Detected emotional state: anxiety"));
        assert!(prompt.contains("Topic: work_stress"));
        assert!(prompt.contains("cognitive_distortions_catastrophizing"));
        assert!(prompt.contains(&format!("1. {}...", "x".repeat(200))));
        assert!(!prompt.contains(&"x".repeat(201)));
        // only the last three turns
        assert!(!prompt.contains("turn 1"));
        assert!(prompt.contains("user: turn 4"));
        assert!(prompt.contains("User's current message: \"I can't cope\""));
        assert!(prompt.ends_with("Response:"));
    }

    #[test]
    fn prompt_respects_character_budget() {
        let settings = GenerationSettings {
            max_context_length: 1200,
            top_k_responses: 3,
        };
        let generator = ResponseGenerator::new(ScriptedLlm::new(None), settings);
        let prompt = generator.build_prompt("short", &rich_context());
        assert!(prompt.chars().count() <= 1200);
        assert!(prompt.contains("User's current message"));
    }

    #[test]
    fn confidence_without_context_is_base() {
        let ctx = GenerationContext {
            emotional_state: Some(EmotionalState::neutral()),
            topic: Some(TopicPrediction::unknown()),
            ..Default::default()
        };
        assert_eq!(ctx.confidence_score(), 0.5);
        assert!(ctx.emotion_label().is_none());
    }

    #[test]
    fn suggestions_need_cue_words_and_length() {
        let text = "Try it. Perhaps you could take a short walk after lunch. \
                    I wonder how that felt for you overall. Consider journaling each evening before bed. \
                    It might help to name the feeling out loud. A practice of gratitude can be grounding.";
        let s = extract_suggestions(text);
        assert_eq!(s.len(), 3);
        assert_eq!(s[0], "Perhaps you could take a short walk after lunch.");
        assert!(s.iter().all(|x| !x.starts_with("I wonder")));
    }

    #[test]
    fn cue_words_do_not_match_inside_other_words() {
        assert!(extract_suggestions("The country was beautiful in the spring sunshine").is_empty());
    }

    #[tokio::test]
    async fn summary_falls_back_when_llm_fails() {
        let generator = ResponseGenerator::new(ScriptedLlm::new(None), GenerationSettings::default());
        let turns = vec![HistoryTurn {
            sender: Sender::User,
            content: "hi".into(),
        }];
        assert_eq!(generator.session_summary(&turns).await, FALLBACK_SUMMARY);
        assert_eq!(generator.session_summary(&[]).await, FALLBACK_SUMMARY);
    }
}
