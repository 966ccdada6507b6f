//! Detection of cognitive distortions, defense mechanisms and emotional
//! patterns in a single message.
//!
//! Two passes run over every message and are merged per pattern:
//!
//! * a rule pass scoring keyword hits (+0.1) and phrase hits (+0.3), scaled by
//!   the pattern's severity;
//! * a similarity pass comparing the message against each pattern's keyword
//!   text in TF-IDF space.

use std::collections::HashMap;

use clarity_types::{DetectionMethod, PatternCategory, PatternMatch, Severity};
use regex::Regex;

use crate::error::Result;
use crate::round2;
use crate::tfidf::TfidfIndex;

const KEYWORD_SCORE: f64 = 0.1;
const PHRASE_SCORE: f64 = 0.3;
const RULE_THRESHOLD: f64 = 0.2;
const SIMILARITY_THRESHOLD: f64 = 0.3;

/// Static description of one pattern.
#[derive(Debug)]
pub struct PatternSpec {
    pub category: PatternCategory,
    pub name: &'static str,
    pub keywords: &'static [&'static str],
    pub phrases: &'static [&'static str],
    pub description: &'static str,
    pub therapeutic_approach: &'static str,
    pub severity: Severity,
}

impl PatternSpec {
    /// `"{category}_{name}"`.
    pub fn key(&self) -> String {
        format!("{}_{}", self.category, self.name)
    }
}

pub const CATALOG: &[PatternSpec] = &[
    PatternSpec {
        category: PatternCategory::CognitiveDistortions,
        name: "all_or_nothing",
        keywords: &["always", "never", "completely", "totally", "absolutely", "entirely"],
        phrases: &[r"always (?:happens|goes wrong)", r"never (?:works|gets better)"],
        description: "Black-and-white thinking without middle ground",
        therapeutic_approach: "Cognitive restructuring to find middle ground",
        severity: Severity::Moderate,
    },
    PatternSpec {
        category: PatternCategory::CognitiveDistortions,
        name: "catastrophizing",
        keywords: &["disaster", "terrible", "awful", "worst", "ruined", "doomed"],
        phrases: &[r"worst (?:thing|case|scenario)", r"complete disaster"],
        description: "Expecting the worst possible outcome",
        therapeutic_approach: "Reality testing and probability assessment",
        severity: Severity::High,
    },
    PatternSpec {
        category: PatternCategory::CognitiveDistortions,
        name: "mind_reading",
        keywords: &["they think", "everyone believes", "people assume", "obviously thinks"],
        phrases: &[r"they (?:think|believe) i'm", r"everyone (?:thinks|knows)"],
        description: "Assuming you know what others are thinking",
        therapeutic_approach: "Evidence-based thinking and communication skills",
        severity: Severity::Moderate,
    },
    PatternSpec {
        category: PatternCategory::CognitiveDistortions,
        name: "fortune_telling",
        keywords: &["will never", "going to fail", "won't work", "bound to"],
        phrases: &[r"will never (?:work|happen)", r"going to (?:fail|be terrible)"],
        description: "Predicting negative outcomes without evidence",
        therapeutic_approach: "Examining evidence and considering alternatives",
        severity: Severity::Moderate,
    },
    PatternSpec {
        category: PatternCategory::DefenseMechanisms,
        name: "denial",
        keywords: &["not true", "didn't happen", "not real", "imagining"],
        phrases: &[r"that's not (?:true|real)", r"didn't (?:happen|occur)"],
        description: "Refusing to accept reality or facts",
        therapeutic_approach: "Gentle reality testing and support",
        severity: Severity::High,
    },
    PatternSpec {
        category: PatternCategory::DefenseMechanisms,
        name: "projection",
        keywords: &["everyone else", "they all", "people always", "others do"],
        phrases: &[r"everyone (?:else|always)", r"they all (?:do|think)"],
        description: "Attributing own feelings to others",
        therapeutic_approach: "Self-awareness and ownership exercises",
        severity: Severity::Moderate,
    },
    PatternSpec {
        category: PatternCategory::DefenseMechanisms,
        name: "rationalization",
        keywords: &["good reason", "makes sense", "logical", "justified"],
        phrases: &[r"good reason (?:for|to)", r"makes (?:sense|perfect sense)"],
        description: "Creating logical explanations for emotional decisions",
        therapeutic_approach: "Exploring underlying emotions and motivations",
        severity: Severity::Low,
    },
    PatternSpec {
        category: PatternCategory::EmotionalPatterns,
        name: "rumination",
        keywords: &["keep thinking", "can't stop", "over and over", "replaying"],
        phrases: &[r"keep (?:thinking|going over)", r"can't stop (?:thinking|worrying)"],
        description: "Repetitive, unproductive thinking patterns",
        therapeutic_approach: "Mindfulness and thought interruption techniques",
        severity: Severity::Moderate,
    },
    PatternSpec {
        category: PatternCategory::EmotionalPatterns,
        name: "emotional_suppression",
        keywords: &["don't feel", "shouldn't feel", "push down", "ignore"],
        phrases: &[r"don't (?:want to|like to) feel", r"shouldn't (?:feel|be)"],
        description: "Avoiding or suppressing emotional experiences",
        therapeutic_approach: "Emotional acceptance and expression techniques",
        severity: Severity::Moderate,
    },
    PatternSpec {
        category: PatternCategory::EmotionalPatterns,
        name: "perfectionism",
        keywords: &["perfect", "flawless", "no mistakes", "exactly right"],
        phrases: &[r"(?:has to|must|should) be perfect", r"no (?:mistakes|errors)"],
        description: "Setting unrealistically high standards",
        therapeutic_approach: "Exploring 'good enough' and self-acceptance",
        severity: Severity::Moderate,
    },
];

/// Looks a pattern up by its short name (`"catastrophizing"`).
pub fn spec_by_name(name: &str) -> Option<&'static PatternSpec> {
    CATALOG.iter().find(|p| p.name == name)
}

struct CompiledPattern {
    spec: &'static PatternSpec,
    keywords: Vec<(&'static str, Regex)>,
    phrases: Vec<Regex>,
}

pub struct PatternDetector {
    patterns: Vec<CompiledPattern>,
    index: TfidfIndex,
}

impl PatternDetector {
    pub fn new() -> Result<Self> {
        let mut patterns = Vec::with_capacity(CATALOG.len());
        for spec in CATALOG {
            let keywords = spec
                .keywords
                .iter()
                .map(|k| Ok((*k, word_regex(k)?)))
                .collect::<Result<Vec<_>>>()?;
            let phrases = spec
                .phrases
                .iter()
                .map(|p| Regex::new(&format!("(?i){p}")))
                .collect::<std::result::Result<Vec<_>, _>>()?;
            patterns.push(CompiledPattern {
                spec,
                keywords,
                phrases,
            });
        }

        let keyword_texts: Vec<String> = CATALOG.iter().map(|p| p.keywords.join(" ")).collect();
        let index = TfidfIndex::fit(&keyword_texts);
        tracing::debug!(patterns = patterns.len(), "pattern detector ready");

        Ok(Self { patterns, index })
    }

    /// Runs both passes and returns the merged matches, highest confidence
    /// first.
    pub fn detect(&self, text: &str) -> Vec<PatternMatch> {
        let lower = text.to_lowercase();
        let mut merged: HashMap<String, PatternMatch> = HashMap::new();

        for found in self.rule_pass(&lower) {
            merged.insert(found.pattern.clone(), found);
        }
        for found in self.similarity_pass(&lower) {
            match merged.get_mut(&found.pattern) {
                Some(existing) => {
                    existing.detection_method = DetectionMethod::RuleBasedMlBased;
                    if found.confidence > existing.confidence {
                        existing.confidence = found.confidence;
                    }
                }
                None => {
                    merged.insert(found.pattern.clone(), found);
                }
            }
        }

        let mut out: Vec<PatternMatch> = merged.into_values().collect();
        out.sort_by(|a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then_with(|| a.pattern.cmp(&b.pattern))
        });
        out
    }

    fn rule_pass(&self, lower: &str) -> Vec<PatternMatch> {
        let mut out = Vec::new();
        for compiled in &self.patterns {
            let keywords_matched: Vec<String> = compiled
                .keywords
                .iter()
                .filter(|(_, re)| re.is_match(lower))
                .map(|(k, _)| k.to_string())
                .collect();
            let mut phrases_matched = Vec::new();
            let mut phrase_hits = 0usize;
            for re in &compiled.phrases {
                let before = phrases_matched.len();
                phrases_matched.extend(re.find_iter(lower).map(|m| m.as_str().to_string()));
                if phrases_matched.len() > before {
                    phrase_hits += 1;
                }
            }

            let raw = keywords_matched.len() as f64 * KEYWORD_SCORE + phrase_hits as f64 * PHRASE_SCORE;
            let confidence = (raw * compiled.spec.severity.confidence_weight()).min(1.0);
            // Slack for accumulated float error right at the threshold.
            if confidence + 1e-9 >= RULE_THRESHOLD {
                let mut found = to_match(compiled.spec, round2(confidence), DetectionMethod::RuleBased);
                found.keywords_matched = keywords_matched;
                found.phrases_matched = phrases_matched;
                out.push(found);
            }
        }
        out
    }

    fn similarity_pass(&self, lower: &str) -> Vec<PatternMatch> {
        self.index
            .similarities(lower)
            .into_iter()
            .zip(CATALOG)
            .filter(|(sim, _)| *sim > SIMILARITY_THRESHOLD)
            .map(|(sim, spec)| to_match(spec, round2(sim), DetectionMethod::MlBased))
            .collect()
    }
}

fn word_regex(phrase: &str) -> Result<Regex> {
    Ok(Regex::new(&format!(r"(?i)\b{}\b", regex::escape(phrase)))?)
}

fn to_match(spec: &PatternSpec, confidence: f64, method: DetectionMethod) -> PatternMatch {
    PatternMatch {
        pattern: spec.key(),
        category: spec.category,
        name: spec.name.to_string(),
        confidence,
        description: spec.description.to_string(),
        therapeutic_approach: spec.therapeutic_approach.to_string(),
        severity: spec.severity,
        keywords_matched: Vec::new(),
        phrases_matched: Vec::new(),
        detection_method: method,
    }
}
