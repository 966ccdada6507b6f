//! Emotional-state detection from indicator words, falling back to lexicon
//! sentiment when no indicator is present.

use std::collections::BTreeMap;

use clarity_types::{EmotionalState, Intensity};
use regex::Regex;

use crate::error::Result;
use crate::round2;
use crate::sentiment;

const SENTIMENT_CUTOFF: f64 = 0.3;
const STRONG_SENTIMENT: f64 = 0.6;

/// Indicator words per emotion and intensity level.
pub const INDICATORS: &[(&str, [(Intensity, &[&str]); 3])] = &[
    (
        "anxiety",
        [
            (Intensity::Mild, &["worried", "concerned", "nervous", "uneasy"]),
            (Intensity::Moderate, &["anxious", "stressed", "overwhelmed", "tense"]),
            (Intensity::Severe, &["panic", "terrified", "paralyzed", "desperate"]),
        ],
    ),
    (
        "depression",
        [
            (Intensity::Mild, &["sad", "down", "blue", "disappointed"]),
            (Intensity::Moderate, &["depressed", "hopeless", "empty", "numb"]),
            (Intensity::Severe, &["suicidal", "worthless", "devastated", "destroyed"]),
        ],
    ),
    (
        "anger",
        [
            (Intensity::Mild, &["annoyed", "frustrated", "irritated", "bothered"]),
            (Intensity::Moderate, &["angry", "mad", "furious", "outraged"]),
            (Intensity::Severe, &["rage", "livid", "explosive", "violent"]),
        ],
    ),
    (
        "fear",
        [
            (Intensity::Mild, &["uncertain", "cautious", "hesitant", "wary"]),
            (Intensity::Moderate, &["afraid", "scared", "frightened", "alarmed"]),
            (Intensity::Severe, &["terrified", "petrified", "horrified", "traumatized"]),
        ],
    ),
];

struct Level {
    intensity: Intensity,
    words: Vec<Regex>,
}

pub struct EmotionDetector {
    emotions: Vec<(&'static str, Vec<Level>)>,
}

impl EmotionDetector {
    pub fn new() -> Result<Self> {
        let mut emotions = Vec::with_capacity(INDICATORS.len());
        for (emotion, levels) in INDICATORS {
            let mut compiled = Vec::with_capacity(levels.len());
            for (intensity, words) in levels {
                let words = words
                    .iter()
                    .map(|w| Regex::new(&format!(r"(?i)\b{}\b", regex::escape(w))))
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                compiled.push(Level {
                    intensity: *intensity,
                    words,
                });
            }
            emotions.push((*emotion, compiled));
        }
        Ok(Self { emotions })
    }

    pub fn detect(&self, text: &str) -> EmotionalState {
        let sentiment = sentiment::analyze(text);
        let polarity = round2(sentiment.polarity);
        let subjectivity = round2(sentiment.subjectivity);

        let mut scores = BTreeMap::new();
        // (emotion, score, strongest intensity hit); first in catalog order wins ties.
        let mut best: Option<(&str, u32, Intensity)> = None;
        for (emotion, levels) in &self.emotions {
            let mut score = 0;
            let mut strongest = None;
            for level in levels {
                let hits = level.words.iter().filter(|re| re.is_match(text)).count() as u32;
                if hits > 0 {
                    score += hits * level.intensity.weight();
                    strongest = strongest.max(Some(level.intensity));
                }
            }
            if let Some(intensity) = strongest {
                scores.insert(emotion.to_string(), score);
                if best.is_none_or(|(_, s, _)| score > s) {
                    best = Some((emotion, score, intensity));
                }
            }
        }

        if let Some((emotion, score, intensity)) = best {
            return EmotionalState {
                primary_emotion: emotion.to_string(),
                intensity,
                confidence: (f64::from(score) / 10.0).min(1.0),
                sentiment_polarity: polarity,
                sentiment_subjectivity: subjectivity,
                scores,
            };
        }

        let raw = sentiment.polarity;
        let (primary, confidence) = if raw < -SENTIMENT_CUTOFF {
            ("negative", raw.abs())
        } else if raw > SENTIMENT_CUTOFF {
            ("positive", raw)
        } else {
            ("neutral", 0.5)
        };
        let intensity = if primary != "neutral" && raw.abs() > STRONG_SENTIMENT {
            Intensity::Moderate
        } else {
            Intensity::Mild
        };
        EmotionalState {
            primary_emotion: primary.to_string(),
            intensity,
            confidence: round2(confidence),
            sentiment_polarity: polarity,
            sentiment_subjectivity: subjectivity,
            scores,
        }
    }
}
