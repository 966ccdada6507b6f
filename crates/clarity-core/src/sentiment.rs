//! Lexicon-based sentiment scoring.
//!
//! Each known word carries a polarity in [-1, 1] and a subjectivity in
//! [0, 1]. A preceding negator flips and damps the polarity, a preceding
//! intensifier amplifies it. The message score is the mean over the words
//! that were found.

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Sentiment {
    pub polarity: f64,
    pub subjectivity: f64,
}

// (word, polarity, subjectivity), sorted by word.
const LEXICON: &[(&str, f64, f64)] = &[
    ("afraid", -0.6, 0.9),
    ("alone", -0.4, 0.6),
    ("amazing", 0.6, 0.9),
    ("angry", -0.5, 1.0),
    ("annoyed", -0.4, 0.7),
    ("anxious", -0.4, 0.8),
    ("ashamed", -0.6, 0.9),
    ("awful", -1.0, 1.0),
    ("bad", -0.7, 0.67),
    ("beautiful", 0.85, 1.0),
    ("best", 1.0, 0.3),
    ("better", 0.5, 0.5),
    ("broken", -0.4, 0.5),
    ("calm", 0.3, 0.75),
    ("confident", 0.5, 0.7),
    ("depressed", -0.7, 0.8),
    ("disappointed", -0.75, 0.75),
    ("excellent", 1.0, 1.0),
    ("excited", 0.4, 0.75),
    ("fine", 0.4, 0.5),
    ("glad", 0.5, 1.0),
    ("good", 0.7, 0.6),
    ("grateful", 0.6, 0.8),
    ("great", 0.8, 0.75),
    ("happy", 0.8, 1.0),
    ("hate", -0.8, 0.9),
    ("helpless", -0.6, 0.8),
    ("hopeful", 0.5, 0.8),
    ("hopeless", -0.8, 0.9),
    ("horrible", -1.0, 1.0),
    ("hurt", -0.5, 0.7),
    ("lonely", -0.5, 0.8),
    ("love", 0.5, 0.6),
    ("lovely", 0.5, 0.75),
    ("miserable", -1.0, 1.0),
    ("nervous", -0.3, 0.7),
    ("nice", 0.6, 1.0),
    ("okay", 0.5, 0.5),
    ("pain", -0.5, 0.6),
    ("peaceful", 0.5, 0.7),
    ("proud", 0.8, 1.0),
    ("relaxed", 0.4, 0.7),
    ("relieved", 0.5, 0.7),
    ("sad", -0.5, 1.0),
    ("scared", -0.5, 0.9),
    ("stressed", -0.5, 0.8),
    ("stupid", -0.8, 1.0),
    ("terrible", -1.0, 1.0),
    ("tired", -0.4, 0.7),
    ("unhappy", -0.6, 0.9),
    ("upset", -0.5, 0.8),
    ("useless", -0.5, 0.6),
    ("wonderful", 1.0, 1.0),
    ("worried", -0.4, 0.8),
    ("worse", -0.4, 0.6),
    ("worst", -1.0, 1.0),
    ("worthless", -0.8, 0.9),
];

const NEGATORS: &[&str] = &["never", "no", "not", "nothing", "t"];
const INTENSIFIERS: &[&str] = &["extremely", "incredibly", "really", "so", "super", "too", "very"];
const NEGATION_FACTOR: f64 = -0.5;
const INTENSIFIER_FACTOR: f64 = 1.3;

fn lookup(word: &str) -> Option<(f64, f64)> {
    LEXICON
        .binary_search_by(|(w, _, _)| w.cmp(&word))
        .ok()
        .map(|i| (LEXICON[i].1, LEXICON[i].2))
}

/// Scores `text`. Neutral (0, 0) when no lexicon word occurs.
pub fn analyze(text: &str) -> Sentiment {
    // Keep one-letter tokens so "don't" leaves a trailing "t" negator.
    let tokens: Vec<String> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect();

    let mut polarity = 0.0;
    let mut subjectivity = 0.0;
    let mut hits = 0usize;
    for (i, token) in tokens.iter().enumerate() {
        let Some((mut p, s)) = lookup(token) else {
            continue;
        };
        let prev = i.checked_sub(1).map(|j| tokens[j].as_str());
        let prev2 = i.checked_sub(2).map(|j| tokens[j].as_str());
        if prev.is_some_and(|w| INTENSIFIERS.contains(&w)) {
            p *= INTENSIFIER_FACTOR;
        }
        if prev.is_some_and(|w| NEGATORS.contains(&w)) || prev2.is_some_and(|w| NEGATORS.contains(&w)) {
            p *= NEGATION_FACTOR;
        }
        polarity += p.clamp(-1.0, 1.0);
        subjectivity += s;
        hits += 1;
    }

    if hits == 0 {
        return Sentiment::default();
    }
    Sentiment {
        polarity: (polarity / hits as f64).clamp(-1.0, 1.0),
        subjectivity: (subjectivity / hits as f64).clamp(0.0, 1.0),
    }
}
