//! Keyword topic model.
//!
//! Topics start from a seed catalog. Prediction counts the distinct topic
//! keywords (unigrams or bigrams) present in a message; the confidence is the
//! winning topic's share of all hits. Fitting on a corpus assigns every
//! document to its best topic and replaces each topic's keywords with its ten
//! most distinctive terms under class-based TF-IDF.

use std::collections::{HashMap, HashSet};

use clarity_types::{TopicInfo, TopicPrediction};
use serde::{Deserialize, Serialize};

use crate::round2;
use crate::text::ngrams;

pub const KEYWORDS_PER_TOPIC: usize = 10;
pub const REPRESENTATIVE_DOCS: usize = 3;

struct Seed {
    name: &'static str,
    description: &'static str,
    keywords: &'static [&'static str],
}

const SEEDS: &[Seed] = &[
    Seed {
        name: "anxiety",
        description: "Worry, nervousness, panic and stress responses",
        keywords: &["anxiety", "anxious", "worry", "worried", "panic", "nervous", "stress", "fear", "overthinking", "panic attack"],
    },
    Seed {
        name: "depression",
        description: "Low mood, hopelessness and loss of interest",
        keywords: &["depression", "depressed", "sad", "hopeless", "empty", "numb", "crying", "lonely", "unmotivated", "worthless"],
    },
    Seed {
        name: "relationships",
        description: "Romantic partners, friendships and breakups",
        keywords: &["relationship", "partner", "boyfriend", "girlfriend", "husband", "wife", "marriage", "breakup", "dating", "friend"],
    },
    Seed {
        name: "self_esteem",
        description: "Self-worth, confidence and self-image",
        keywords: &["confidence", "self esteem", "insecure", "ugly", "failure", "inadequate", "self worth", "compare", "shame", "embarrassed"],
    },
    Seed {
        name: "work_stress",
        description: "Jobs, careers, deadlines and workplace conflict",
        keywords: &["work", "job", "boss", "career", "deadline", "coworker", "office", "fired", "burnout", "workload"],
    },
    Seed {
        name: "family_issues",
        description: "Parents, children, siblings and family conflict",
        keywords: &["family", "parents", "mother", "father", "mom", "dad", "sibling", "brother", "sister", "children"],
    },
    Seed {
        name: "sleep_issues",
        description: "Insomnia, fatigue and disrupted rest",
        keywords: &["sleep", "insomnia", "tired", "exhausted", "nightmares", "awake", "rest", "fatigue", "bed", "night"],
    },
    Seed {
        name: "anger_management",
        description: "Anger, irritability and outbursts",
        keywords: &["angry", "anger", "mad", "furious", "rage", "frustrated", "irritated", "yelling", "temper", "annoyed"],
    },
    Seed {
        name: "general",
        description: "General wellbeing and support",
        keywords: &["life", "help", "feel", "feeling", "talk", "advice", "support", "confused", "change", "future"],
    },
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topic {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub keywords: Vec<String>,
    pub representative_docs: Vec<String>,
    pub document_count: i64,
}

impl Topic {
    pub fn info(&self) -> TopicInfo {
        TopicInfo {
            topic_id: self.id,
            topic_name: self.name.clone(),
            description: self.description.clone(),
            keywords: self.keywords.clone(),
            document_count: self.document_count,
        }
    }
}

/// Output of [`TopicModel::fit`].
#[derive(Debug, Clone)]
pub struct TopicFit {
    pub model: TopicModel,
    /// Topic id per input document, `-1` for documents that matched nothing.
    pub assignments: Vec<i64>,
}

#[derive(Debug, Clone)]
pub struct TopicModel {
    topics: Vec<Topic>,
}

impl Default for TopicModel {
    fn default() -> Self {
        Self::seeded()
    }
}

impl TopicModel {
    pub fn seeded() -> Self {
        let topics = SEEDS
            .iter()
            .enumerate()
            .map(|(id, seed)| Topic {
                id: id as i64,
                name: seed.name.to_string(),
                description: seed.description.to_string(),
                keywords: seed.keywords.iter().map(|k| k.to_string()).collect(),
                representative_docs: Vec::new(),
                document_count: 0,
            })
            .collect();
        Self { topics }
    }

    /// Restores a model from persisted topics. An empty list yields the seeds.
    pub fn from_topics(mut topics: Vec<Topic>) -> Self {
        if topics.is_empty() {
            return Self::seeded();
        }
        topics.sort_by_key(|t| t.id);
        Self { topics }
    }

    pub fn topics(&self) -> &[Topic] {
        &self.topics
    }

    pub fn info(&self) -> Vec<TopicInfo> {
        self.topics.iter().map(Topic::info).collect()
    }

    pub fn predict(&self, text: &str) -> TopicPrediction {
        let grams: HashSet<String> = ngrams(text).into_iter().collect();
        self.predict_grams(&grams)
            .map(|(idx, confidence)| TopicPrediction {
                topic_id: self.topics[idx].id,
                topic_name: self.topics[idx].name.clone(),
                confidence,
            })
            .unwrap_or_else(TopicPrediction::unknown)
    }

    /// Index of the best topic and its confidence, `None` without any hit.
    fn predict_grams(&self, grams: &HashSet<String>) -> Option<(usize, f64)> {
        let hits: Vec<usize> = self
            .topics
            .iter()
            .map(|t| t.keywords.iter().filter(|k| grams.contains(k.as_str())).count())
            .collect();
        let total: usize = hits.iter().sum();
        if total == 0 {
            return None;
        }
        // first maximum wins so ties resolve to the lower id
        let (idx, best) = hits
            .iter()
            .enumerate()
            .fold((0, 0), |acc, (i, &h)| if h > acc.1 { (i, h) } else { acc });
        Some((idx, round2(best as f64 / total as f64)))
    }

    /// Assigns `documents` to topics and derives new keywords from them.
    pub fn fit<S: AsRef<str>>(&self, documents: &[S]) -> TopicFit {
        let doc_grams: Vec<Vec<String>> = documents.iter().map(|d| ngrams(d.as_ref())).collect();

        let mut assignments = Vec::with_capacity(documents.len());
        let mut members: Vec<Vec<(usize, f64)>> = vec![Vec::new(); self.topics.len()];
        for (doc, grams) in doc_grams.iter().enumerate() {
            let set: HashSet<String> = grams.iter().cloned().collect();
            match self.predict_grams(&set) {
                Some((idx, conf)) => {
                    assignments.push(self.topics[idx].id);
                    members[idx].push((doc, conf));
                }
                None => assignments.push(-1),
            }
        }

        // Terms must occur in two documents once there is more than one.
        let min_df = if documents.len() > 1 { 2 } else { 1 };
        let mut df: HashMap<&str, usize> = HashMap::new();
        for grams in &doc_grams {
            let unique: HashSet<&str> = grams.iter().map(String::as_str).collect();
            for g in unique {
                *df.entry(g).or_default() += 1;
            }
        }

        // class term frequencies
        let class_tf: Vec<HashMap<&str, f64>> = members
            .iter()
            .map(|docs| {
                let mut tf: HashMap<&str, f64> = HashMap::new();
                for (doc, _) in docs {
                    for g in &doc_grams[*doc] {
                        if df.get(g.as_str()).copied().unwrap_or(0) >= min_df {
                            *tf.entry(g.as_str()).or_default() += 1.0;
                        }
                    }
                }
                tf
            })
            .collect();

        let populated: Vec<&HashMap<&str, f64>> = class_tf.iter().filter(|tf| !tf.is_empty()).collect();
        let avg_words = if populated.is_empty() {
            0.0
        } else {
            populated.iter().map(|tf| tf.values().sum::<f64>()).sum::<f64>() / populated.len() as f64
        };
        let mut term_freq: HashMap<&str, f64> = HashMap::new();
        for tf in &class_tf {
            for (term, count) in tf {
                *term_freq.entry(*term).or_default() += count;
            }
        }

        let topics = self
            .topics
            .iter()
            .zip(class_tf.iter().zip(&members))
            .map(|(topic, (tf, docs))| {
                let mut fitted = topic.clone();
                fitted.document_count = docs.len() as i64;

                let mut ranked = docs.clone();
                ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
                fitted.representative_docs = ranked
                    .into_iter()
                    .take(REPRESENTATIVE_DOCS)
                    .map(|(doc, _)| documents[doc].as_ref().to_string())
                    .collect();

                if tf.is_empty() {
                    return fitted;
                }
                let class_total: f64 = tf.values().sum();
                let mut weighted: Vec<(&str, f64)> = tf
                    .iter()
                    .map(|(term, count)| {
                        let freq = term_freq.get(term).copied().unwrap_or(1.0);
                        let idf = (1.0 + avg_words / freq).ln();
                        (*term, count / class_total * idf)
                    })
                    .collect();
                weighted.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
                fitted.keywords = weighted
                    .into_iter()
                    .take(KEYWORDS_PER_TOPIC)
                    .map(|(t, _)| t.to_string())
                    .collect();
                fitted
            })
            .collect();

        let assigned = assignments.iter().filter(|a| **a >= 0).count();
        tracing::info!(documents = documents.len(), assigned, "topic model fitted");

        TopicFit {
            model: Self { topics },
            assignments,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn seed_catalog_has_general_topic() {
        let model = TopicModel::seeded();
        let names: Vec<&str> = model.topics().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names.len(), 9);
        assert_eq!(names.last(), Some(&"general"));
        assert!(model.topics().iter().all(|t| t.keywords.len() == KEYWORDS_PER_TOPIC));
    }

    #[test]
    fn predicts_by_keyword_share() {
        let model = TopicModel::seeded();
        let p = model.predict("My boss keeps moving every deadline and I feel burnout at work");
        assert_eq!(p.topic_name, "work_stress");
        // boss, deadline, burnout, work vs feel
        assert_eq!(p.confidence, 0.8);
    }

    #[test]
    fn bigram_keywords_match() {
        let model = TopicModel::seeded();
        let p = model.predict("I had a panic attack on the train");
        assert_eq!(p.topic_name, "anxiety");
        assert_eq!(p.confidence, 1.0);
    }

    #[test]
    fn no_hits_is_unknown() {
        let p = TopicModel::seeded().predict("The weather is mild today");
        assert!(p.is_unknown());
        assert_eq!(p, TopicPrediction::unknown());
    }

    #[test]
    fn fit_assigns_and_replaces_keywords() {
        let docs = [
            "I cannot sleep at night, insomnia again and again",
            "Insomnia makes me tired every night",
            "My boss yelled about the deadline at work",
            "Quarterly spreadsheets and lunch",
        ];
        let fit = TopicModel::seeded().fit(&docs);
        let sleep = &fit.model.topics()[6];
        let work = &fit.model.topics()[4];
        assert_eq!(fit.assignments, vec![6, 6, 4, -1]);
        assert_eq!(sleep.document_count, 2);
        assert_eq!(sleep.representative_docs.len(), 2);
        assert!(sleep.keywords.contains(&"insomnia".to_string()));
        assert!(sleep.keywords.contains(&"night".to_string()));
        assert!(sleep.keywords.len() <= KEYWORDS_PER_TOPIC);
        // the lone work document has no term shared with another document
        assert_eq!(work.document_count, 1);
        assert_eq!(work.keywords.len(), KEYWORDS_PER_TOPIC);
        assert_eq!(work.representative_docs, vec![docs[2].to_string()]);
        assert_eq!(fit.model.topics()[0].document_count, 0);
    }

    #[test]
    fn restores_from_persisted_topics() {
        let mut topics = TopicModel::seeded().topics().to_vec();
        topics.reverse();
        let model = TopicModel::from_topics(topics);
        assert_eq!(model.topics()[0].id, 0);
        assert_eq!(TopicModel::from_topics(Vec::new()).topics().len(), 9);
    }
}
