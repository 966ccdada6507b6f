//! A small TF-IDF index over unigram + bigram features.
//!
//! Weights follow the usual smoothed formulation: raw term counts scaled by
//! `ln((1 + n) / (1 + df)) + 1`, then L2-normalised, so the dot product of two
//! vectors is their cosine similarity.

use std::collections::HashMap;

use crate::text::ngrams;

/// Sparse, L2-normalised feature vector sorted by feature index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SparseVector(Vec<(usize, f64)>);

impl SparseVector {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Dot product; equals cosine similarity for normalised vectors.
    pub fn dot(&self, other: &SparseVector) -> f64 {
        let (mut i, mut j, mut acc) = (0, 0, 0.0);
        while i < self.0.len() && j < other.0.len() {
            let (a, b) = (self.0[i], other.0[j]);
            match a.0.cmp(&b.0) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    acc += a.1 * b.1;
                    i += 1;
                    j += 1;
                }
            }
        }
        acc
    }
}

#[derive(Debug, Clone, Default)]
pub struct TfidfIndex {
    vocabulary: HashMap<String, usize>,
    idf: Vec<f64>,
    documents: Vec<SparseVector>,
}

impl TfidfIndex {
    /// Fits the vocabulary and idf weights on `docs` and keeps their vectors.
    pub fn fit<S: AsRef<str>>(docs: &[S]) -> Self {
        let mut vocabulary: HashMap<String, usize> = HashMap::new();
        let mut df: Vec<usize> = Vec::new();
        let tokenized: Vec<Vec<String>> = docs.iter().map(|d| ngrams(d.as_ref())).collect();

        for grams in &tokenized {
            let mut seen: Vec<usize> = Vec::new();
            for g in grams {
                let next = vocabulary.len();
                let idx = *vocabulary.entry(g.clone()).or_insert(next);
                if idx == df.len() {
                    df.push(0);
                }
                if !seen.contains(&idx) {
                    seen.push(idx);
                    df[idx] += 1;
                }
            }
        }

        let n = docs.len() as f64;
        let idf = df
            .iter()
            .map(|&d| ((1.0 + n) / (1.0 + d as f64)).ln() + 1.0)
            .collect();

        let mut index = Self {
            vocabulary,
            idf,
            documents: Vec::with_capacity(docs.len()),
        };
        index.documents = tokenized.iter().map(|g| index.vectorize(g)).collect();
        index
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Projects `text` onto the fitted vocabulary. Unknown terms are ignored.
    pub fn transform(&self, text: &str) -> SparseVector {
        self.vectorize(&ngrams(text))
    }

    /// Cosine similarity of `text` against every fitted document, in fit order.
    pub fn similarities(&self, text: &str) -> Vec<f64> {
        let query = self.transform(text);
        self.documents.iter().map(|d| d.dot(&query)).collect()
    }

    fn vectorize(&self, grams: &[String]) -> SparseVector {
        let mut counts: HashMap<usize, f64> = HashMap::new();
        for g in grams {
            if let Some(&idx) = self.vocabulary.get(g) {
                *counts.entry(idx).or_insert(0.0) += 1.0;
            }
        }
        let mut weights: Vec<(usize, f64)> = counts
            .into_iter()
            .map(|(idx, tf)| (idx, tf * self.idf[idx]))
            .collect();
        let norm = weights.iter().map(|(_, w)| w * w).sum::<f64>().sqrt();
        if norm > 0.0 {
            for (_, w) in weights.iter_mut() {
                *w /= norm;
            }
        }
        weights.sort_by_key(|(idx, _)| *idx);
        SparseVector(weights)
    }
}
