//! Text embeddings: the OpenAI embeddings endpoint, or a local
//! feature-hashing embedder when no API key is configured.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::openai::{OpenAiConfig, post_json};
use crate::text::ngrams;

pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
pub const HASHING_DIMENSIONS: usize = 384;

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Identifies the vector space. Vectors from different models are never
    /// compared.
    fn model(&self) -> &str;

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(&[text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| CoreError::InvalidResponse("no embedding returned".into()))
    }
}

/// Deterministic signed feature hashing over unigrams and bigrams.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
    model: String,
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(HASHING_DIMENSIONS)
    }
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        let dimensions = dimensions.max(1);
        Self {
            dimensions,
            model: format!("hashing-{dimensions}"),
        }
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dimensions];
        for gram in ngrams(text) {
            let h = fnv1a(gram.as_bytes());
            let idx = (h % self.dimensions as u64) as usize;
            let sign = if (h >> 63) == 0 { 1.0 } else { -1.0 };
            v[idx] += sign;
        }
        normalize(&mut v);
        v
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn model(&self) -> &str {
        &self.model
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    bytes
        .iter()
        .fold(OFFSET, |h, b| (h ^ u64::from(*b)).wrapping_mul(PRIME))
}

fn normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
}

/// Cosine similarity; 0 when either side is a zero vector or lengths differ.
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let (mut dot, mut na, mut nb) = (0f32, 0f32, 0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot / (na.sqrt() * nb.sqrt())
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

/// `POST /v1/embeddings`.
#[derive(Debug, Clone)]
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    config: OpenAiConfig,
    model: String,
}

impl OpenAiEmbedder {
    pub fn new(config: OpenAiConfig, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
            model: model.into(),
        }
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model(&self) -> &str {
        &self.model
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let req = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };
        let mut res: EmbeddingResponse = post_json(&self.client, &self.config, "/v1/embeddings", &req).await?;
        if res.data.len() != texts.len() {
            return Err(CoreError::InvalidResponse(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                res.data.len()
            )));
        }
        res.data.sort_by_key(|d| d.index);
        Ok(res.data.into_iter().map(|d| d.embedding).collect())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn hashing_is_deterministic_and_normalised() {
        let e = HashingEmbedder::default();
        let a = e.embed_text("I feel anxious about work");
        let b = e.embed_text("I feel anxious about work");
        assert_eq!(a.len(), HASHING_DIMENSIONS);
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn related_texts_are_closer() {
        let e = HashingEmbedder::default();
        let q = e.embed_text("anxious about my job interview");
        let near = e.embed_text("I get anxious before every job interview");
        let far = e.embed_text("planting tomatoes in the garden");
        assert!(cosine(&q, &near) > cosine(&q, &far));
    }

    #[test]
    fn empty_text_is_zero_vector() {
        let v = HashingEmbedder::default().embed_text("the and of");
        assert!(v.iter().all(|x| *x == 0.0));
        assert_eq!(cosine(&v, &v), 0.0);
    }

    #[tokio::test]
    async fn openai_embedder_orders_by_index() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/embeddings")
            .match_header("Authorization", "Bearer sk-test")
            .with_status(200)
            .with_body(
                r#"{"data":[{"embedding":[0.0,1.0],"index":1},{"embedding":[1.0,0.0],"index":0}]}"#,
            )
            .create_async()
            .await;

        let embedder = OpenAiEmbedder::new(
            OpenAiConfig::new(server.url(), Some("sk-test".into())),
            DEFAULT_EMBEDDING_MODEL,
        );
        let out = embedder.embed(&["a".into(), "b".into()]).await.unwrap();
        assert_eq!(out, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn openai_error_message_is_surfaced() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/embeddings")
            .with_status(401)
            .with_body(r#"{"error":{"message":"Incorrect API key provided","type":"invalid_request_error"}}"#)
            .create_async()
            .await;

        let embedder = OpenAiEmbedder::new(
            OpenAiConfig::new(server.url(), Some("bad".into())),
            DEFAULT_EMBEDDING_MODEL,
        );
        match embedder.embed_one("hello").await {
            Err(CoreError::Api { status, message }) => {
                assert_eq!(status, 401);
                assert_eq!(message, "Incorrect API key provided");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_key_is_not_configured() {
        let embedder = OpenAiEmbedder::new(OpenAiConfig::default(), DEFAULT_EMBEDDING_MODEL);
        assert!(matches!(
            embedder.embed_one("hello").await,
            Err(CoreError::NotConfigured(_))
        ));
    }
}
