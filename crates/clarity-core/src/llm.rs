//! Chat-completion client.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::openai::{OpenAiConfig, post_json};

pub const DEFAULT_CHAT_MODEL: &str = "gpt-4";
pub const SYSTEM_PROMPT: &str = "You are Clarity, a compassionate AI therapy assistant.";

#[async_trait]
pub trait LlmClient: Send + Sync {
    fn model(&self) -> &str;

    /// Whether calls can succeed at all (credentials present).
    fn is_configured(&self) -> bool;

    /// Single-turn completion of `prompt` under `system`.
    async fn complete(&self, system: &str, prompt: &str) -> Result<String>;
}

/// Sampling parameters sent with every completion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sampling {
    pub max_tokens: u32,
    pub temperature: f32,
    pub presence_penalty: f32,
    pub frequency_penalty: f32,
}

impl Default for Sampling {
    fn default() -> Self {
        Self {
            max_tokens: 500,
            temperature: 0.7,
            presence_penalty: 0.1,
            frequency_penalty: 0.1,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
    presence_penalty: f32,
    frequency_penalty: f32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// `POST /v1/chat/completions` without streaming.
#[derive(Debug, Clone)]
pub struct OpenAiChat {
    client: reqwest::Client,
    config: OpenAiConfig,
    model: String,
    sampling: Sampling,
}

impl OpenAiChat {
    pub fn new(config: OpenAiConfig, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
            model: model.into(),
            sampling: Sampling::default(),
        }
    }

    pub fn with_sampling(mut self, sampling: Sampling) -> Self {
        self.sampling = sampling;
        self
    }
}

#[async_trait]
impl LlmClient for OpenAiChat {
    fn model(&self) -> &str {
        &self.model
    }

    fn is_configured(&self) -> bool {
        self.config.is_configured()
    }

    async fn complete(&self, system: &str, prompt: &str) -> Result<String> {
        let req = CompletionRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            max_tokens: self.sampling.max_tokens,
            temperature: self.sampling.temperature,
            presence_penalty: self.sampling.presence_penalty,
            frequency_penalty: self.sampling.frequency_penalty,
        };
        tracing::debug!(model = %self.model, prompt_chars = prompt.chars().count(), "requesting completion");

        let res: CompletionResponse = post_json(&self.client, &self.config, "/v1/chat/completions", &req).await?;
        let text = res
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .unwrap_or_default();
        if text.is_empty() {
            return Err(CoreError::InvalidResponse("completion had no content".into()));
        }
        Ok(text)
    }
}
