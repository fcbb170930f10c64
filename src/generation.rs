//! Text-generation backend
//!
//! [`TextGenerator`] is the seam the digest service talks to.
//! [`ChatCompletionsClient`] implements it for any OpenAI-compatible
//! `/chat/completions` endpoint.

use crate::config::{GenerationConfig, RetryConfig};
use crate::error::{Error, GenerationError, Result};
use crate::retry::with_retry;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A system instruction plus one user message
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompletionRequest {
    /// System prompt
    pub system: String,
    /// User prompt
    pub user: String,
}

/// Produces text for a prompt
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Complete `request`, returning the generated text
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// OpenAI-compatible chat completions client
#[derive(Clone)]
pub struct ChatCompletionsClient {
    client: reqwest::Client,
    config: GenerationConfig,
    retry: RetryConfig,
}

impl ChatCompletionsClient {
    /// Create a client
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created
    pub fn new(config: GenerationConfig, retry: RetryConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            retry,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    async fn complete_once(&self, request: &CompletionRequest) -> Result<String> {
        let body = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: request.system.clone(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: request.user.clone(),
                },
            ],
            max_tokens: self.config.max_tokens,
        };

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body,
            }
            .into());
        }

        let reply: ChatResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::Malformed(e.to_string()))?;

        reply
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| GenerationError::EmptyResponse.into())
    }
}

#[async_trait]
impl TextGenerator for ChatCompletionsClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        debug!(
            model = %self.config.model,
            prompt_chars = request.user.chars().count(),
            "Requesting completion"
        );
        let text = with_retry(&self.retry, "chat completion", || self.complete_once(request)).await?;
        debug!(reply_chars = text.chars().count(), "Completion received");
        Ok(text)
    }
}
