//! Generative model access through an OpenAI-compatible chat endpoint

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::config::ModelConfig;

/// Failure of a single completion call, tagged by whether waiting can help
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("{0}")]
    Failed(String),
}

/// Stateless text completion
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, ModelError>;
}

/// Chat-completions client (OpenAI, Vertex AI OpenAI-compatible endpoint, ...)
pub struct OpenAiModel {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiModel {
    pub fn new(config: &ModelConfig, api_key: impl Into<String>) -> Self {
        let openai_config = OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(config.endpoint());

        // 429 retries belong to ResilientCompletion, not the client
        let no_backoff = backoff::ExponentialBackoffBuilder::new()
            .with_max_elapsed_time(Some(Duration::ZERO))
            .build();

        Self {
            client: Client::with_config(openai_config).with_backoff(no_backoff),
            model: config.name.clone(),
        }
    }
}

#[async_trait]
impl GenerativeModel for OpenAiModel {
    async fn generate(&self, prompt: &str) -> Result<String, ModelError> {
        let message = ChatCompletionRequestUserMessageArgs::default()
            .content(prompt)
            .build()
            .map_err(classify_openai_error)?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(vec![ChatCompletionRequestMessage::User(message)])
            .temperature(0.0)
            .build()
            .map_err(classify_openai_error)?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(classify_openai_error)?;

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| ModelError::Failed(format!("No response content from {}", self.model)))?;

        tracing::debug!(chars = content.len(), "Model response received");
        Ok(content)
    }
}

/// Map a client error onto the retryable / non-retryable split
pub fn classify_openai_error(err: OpenAIError) -> ModelError {
    match &err {
        OpenAIError::ApiError(api) if is_rate_limit(api.r#type.as_deref(), &api.message) => {
            ModelError::RateLimited(api.message.clone())
        }
        OpenAIError::Reqwest(e) if e.status().map(|s| s.as_u16()) == Some(429) => {
            ModelError::RateLimited(e.to_string())
        }
        _ => ModelError::Failed(err.to_string()),
    }
}

/// Whether an API error describes transient throttling.
///
/// Quota exhaustion is reported with the same HTTP status but will not
/// clear by waiting, so it is never treated as a rate limit.
pub fn is_rate_limit(error_type: Option<&str>, message: &str) -> bool {
    match error_type {
        Some("insufficient_quota") => false,
        Some("rate_limit_exceeded") | Some("requests") | Some("tokens") => true,
        _ => {
            let message = message.to_lowercase();
            // Per-minute quotas refill on their own; account quotas do not
            let per_minute = message.contains("per minute") || message.contains("per_minute");
            if message.contains("quota") && !per_minute {
                return false;
            }
            message.contains("rate limit")
                || message.contains("resource exhausted")
                || message.contains("resource_exhausted")
                || message.contains("too many requests")
                || message.contains("429")
        }
    }
}
