//! Chat stages: vision extraction and code generation through an LLM provider.
//!
//! This module only builds messages and classifies failures. Prompt wording
//! lives in [`crate::prompts`]; retry decisions live in [`crate::invoker`].
//!
//! ## Error classification
//!
//! | `LlmError` | Kind |
//! |------------|------|
//! | `RateLimited` | `RateLimited` |
//! | `NetworkError`, `Timeout` | `TransientNetwork` |
//! | `AuthError`, `InvalidRequest`, `ModelNotFound`, `ConfigError` | `Other` |
//! | `NotSupported`, `TokenLimitExceeded`, `SerializationError` | `Other` |
//! | `ApiError`, `ProviderError`, `Unknown` | decided by the message |
//!
//! Only the untyped variants are sniffed: a 429 status or rate-limit wording
//! → `RateLimited`, connect/reset/timeout wording → `TransientNetwork`,
//! anything else → `Other`, which the invoker never retries.

use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, LlmError, ProviderFactory};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use super::encode::ImagePayload;
use super::{mentions_rate_limit, mentions_status_429, mentions_transient_network};
use crate::config::AssistConfig;
use crate::error::{AssistError, StageError};

/// Stage label of the vision chat call in the extraction pipeline.
pub const VISION_STAGE: &str = "vision";

/// Stage label of the text generation call.
pub const GENERATION_STAGE: &str = "generation";

/// One chat turn: a user prompt, optionally with a screenshot attached.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub prompt: String,
    pub image: Option<ImagePayload>,
}

impl ChatRequest {
    pub fn text(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            image: None,
        }
    }

    pub fn with_image(prompt: impl Into<String>, image: ImagePayload) -> Self {
        Self {
            prompt: prompt.into(),
            image: Some(image),
        }
    }
}

/// Anything that can answer a [`ChatRequest`] with text.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn complete(&self, request: ChatRequest) -> Result<String, StageError>;
}

/// [`ChatBackend`] over an `edgequake_llm` provider.
pub struct ProviderChat {
    stage: &'static str,
    provider: Arc<dyn LLMProvider>,
    options: CompletionOptions,
}

impl ProviderChat {
    pub fn new(stage: &'static str, provider: Arc<dyn LLMProvider>, config: &AssistConfig) -> Self {
        Self {
            stage,
            provider,
            options: build_options(config),
        }
    }
}

#[async_trait]
impl ChatBackend for ProviderChat {
    async fn complete(&self, request: ChatRequest) -> Result<String, StageError> {
        let start = Instant::now();
        let messages = vec![match request.image {
            Some(image) => {
                ChatMessage::user_with_images(request.prompt.as_str(), vec![image.to_image_data()])
            }
            None => ChatMessage::user(request.prompt.as_str()),
        }];

        let response = self
            .provider
            .chat(&messages, Some(&self.options))
            .await
            .map_err(|e| classify_provider_error(self.stage, &e))?;

        debug!(
            "{}: {} input tokens, {} output tokens, {:?}",
            self.stage,
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );
        Ok(response.content)
    }
}

/// Instantiate a named provider with the given model.
///
/// The provider reads its API key (`MISTRAL_API_KEY`, `OPENAI_API_KEY`, …)
/// from the environment.
pub fn create_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, AssistError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        AssistError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Map a provider error onto the stage error taxonomy.
pub fn classify_provider_error(stage: &'static str, error: &LlmError) -> StageError {
    let detail = error.to_string();
    match error {
        LlmError::RateLimited(_) => StageError::rate_limited(stage, detail),
        LlmError::NetworkError(_) | LlmError::Timeout => StageError::network(stage, detail),
        LlmError::AuthError(_)
        | LlmError::InvalidRequest(_)
        | LlmError::ModelNotFound(_)
        | LlmError::ConfigError(_)
        | LlmError::NotSupported(_)
        | LlmError::TokenLimitExceeded { .. }
        | LlmError::SerializationError(_) => StageError::other(stage, detail),
        LlmError::ApiError(message)
        | LlmError::ProviderError(message)
        | LlmError::Unknown(message) => classify_message(stage, message, detail),
    }
}

fn classify_message(stage: &'static str, message: &str, detail: String) -> StageError {
    if mentions_status_429(message) || mentions_rate_limit(message) {
        StageError::rate_limited(stage, detail)
    } else if mentions_transient_network(message) {
        StageError::network(stage, detail)
    } else {
        StageError::other(stage, detail)
    }
}

/// Build `CompletionOptions` from the service config.
fn build_options(config: &AssistConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}
