//! Configuration types for the code-assist backend.
//!
//! All service behaviour is controlled through [`AssistConfig`], built via its
//! [`AssistConfigBuilder`]. The binary maps its CLI flags (each with an
//! environment-variable fallback) onto the builder, so library users and
//! operators configure the same struct.

use crate::error::AssistError;
use crate::invoker::RetryPolicy;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Default Mistral API endpoint used by the OCR stage.
pub const DEFAULT_MISTRAL_BASE_URL: &str = "https://api.mistral.ai";

/// Configuration for a [`crate::assist::CodeAssistant`].
///
/// # Example
/// ```rust
/// use code_assist::AssistConfig;
///
/// let config = AssistConfig::builder()
///     .max_retries(3)
///     .initial_backoff_ms(1000)
///     .default_language("rust")
///     .build()
///     .unwrap();
/// assert_eq!(config.retry_policy().max_retries, 3);
/// ```
#[derive(Clone)]
pub struct AssistConfig {
    /// Attempt ceiling shared by every stage of a pipeline. Default: 5.
    ///
    /// Counts attempts, not re-tries: with 5 the pipeline runs at most five
    /// times and sleeps at most four times.
    pub max_retries: u32,

    /// First backoff delay in milliseconds; doubles after every retry. Default: 2000.
    pub initial_backoff_ms: u64,

    /// Per external call timeout in seconds. Default: 60.
    ///
    /// A call that exceeds it is treated as a transient network failure.
    pub api_timeout_secs: u64,

    /// Language assumed when a request does not name one. Default: "python".
    pub default_language: String,

    /// Characters of raw model or OCR output quoted in a degraded result. Default: 500.
    pub excerpt_chars: usize,

    /// Mistral OCR model. Default: "mistral-ocr-latest".
    pub ocr_model: String,

    /// Base URL of the Mistral API. Default: [`DEFAULT_MISTRAL_BASE_URL`].
    pub mistral_base_url: String,

    /// Mistral API key. Falls back to `MISTRAL_API_KEY` when `None`.
    pub mistral_api_key: Option<String>,

    /// Provider name for the vision chat stage. Default: "mistral".
    pub vision_provider: String,

    /// Model for the vision chat stage. Default: "pixtral-12b-latest".
    pub vision_model: String,

    /// Provider name for the code generation stage. Default: "mistral".
    pub generation_provider: String,

    /// Model for the code generation stage. Default: "codestral-latest".
    pub generation_model: String,

    /// Pre-constructed vision provider. Takes precedence over `vision_provider`.
    pub vision_llm: Option<Arc<dyn LLMProvider>>,

    /// Pre-constructed generation provider. Takes precedence over `generation_provider`.
    pub generation_llm: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature for both chat stages. Default: 0.0.
    ///
    /// Extraction is transcription and generation should be reproducible;
    /// neither benefits from sampling noise.
    pub temperature: f32,

    /// Maximum tokens a chat stage may generate. Default: 4096.
    pub max_tokens: usize,
}

impl Default for AssistConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_backoff_ms: 2000,
            api_timeout_secs: 60,
            default_language: "python".to_string(),
            excerpt_chars: 500,
            ocr_model: "mistral-ocr-latest".to_string(),
            mistral_base_url: DEFAULT_MISTRAL_BASE_URL.to_string(),
            mistral_api_key: None,
            vision_provider: "mistral".to_string(),
            vision_model: "pixtral-12b-latest".to_string(),
            generation_provider: "mistral".to_string(),
            generation_model: "codestral-latest".to_string(),
            vision_llm: None,
            generation_llm: None,
            temperature: 0.0,
            max_tokens: 4096,
        }
    }
}

impl fmt::Debug for AssistConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssistConfig")
            .field("max_retries", &self.max_retries)
            .field("initial_backoff_ms", &self.initial_backoff_ms)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("default_language", &self.default_language)
            .field("excerpt_chars", &self.excerpt_chars)
            .field("ocr_model", &self.ocr_model)
            .field("mistral_base_url", &self.mistral_base_url)
            .field("mistral_api_key", &self.mistral_api_key.as_ref().map(|_| "<redacted>"))
            .field("vision_provider", &self.vision_provider)
            .field("vision_model", &self.vision_model)
            .field("generation_provider", &self.generation_provider)
            .field("generation_model", &self.generation_model)
            .field("vision_llm", &self.vision_llm.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("generation_llm", &self.generation_llm.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl AssistConfig {
    /// Create a new builder for `AssistConfig`.
    pub fn builder() -> AssistConfigBuilder {
        AssistConfigBuilder {
            config: Self::default(),
        }
    }

    /// The retry policy shared by the extraction and generation pipelines.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_retries,
            Duration::from_millis(self.initial_backoff_ms),
        )
    }

    /// Per-call timeout as a `Duration`.
    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_secs)
    }

    /// Resolve the Mistral API key from the config or the environment.
    pub fn resolve_mistral_api_key(&self) -> Option<String> {
        self.mistral_api_key
            .clone()
            .or_else(|| std::env::var("MISTRAL_API_KEY").ok())
            .filter(|k| !k.trim().is_empty())
    }
}

/// Builder for [`AssistConfig`].
#[derive(Debug)]
pub struct AssistConfigBuilder {
    config: AssistConfig,
}

impl AssistConfigBuilder {
    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn initial_backoff_ms(mut self, ms: u64) -> Self {
        self.config.initial_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn default_language(mut self, language: impl Into<String>) -> Self {
        self.config.default_language = language.into();
        self
    }

    pub fn excerpt_chars(mut self, n: usize) -> Self {
        self.config.excerpt_chars = n.max(1);
        self
    }

    pub fn ocr_model(mut self, model: impl Into<String>) -> Self {
        self.config.ocr_model = model.into();
        self
    }

    pub fn mistral_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.mistral_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn mistral_api_key(mut self, key: impl Into<String>) -> Self {
        self.config.mistral_api_key = Some(key.into());
        self
    }

    pub fn vision_provider(mut self, name: impl Into<String>) -> Self {
        self.config.vision_provider = name.into();
        self
    }

    pub fn vision_model(mut self, model: impl Into<String>) -> Self {
        self.config.vision_model = model.into();
        self
    }

    pub fn generation_provider(mut self, name: impl Into<String>) -> Self {
        self.config.generation_provider = name.into();
        self
    }

    pub fn generation_model(mut self, model: impl Into<String>) -> Self {
        self.config.generation_model = model.into();
        self
    }

    pub fn vision_llm(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.vision_llm = Some(provider);
        self
    }

    pub fn generation_llm(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.generation_llm = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<AssistConfig, AssistError> {
        let c = &self.config;
        if c.max_retries == 0 {
            return Err(AssistError::InvalidConfig(
                "max_retries must be ≥ 1".into(),
            ));
        }
        if c.api_timeout_secs == 0 {
            return Err(AssistError::InvalidConfig(
                "api_timeout_secs must be ≥ 1".into(),
            ));
        }
        if c.default_language.trim().is_empty() {
            return Err(AssistError::InvalidConfig(
                "default_language must not be empty".into(),
            ));
        }
        if c.max_tokens == 0 {
            return Err(AssistError::InvalidConfig(
                "max_tokens must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}
