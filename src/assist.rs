//! The two service operations: problem extraction and solution generation.
//!
//! Both run through the same [`crate::invoker::invoke`] policy; they differ
//! only in their stage list and in how a degraded payload is worded:
//!
//! | Operation | Stages | Partial output |
//! |-----------|--------|----------------|
//! | [`CodeAssistant::extract`]  | OCR → vision chat | OCR text |
//! | [`CodeAssistant::generate`] | text chat | none |
//!
//! Request validation happens before the invoker runs, so a malformed request
//! never costs an external call.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::AssistConfig;
use crate::error::AssistError;
use crate::invoker::{invoke, Degradation, PipelineFailure, RetryPolicy};
use crate::observer::{NoopObserver, SharedObserver};
use crate::output::{ExtractionResult, GenerationResult, Invocation};
use crate::pipeline::encode::ImagePayload;
use crate::pipeline::llm::{
    create_provider, ChatBackend, ChatRequest, ProviderChat, GENERATION_STAGE, VISION_STAGE,
};
use crate::pipeline::ocr::{MistralOcr, OcrBackend, STAGE as OCR_STAGE};
use crate::pipeline::postprocess::{clean_reply, excerpt, parse_extraction};
use crate::pipeline::with_timeout;
use crate::prompts::{extraction_prompt, generation_prompt};

/// Generic extraction answer when rate limiting left nothing to quote.
pub const EXTRACT_RATE_LIMITED_MESSAGE: &str =
    "Unable to process image due to API rate limits. Please try again later.";

/// Generic generation answer when rate limiting left nothing to quote.
pub const GENERATE_RATE_LIMITED_MESSAGE: &str =
    "Unable to generate a solution due to API rate limits. Please try again later.";

/// Body of `POST /api/extract`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractRequest {
    /// Base64 screenshots. Only the first one is processed.
    #[serde(default)]
    pub image_data_list: Vec<String>,
    #[serde(default)]
    pub language: Option<String>,
}

/// The problem a solution is requested for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProblemInfo {
    Text(String),
    Structured {
        #[serde(default)]
        title: String,
        #[serde(default)]
        problem: String,
        #[serde(default)]
        code: String,
    },
}

impl ProblemInfo {
    /// Flatten into the text placed in the generation prompt.
    ///
    /// Blank parts of a structured problem are left out; an entirely blank
    /// problem renders as an empty string.
    pub fn render(&self) -> String {
        match self {
            Self::Text(text) => text.trim().to_string(),
            Self::Structured {
                title,
                problem,
                code,
            } => {
                let mut parts = Vec::new();
                if !title.trim().is_empty() {
                    parts.push(format!("Title: {}", title.trim()));
                }
                if !problem.trim().is_empty() {
                    parts.push(format!("Problem: {}", problem.trim()));
                }
                if !code.trim().is_empty() {
                    parts.push(format!("Starter code:\n{}", code.trim_end()));
                }
                parts.join("\n\n")
            }
        }
    }
}

/// Body of `POST /api/generate`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    #[serde(default)]
    pub problem_info: Option<ProblemInfo>,
    #[serde(default)]
    pub language: Option<String>,
}

/// Owns the stage backends and runs the two operations.
///
/// Cheap to share behind an `Arc`; holds no per-request state.
pub struct CodeAssistant {
    config: AssistConfig,
    policy: RetryPolicy,
    ocr: Arc<dyn OcrBackend>,
    vision: Arc<dyn ChatBackend>,
    generator: Arc<dyn ChatBackend>,
    observer: SharedObserver,
}

impl CodeAssistant {
    /// Build production backends from `config`.
    ///
    /// # Errors
    /// [`AssistError::ProviderNotConfigured`] when the Mistral key is missing
    /// or a chat provider cannot be created.
    pub fn from_config(config: AssistConfig) -> Result<Self, AssistError> {
        let api_key = config
            .resolve_mistral_api_key()
            .ok_or_else(|| AssistError::ProviderNotConfigured {
                provider: "mistral-ocr".to_string(),
                hint: "Set MISTRAL_API_KEY or pass --mistral-api-key.".to_string(),
            })?;

        let ocr = MistralOcr::new(
            &config.mistral_base_url,
            api_key,
            config.ocr_model.clone(),
            config.api_timeout(),
        )?;

        let vision_llm = match config.vision_llm {
            Some(ref provider) => Arc::clone(provider),
            None => create_provider(&config.vision_provider, &config.vision_model)?,
        };
        let generation_llm = match config.generation_llm {
            Some(ref provider) => Arc::clone(provider),
            None => create_provider(&config.generation_provider, &config.generation_model)?,
        };

        let vision = ProviderChat::new(VISION_STAGE, vision_llm, &config);
        let generator = ProviderChat::new(GENERATION_STAGE, generation_llm, &config);

        info!(
            "Backends ready: ocr={} vision={}/{} generation={}/{}",
            config.ocr_model,
            config.vision_provider,
            config.vision_model,
            config.generation_provider,
            config.generation_model
        );

        Ok(Self::with_backends(
            config,
            Arc::new(ocr),
            Arc::new(vision),
            Arc::new(generator),
        ))
    }

    /// Assemble an assistant from arbitrary backends.
    pub fn with_backends(
        config: AssistConfig,
        ocr: Arc<dyn OcrBackend>,
        vision: Arc<dyn ChatBackend>,
        generator: Arc<dyn ChatBackend>,
    ) -> Self {
        Self {
            policy: config.retry_policy(),
            config,
            ocr,
            vision,
            generator,
            observer: Arc::new(NoopObserver),
        }
    }

    /// Replace the default no-op observer.
    pub fn with_observer(mut self, observer: SharedObserver) -> Self {
        self.observer = observer;
        self
    }

    pub fn config(&self) -> &AssistConfig {
        &self.config
    }

    /// Turn the first screenshot of `request` into problem text.
    ///
    /// # Errors
    /// - [`AssistError::InvalidRequest`] for an empty list or undecodable image
    /// - [`AssistError::ServiceUnavailable`] when network retries run out before OCR succeeds
    /// - [`AssistError::Upstream`] on an unclassified provider failure
    pub async fn extract(
        &self,
        request: &ExtractRequest,
    ) -> Result<Invocation<ExtractionResult>, AssistError> {
        let first = request
            .image_data_list
            .first()
            .ok_or_else(|| AssistError::invalid_request("imageDataList cannot be empty."))?;
        if request.image_data_list.len() > 1 {
            debug!(
                "Ignoring {} additional images; only the first is processed",
                request.image_data_list.len() - 1
            );
        }

        let image = ImagePayload::from_client(first)?;
        let language = self.language_for(request.language.as_deref());
        info!("Extracting problem ({}, language={})", image.mime_type(), language);

        let image = &image;
        let language = language.as_str();
        invoke(
            "extract",
            &self.policy,
            self.observer.as_ref(),
            move |_| self.run_extraction(image, language),
            |d| self.degraded_extraction(d, language),
        )
        .await
    }

    /// Generate a solution for the problem in `request`.
    ///
    /// # Errors
    /// - [`AssistError::InvalidRequest`] when `problemInfo` is missing or blank
    /// - [`AssistError::ServiceUnavailable`] when network retries run out
    /// - [`AssistError::Upstream`] on an unclassified provider failure
    pub async fn generate(
        &self,
        request: &GenerateRequest,
    ) -> Result<Invocation<GenerationResult>, AssistError> {
        let problem = request
            .problem_info
            .as_ref()
            .map(ProblemInfo::render)
            .filter(|p| !p.is_empty())
            .ok_or_else(|| {
                AssistError::invalid_request("problemInfo must be a non-empty string.")
            })?;

        let language = self.language_for(request.language.as_deref());
        info!("Generating solution ({} chars, language={})", problem.len(), language);

        let prompt = generation_prompt(&problem, &language);
        let prompt = prompt.as_str();
        invoke(
            "generate",
            &self.policy,
            self.observer.as_ref(),
            move |_| self.run_generation(prompt),
            |d| self.degraded_generation(d),
        )
        .await
    }

    fn language_for(&self, requested: Option<&str>) -> String {
        requested
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .unwrap_or(&self.config.default_language)
            .to_string()
    }

    async fn run_extraction(
        &self,
        image: &ImagePayload,
        language: &str,
    ) -> Result<ExtractionResult, PipelineFailure> {
        let timeout = self.config.api_timeout();

        let ocr_text = with_timeout(OCR_STAGE, timeout, self.ocr.recognize(image)).await?;
        debug!("OCR produced {} chars", ocr_text.len());

        let prompt = extraction_prompt(&ocr_text, language);
        let request = ChatRequest::with_image(prompt, image.clone());
        let reply = with_timeout(VISION_STAGE, timeout, self.vision.complete(request))
            .await
            .map_err(|e| PipelineFailure::from(e).with_partial(ocr_text.as_str()))?;

        Ok(parse_extraction(VISION_STAGE, &reply, language)?)
    }

    async fn run_generation(&self, prompt: &str) -> Result<GenerationResult, PipelineFailure> {
        let timeout = self.config.api_timeout();
        let reply = with_timeout(
            GENERATION_STAGE,
            timeout,
            self.generator.complete(ChatRequest::text(prompt)),
        )
        .await?;

        Ok(GenerationResult {
            code: clean_reply(&reply),
        })
    }

    fn degraded_extraction(
        &self,
        degradation: Degradation<'_>,
        language: &str,
    ) -> ExtractionResult {
        let n = self.config.excerpt_chars;
        let problem_info = match degradation {
            Degradation::RateLimited { partial: Some(ocr) } => {
                format!("API rate limited. Raw OCR text: {}...", excerpt(ocr, n))
            }
            Degradation::RateLimited { partial: None } => EXTRACT_RATE_LIMITED_MESSAGE.to_string(),
            Degradation::NetworkExhausted { partial } => format!(
                "Network error reaching API services. Raw OCR text: {}...",
                excerpt(partial, n)
            ),
            Degradation::Unparseable { raw } => {
                format!("Error parsing response. Raw content: {}...", excerpt(raw, n))
            }
        };
        ExtractionResult {
            problem_info,
            language: language.to_string(),
        }
    }

    fn degraded_generation(&self, degradation: Degradation<'_>) -> GenerationResult {
        let n = self.config.excerpt_chars;
        let code = match degradation {
            Degradation::RateLimited { .. } => GENERATE_RATE_LIMITED_MESSAGE.to_string(),
            Degradation::NetworkExhausted { partial } => format!(
                "Network error reaching API services. Partial output: {}...",
                excerpt(partial, n)
            ),
            Degradation::Unparseable { raw } => {
                format!("Error parsing response. Raw content: {}...", excerpt(raw, n))
            }
        };
        GenerationResult { code }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StageError;
    use crate::output::{Completion, DegradeReason};
    use async_trait::async_trait;
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FixedOcr(Result<String, StageError>, AtomicU32);

    #[async_trait]
    impl OcrBackend for FixedOcr {
        async fn recognize(&self, _image: &ImagePayload) -> Result<String, StageError> {
            self.1.fetch_add(1, Ordering::SeqCst);
            self.0.clone()
        }
    }

    struct FixedChat(Result<String, StageError>, AtomicU32);

    #[async_trait]
    impl ChatBackend for FixedChat {
        async fn complete(&self, _request: ChatRequest) -> Result<String, StageError> {
            self.1.fetch_add(1, Ordering::SeqCst);
            self.0.clone()
        }
    }

    fn assistant(
        ocr: Result<String, StageError>,
        chat: Result<String, StageError>,
    ) -> (CodeAssistant, Arc<FixedOcr>, Arc<FixedChat>) {
        let config = AssistConfig::builder()
            .max_retries(3)
            .initial_backoff_ms(10)
            .build()
            .unwrap();
        let ocr = Arc::new(FixedOcr(ocr, AtomicU32::new(0)));
        let chat = Arc::new(FixedChat(chat, AtomicU32::new(0)));
        let a = CodeAssistant::with_backends(
            config,
            ocr.clone(),
            chat.clone(),
            chat.clone(),
        );
        (a, ocr, chat)
    }

    fn image() -> String {
        STANDARD.encode([0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A])
    }

    #[tokio::test]
    async fn empty_image_list_makes_no_calls() {
        let (a, ocr, chat) = assistant(Ok("x".into()), Ok("{}".into()));
        let err = a.extract(&ExtractRequest::default()).await.unwrap_err();
        assert!(matches!(err, AssistError::InvalidRequest(_)));
        assert_eq!(ocr.1.load(Ordering::SeqCst), 0);
        assert_eq!(chat.1.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn blank_problem_info_makes_no_calls() {
        let (a, _, chat) = assistant(Ok("x".into()), Ok("code".into()));
        for info in [
            None,
            Some(ProblemInfo::Text("   \n".into())),
            Some(ProblemInfo::Structured {
                title: " ".into(),
                problem: String::new(),
                code: String::new(),
            }),
        ] {
            let req = GenerateRequest {
                problem_info: info,
                language: None,
            };
            assert!(matches!(
                a.generate(&req).await,
                Err(AssistError::InvalidRequest(_))
            ));
        }
        assert_eq!(chat.1.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn extraction_success_uses_requested_language_fallback() {
        let (a, _, _) = assistant(
            Ok("# Two Sum".into()),
            Ok(r#"{"problemInfo": "Two Sum: find indices"}"#.into()),
        );
        let req = ExtractRequest {
            image_data_list: vec![image()],
            language: Some("kotlin".into()),
        };
        let inv = a.extract(&req).await.unwrap();
        assert_eq!(inv.completion, Completion::Succeeded);
        assert_eq!(inv.value.problem_info, "Two Sum: find indices");
        assert_eq!(inv.value.language, "kotlin");
    }

    #[tokio::test(start_paused = true)]
    async fn vision_rate_limit_quotes_truncated_ocr_text() {
        let ocr_text = "é".repeat(800);
        let (a, ocr, chat) = assistant(
            Ok(ocr_text),
            Err(StageError::rate_limited(VISION_STAGE, "429")),
        );
        let req = ExtractRequest {
            image_data_list: vec![image()],
            language: None,
        };
        let inv = a.extract(&req).await.unwrap();

        assert_eq!(inv.completion, Completion::Degraded(DegradeReason::RateLimited));
        assert_eq!(ocr.1.load(Ordering::SeqCst), 3);
        assert_eq!(chat.1.load(Ordering::SeqCst), 3);
        let quoted = inv
            .value
            .problem_info
            .strip_prefix("API rate limited. Raw OCR text: ")
            .and_then(|s| s.strip_suffix("..."))
            .unwrap();
        assert_eq!(quoted.chars().count(), 500);
        assert_eq!(inv.value.language, "python");
    }

    #[tokio::test(start_paused = true)]
    async fn ocr_rate_limit_returns_generic_message() {
        let (a, _, chat) = assistant(
            Err(StageError::rate_limited(OCR_STAGE, "429")),
            Ok("{}".into()),
        );
        let req = ExtractRequest {
            image_data_list: vec![image()],
            language: None,
        };
        let inv = a.extract(&req).await.unwrap();
        assert_eq!(inv.value.problem_info, EXTRACT_RATE_LIMITED_MESSAGE);
        assert_eq!(chat.1.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unparseable_reply_is_degraded_not_fatal() {
        let (a, _, _) = assistant(Ok("ocr".into()), Ok("I could not read that".into()));
        let req = ExtractRequest {
            image_data_list: vec![image()],
            language: None,
        };
        let inv = a.extract(&req).await.unwrap();
        assert_eq!(inv.completion, Completion::Degraded(DegradeReason::Unparseable));
        assert_eq!(
            inv.value.problem_info,
            "Error parsing response. Raw content: I could not read that..."
        );
        assert_eq!(inv.attempts, 1);
    }

    #[tokio::test]
    async fn generation_strips_think_block() {
        let (a, _, _) = assistant(
            Ok(String::new()),
            Ok("<think>plan</think>\n{\"Code\": \"```py\\npass\\n```\"}".into()),
        );
        let req = GenerateRequest {
            problem_info: Some(ProblemInfo::Text("Reverse a list".into())),
            language: Some("python".into()),
        };
        let inv = a.generate(&req).await.unwrap();
        assert!(inv.value.code.starts_with("{\"Code\""));
    }

    #[tokio::test(start_paused = true)]
    async fn generation_rate_limit_degrades() {
        let (a, _, chat) = assistant(
            Ok(String::new()),
            Err(StageError::rate_limited(GENERATION_STAGE, "429")),
        );
        let req = GenerateRequest {
            problem_info: Some(ProblemInfo::Text("Reverse a list".into())),
            language: None,
        };
        let inv = a.generate(&req).await.unwrap();
        assert_eq!(inv.value.code, GENERATE_RATE_LIMITED_MESSAGE);
        assert_eq!(chat.1.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn structured_problem_renders_non_blank_parts() {
        let p = ProblemInfo::Structured {
            title: "Two Sum".into(),
            problem: "Find two numbers".into(),
            code: String::new(),
        };
        assert_eq!(p.render(), "Title: Two Sum\n\nProblem: Find two numbers");
    }

    #[test]
    fn problem_info_deserializes_both_shapes() {
        let text: GenerateRequest = serde_json::from_str(r#"{"problemInfo": "abc"}"#).unwrap();
        assert_eq!(text.problem_info, Some(ProblemInfo::Text("abc".into())));

        let body = r#"{"problemInfo": {"title": "t", "problem": "p"}, "language": "go"}"#;
        let structured: GenerateRequest = serde_json::from_str(body).unwrap();
        assert!(matches!(structured.problem_info, Some(ProblemInfo::Structured { .. })));
        assert_eq!(structured.language.as_deref(), Some("go"));
    }
}
