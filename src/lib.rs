//! # code-assist-backend
//!
//! Backend for a coding-interview assistant: turn a screenshot of a
//! programming problem into text, then ask a model for a solution.
//!
//! ## Why this crate?
//!
//! Both operations are chains of calls to third-party AI services that rate
//! limit aggressively and drop connections under load. A naive proxy either
//! hammers them or surfaces every hiccup to the user. This crate wraps each
//! chain in one bounded exponential-backoff policy and, when retries run out,
//! answers with the best partial information it has instead of an error.
//!
//! ## Pipeline Overview
//!
//! ```text
//! screenshot (base64)
//!  │
//!  ├─ 1. Encode   validate base64, sniff PNG/JPEG/WebP/GIF
//!  ├─ 2. OCR      Mistral OCR → Markdown          ┐ restarted as a whole
//!  ├─ 3. Vision   Pixtral chat (OCR text + image)  ┘ on every retry
//!  ├─ 4. Polish   strip fences / think blocks, reshape JSON
//!  └─ 5. Output   { problemInfo, language }  or a degraded equivalent
//!
//! problem text
//!  ├─ 1. Generate chat completion (retried the same way)
//!  └─ 2. Output   { code }
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use code_assist::{AssistConfig, CodeAssistant, GenerateRequest, ProblemInfo};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Reads MISTRAL_API_KEY from the environment.
//!     let assistant = CodeAssistant::from_config(AssistConfig::default())?;
//!     let request = GenerateRequest {
//!         problem_info: Some(ProblemInfo::Text("Reverse a linked list".into())),
//!         language: Some("rust".into()),
//!     };
//!     let answer = assistant.generate(&request).await?;
//!     println!("{}", answer.value.code);
//!     eprintln!("{} attempt(s), degraded: {}", answer.attempts, answer.is_degraded());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `code-assist` binary (clap + anyhow + tracing-subscriber) |
//!
//! ## Retry Policy
//!
//! | Failure | Retried | On exhaustion |
//! |---------|---------|---------------|
//! | rate limited | yes | quote partial output, else "try again later" |
//! | network | yes | quote partial output, else HTTP 503 |
//! | unparseable reply | no | quote the raw reply |
//! | anything else | no | HTTP 500 |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod api;
pub mod assist;
pub mod config;
pub mod error;
pub mod invoker;
pub mod observer;
pub mod output;
pub mod pipeline;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use assist::{CodeAssistant, ExtractRequest, GenerateRequest, ProblemInfo};
pub use config::{AssistConfig, AssistConfigBuilder};
pub use error::{AssistError, StageError};
pub use invoker::{invoke, Degradation, PipelineFailure, RetryPolicy};
pub use observer::{InvocationObserver, NoopObserver, SharedObserver};
pub use output::{Completion, DegradeReason, ExtractionResult, GenerationResult, Invocation};
pub use pipeline::encode::ImagePayload;
pub use pipeline::llm::{ChatBackend, ChatRequest};
pub use pipeline::ocr::OcrBackend;
