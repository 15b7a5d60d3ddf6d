//! Pipeline stages for the extraction and generation operations.
//!
//! Each submodule implements one step. The retry loop in [`crate::invoker`]
//! only sees classified [`StageError`]s, so stages can be swapped (another
//! OCR vendor, another chat provider) without touching retry logic.
//!
//! ## Data Flow
//!
//! ```text
//! extract:  encode ──▶ ocr ──▶ llm (vision) ──▶ postprocess
//! generate:            llm (text) ──▶ postprocess
//! ```
//!
//! 1. [`encode`]: validate the client's base64 image and sniff its format
//! 2. [`ocr`]: Mistral OCR over HTTP; its text is the partial output
//! 3. [`llm`]: chat completions through an `edgequake_llm` provider
//! 4. [`postprocess`]: strip fences and think blocks, reshape JSON replies

pub mod encode;
pub mod llm;
pub mod ocr;
pub mod postprocess;

use once_cell::sync::Lazy;
use regex::Regex;
use std::future::Future;
use std::time::Duration;

use crate::error::StageError;

static RE_RATE_LIMIT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)rate[\s_-]?limit|too many requests|quota exceeded|capacity exceeded").unwrap()
});

// A 429 only counts when it reads as a status, not as digits inside an id.
static RE_STATUS_429: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(status|http|code)(\s*code)?[\s:=]*429\b").unwrap()
});

static RE_TRANSIENT_NETWORK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?i)connection (reset|refused|closed|aborted)|connect(ion)? error",
        r"|error sending request|timed? ?out|broken pipe|unexpected eof",
        r"|incomplete message|dns error|network",
    ))
    .unwrap()
});

/// Does a message use rate-limit or quota wording?
///
/// Bare numbers are ignored: response bodies carry request ids and offsets.
pub(crate) fn mentions_rate_limit(message: &str) -> bool {
    RE_RATE_LIMIT.is_match(message)
}

/// Does a provider message report HTTP status 429?
pub(crate) fn mentions_status_429(message: &str) -> bool {
    RE_STATUS_429.is_match(message)
}

/// Does a provider message describe a connect/read/reset failure?
pub(crate) fn mentions_transient_network(message: &str) -> bool {
    RE_TRANSIENT_NETWORK.is_match(message)
}

/// Bound a stage call by `limit`; an elapsed timer is a transient network failure.
pub async fn with_timeout<T, F>(
    stage: &'static str,
    limit: Duration,
    call: F,
) -> Result<T, StageError>
where
    F: Future<Output = Result<T, StageError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(StageError::network(
            stage,
            format!("call timed out after {}s", limit.as_secs()),
        )),
    }
}
