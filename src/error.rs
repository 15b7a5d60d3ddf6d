//! Error types for the code-assist backend.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`StageError`]: **Classified, usually recoverable**: one external call
//!   (OCR, vision chat, text generation) failed. The retry loop in
//!   [`crate::invoker`] inspects the classification to decide whether to back
//!   off and restart the pipeline, degrade, or give up.
//!
//! * [`AssistError`]: **Fatal**: the request cannot be served at all (bad
//!   input, exhausted network retries, unclassified upstream failure, missing
//!   provider configuration). Returned as `Err(AssistError)` from the
//!   [`crate::assist::CodeAssistant`] operations and mapped to an HTTP status
//!   by [`crate::api`].

use thiserror::Error;

/// A classified failure of a single pipeline stage.
///
/// `stage` is a short static label (`"ocr"`, `"vision"`, `"generation"`) used
/// in logs and error messages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StageError {
    /// The provider reported quota exhaustion or backpressure (HTTP 429 and friends).
    #[error("{stage}: rate limit exceeded: {detail}")]
    RateLimited { stage: &'static str, detail: String },

    /// Connection reset, connect, read or timeout failure talking to the provider.
    #[error("{stage}: network error: {detail}")]
    TransientNetwork { stage: &'static str, detail: String },

    /// The provider answered, but not with the structured data we asked for.
    ///
    /// `raw` holds the unparsed reply so a degraded result can quote it.
    #[error("{stage}: response is not valid structured data: {detail}")]
    ParseFailure {
        stage: &'static str,
        detail: String,
        raw: String,
    },

    /// Anything else. Never retried.
    #[error("{stage}: {detail}")]
    Other { stage: &'static str, detail: String },
}

impl StageError {
    pub fn rate_limited(stage: &'static str, detail: impl Into<String>) -> Self {
        Self::RateLimited {
            stage,
            detail: detail.into(),
        }
    }

    pub fn network(stage: &'static str, detail: impl Into<String>) -> Self {
        Self::TransientNetwork {
            stage,
            detail: detail.into(),
        }
    }

    pub fn parse(stage: &'static str, detail: impl Into<String>, raw: impl Into<String>) -> Self {
        Self::ParseFailure {
            stage,
            detail: detail.into(),
            raw: raw.into(),
        }
    }

    pub fn other(stage: &'static str, detail: impl Into<String>) -> Self {
        Self::Other {
            stage,
            detail: detail.into(),
        }
    }

    /// The stage label this error originated from.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::RateLimited { stage, .. }
            | Self::TransientNetwork { stage, .. }
            | Self::ParseFailure { stage, .. }
            | Self::Other { stage, .. } => stage,
        }
    }

    /// `true` for the two kinds the invoker backs off and retries on.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::TransientNetwork { .. })
    }
}

/// All fatal errors returned by the code-assist library.
#[derive(Debug, Error)]
pub enum AssistError {
    // ── Request errors ────────────────────────────────────────────────────
    /// The request is malformed; no external call was attempted.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // ── Upstream errors ───────────────────────────────────────────────────
    /// Every attempt failed with a network error and nothing partial was obtained.
    #[error("Network error when connecting to API services after {attempts} attempts: {detail}")]
    ServiceUnavailable { attempts: u32, detail: String },

    /// An unclassified upstream failure. Surfaced on the first occurrence.
    #[error("An unexpected error occurred in stage '{stage}': {detail}")]
    Upstream { stage: &'static str, detail: String },

    // ── Setup errors ──────────────────────────────────────────────────────
    /// A provider could not be initialised (missing API key, unknown name).
    #[error("Provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AssistError {
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }
}
