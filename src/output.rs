//! Output types returned by the extraction and generation operations.
//!
//! The two payload structs are the wire schema the client application
//! expects (camelCase keys); [`Invocation`] wraps a payload with how it was
//! obtained so callers and logs can tell a clean answer from a degraded one.

use serde::{Deserialize, Serialize};

/// Structured problem text recovered from a screenshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionResult {
    /// The problem statement as plain text.
    pub problem_info: String,
    /// Programming language the solution should be written in.
    pub language: String,
}

/// A generated solution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationResult {
    /// The model's reply, usually a JSON document with explanation and code.
    pub code: String,
}

/// Why an invocation settled for a degraded payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradeReason {
    /// The attempt ceiling was reached while the provider kept rate limiting.
    RateLimited,
    /// The attempt ceiling was reached on network errors, but partial output existed.
    NetworkExhausted,
    /// The provider's reply could not be parsed into the expected shape.
    Unparseable,
}

impl DegradeReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RateLimited => "rate_limited",
            Self::NetworkExhausted => "network_exhausted",
            Self::Unparseable => "unparseable",
        }
    }
}

/// How an invocation finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Completion {
    Succeeded,
    Degraded(DegradeReason),
}

/// A payload plus the bookkeeping of the invocation that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invocation<T> {
    pub value: T,
    pub completion: Completion,
    /// Pipeline runs performed, including the final one (1-based).
    pub attempts: u32,
    /// Wall-clock time spent, backoff sleeps included.
    pub duration_ms: u64,
}

impl<T> Invocation<T> {
    pub fn is_degraded(&self) -> bool {
        matches!(self.completion, Completion::Degraded(_))
    }

    /// Discard the bookkeeping and keep the payload.
    pub fn into_value(self) -> T {
        self.value
    }
}
