//! API request state and response types.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::assist::CodeAssistant;

/// Request size limits.
///
/// Screenshots arrive base64-encoded inside JSON, a third larger than the
/// image itself, so the default sits well above Axum's 2 MB.
#[derive(Debug, Clone, Copy)]
pub struct ApiLimits {
    /// Maximum size of a request body in bytes. Default: 20 MB.
    pub max_request_body_bytes: usize,
}

impl Default for ApiLimits {
    fn default() -> Self {
        Self {
            max_request_body_bytes: 20 * 1024 * 1024,
        }
    }
}

impl ApiLimits {
    pub fn from_mb(max_request_body_mb: usize) -> Self {
        Self {
            max_request_body_bytes: max_request_body_mb.saturating_mul(1024 * 1024),
        }
    }
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Health status
    pub status: String,
    /// Crate version
    pub version: String,
}

/// Error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error type name
    pub error_type: String,
    /// Error message
    pub message: String,
    /// HTTP status code
    pub status_code: u16,
}

/// Shared handler state.
#[derive(Clone)]
pub struct ApiState {
    pub assistant: Arc<CodeAssistant>,
}
