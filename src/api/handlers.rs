//! API request handlers.

use axum::{
    extract::{rejection::JsonRejection, State},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use super::{
    error::ApiError,
    types::{ApiState, HealthResponse},
};
use crate::assist::{ExtractRequest, GenerateRequest};
use crate::output::{Completion, Invocation};

/// Extract endpoint handler.
///
/// POST /api/extract
///
/// Accepts `{ imageDataList: [base64, ...], language?: string }` and returns
/// `{ problemInfo, language }`. Only the first image is processed.
pub async fn extract_handler(
    State(state): State<ApiState>,
    payload: Result<Json<ExtractRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload?;
    let invocation = state.assistant.extract(&request).await?;
    Ok(respond(invocation))
}

/// Generate endpoint handler.
///
/// POST /api/generate
///
/// Accepts `{ problemInfo: string | {title, problem, code}, language?: string }`
/// and returns `{ code }`.
pub async fn generate_handler(
    State(state): State<ApiState>,
    payload: Result<Json<GenerateRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload?;
    let invocation = state.assistant.generate(&request).await?;
    Ok(respond(invocation))
}

/// Health check endpoint handler.
///
/// GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

fn respond<T: Serialize>(invocation: Invocation<T>) -> Response {
    let completion = match invocation.completion {
        Completion::Succeeded => "succeeded".to_string(),
        Completion::Degraded(reason) => format!("degraded:{}", reason.as_str()),
    };
    let headers = [
        ("x-assist-attempts", invocation.attempts.to_string()),
        ("x-assist-completion", completion),
    ];
    (headers, Json(invocation.value)).into_response()
}
