//! OCR stage: screenshot → Markdown text via the Mistral OCR endpoint.
//!
//! The OCR text is the extraction pipeline's *partial output*: once it is
//! known, a later failure in the vision stage can still be answered with a
//! degraded result quoting it.
//!
//! ## Error classification
//!
//! | Condition | Kind |
//! |-----------|------|
//! | connect / timeout / request / body error | `TransientNetwork` |
//! | HTTP 429, or a body using rate-limit wording | `RateLimited` |
//! | HTTP 502 / 503 / 504 | `TransientNetwork` |
//! | any other status, malformed body, no pages | `Other` |

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::encode::ImagePayload;
use super::mentions_rate_limit;
use crate::error::{AssistError, StageError};

/// Stage label used in logs and errors.
pub const STAGE: &str = "ocr";

/// Anything that can turn an image into text.
#[async_trait]
pub trait OcrBackend: Send + Sync {
    /// Return the recognised text of the (first page of the) image.
    async fn recognize(&self, image: &ImagePayload) -> Result<String, StageError>;
}

/// Mistral `/v1/ocr` client.
pub struct MistralOcr {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
struct OcrRequest<'a> {
    model: &'a str,
    document: OcrDocument,
}

#[derive(Serialize)]
struct OcrDocument {
    #[serde(rename = "type")]
    kind: &'static str,
    image_url: String,
}

#[derive(Deserialize)]
struct OcrResponse {
    #[serde(default)]
    pages: Vec<OcrPage>,
}

#[derive(Deserialize)]
struct OcrPage {
    #[serde(default)]
    markdown: String,
}

impl MistralOcr {
    pub fn new(
        base_url: &str,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, AssistError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AssistError::Internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}/v1/ocr", base_url.trim_end_matches('/')),
            api_key: api_key.into(),
            model: model.into(),
        })
    }
}

#[async_trait]
impl OcrBackend for MistralOcr {
    async fn recognize(&self, image: &ImagePayload) -> Result<String, StageError> {
        let body = OcrRequest {
            model: &self.model,
            document: OcrDocument {
                kind: "image_url",
                image_url: image.data_uri(),
            },
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_transport(&e))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| classify_transport(&e))?;

        if !status.is_success() {
            return Err(classify_status(status, &text));
        }

        let parsed: OcrResponse = serde_json::from_str(&text)
            .map_err(|e| StageError::other(STAGE, format!("malformed OCR response: {e}")))?;

        let markdown = parsed
            .pages
            .into_iter()
            .next()
            .map(|p| p.markdown)
            .ok_or_else(|| StageError::other(STAGE, "OCR response contained no pages"))?;

        debug!("OCR recognised {} chars", markdown.len());
        Ok(markdown)
    }
}

/// Classify a failed exchange with the OCR endpoint from its transport error.
fn classify_transport(e: &reqwest::Error) -> StageError {
    if e.is_connect() || e.is_timeout() || e.is_request() || e.is_body() {
        StageError::network(STAGE, e.to_string())
    } else {
        StageError::other(STAGE, e.to_string())
    }
}

/// Classify a non-success HTTP status.
fn classify_status(status: StatusCode, body: &str) -> StageError {
    let detail = format!("HTTP {}: {}", status.as_u16(), body.trim());
    if status == StatusCode::TOO_MANY_REQUESTS || mentions_rate_limit(body) {
        StageError::rate_limited(STAGE, detail)
    } else if matches!(
        status,
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT
    ) {
        StageError::network(STAGE, detail)
    } else {
        StageError::other(STAGE, detail)
    }
}
