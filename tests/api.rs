//! Router-level tests for the HTTP API.
//!
//! Every test drives the real router with scripted in-process backends, so
//! no network access or API key is needed.

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tokio_test::assert_ok;
use tower::ServiceExt;

use code_assist::{
    api::{create_router, create_router_with_limits, ApiLimits, ErrorResponse, HealthResponse},
    AssistConfig, ChatBackend, ChatRequest, CodeAssistant, ImagePayload, OcrBackend, StageError,
};

// ── Scripted backends ───────────────────────────────────────────────────────

/// Replays a fixed list of outcomes; the last one repeats forever.
struct Script {
    outcomes: Mutex<VecDeque<Result<String, StageError>>>,
    calls: AtomicU32,
}

impl Script {
    fn new(outcomes: Vec<Result<String, StageError>>) -> Arc<Self> {
        Arc::new(Self {
            outcomes: Mutex::new(outcomes.into()),
            calls: AtomicU32::new(0),
        })
    }

    fn next(&self) -> Result<String, StageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut q = self.outcomes.lock().unwrap();
        if q.len() > 1 {
            q.pop_front().unwrap()
        } else {
            q.front().cloned().unwrap()
        }
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

struct ScriptedOcr(Arc<Script>);

#[async_trait]
impl OcrBackend for ScriptedOcr {
    async fn recognize(&self, _image: &ImagePayload) -> Result<String, StageError> {
        self.0.next()
    }
}

struct ScriptedChat(Arc<Script>);

#[async_trait]
impl ChatBackend for ScriptedChat {
    async fn complete(&self, _request: ChatRequest) -> Result<String, StageError> {
        self.0.next()
    }
}

struct Harness {
    ocr: Arc<Script>,
    vision: Arc<Script>,
    generator: Arc<Script>,
}

impl Harness {
    fn new(
        ocr: Vec<Result<String, StageError>>,
        vision: Vec<Result<String, StageError>>,
        generator: Vec<Result<String, StageError>>,
    ) -> Self {
        Self {
            ocr: Script::new(ocr),
            vision: Script::new(vision),
            generator: Script::new(generator),
        }
    }

    fn assistant(&self) -> Arc<CodeAssistant> {
        let config = AssistConfig::builder()
            .max_retries(3)
            .initial_backoff_ms(1)
            .build()
            .unwrap();
        Arc::new(CodeAssistant::with_backends(
            config,
            Arc::new(ScriptedOcr(self.ocr.clone())),
            Arc::new(ScriptedChat(self.vision.clone())),
            Arc::new(ScriptedChat(self.generator.clone())),
        ))
    }

    fn router(&self) -> Router {
        create_router(self.assistant())
    }
}

fn screenshot() -> String {
    STANDARD.encode([0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0])
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Value) {
    let response = assert_ok!(app.oneshot(request).await);
    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, headers, value)
}

// ── Health ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_health_endpoint() {
    let h = Harness::new(vec![Ok(String::new())], vec![Ok(String::new())], vec![Ok(String::new())]);
    let response = h
        .router()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let health: HealthResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(health.status, "healthy");
    assert!(!health.version.is_empty());
}

// ── /api/extract ────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_extract_success() {
    let h = Harness::new(
        vec![Ok("# Two Sum\nGiven nums and target...".into())],
        vec![Ok(
            "```json\n{\"problemInfo\": \"Two Sum: find indices\", \"language\": \"java\"}\n```"
                .into(),
        )],
        vec![Ok(String::new())],
    );
    let body = json!({ "imageDataList": [screenshot()], "language": "java" });
    let (status, headers, value) = send(h.router(), post_json("/api/extract", &body)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(value["problemInfo"], "Two Sum: find indices");
    assert_eq!(value["language"], "java");
    assert_eq!(headers["x-assist-attempts"], "1");
    assert_eq!(headers["x-assist-completion"], "succeeded");
}

#[tokio::test]
async fn test_extract_empty_list_is_400_without_calls() {
    let h = Harness::new(vec![Ok("x".into())], vec![Ok("{}".into())], vec![Ok(String::new())]);
    let (status, _, value) =
        send(h.router(), post_json("/api/extract", &json!({ "imageDataList": [] }))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let err: ErrorResponse = serde_json::from_value(value).unwrap();
    assert_eq!(err.message, "imageDataList cannot be empty.");
    assert_eq!(err.status_code, 400);
    assert_eq!(h.ocr.calls(), 0);
    assert_eq!(h.vision.calls(), 0);
}

#[tokio::test]
async fn test_extract_malformed_json_is_400() {
    let h = Harness::new(vec![Ok("x".into())], vec![Ok("{}".into())], vec![Ok(String::new())]);
    let request = Request::builder()
        .method("POST")
        .uri("/api/extract")
        .header("content-type", "application/json")
        .body(Body::from("{\"imageDataList\": [\"abc\""))
        .unwrap();
    let (status, _, value) = send(h.router(), request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(value["error_type"], "ValidationError");
}

#[tokio::test]
async fn test_extract_invalid_base64_is_400() {
    let h = Harness::new(vec![Ok("x".into())], vec![Ok("{}".into())], vec![Ok(String::new())]);
    let body = json!({ "imageDataList": ["%%% not base64 %%%"] });
    let (status, _, _) = send(h.router(), post_json("/api/extract", &body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(h.ocr.calls(), 0);
}

#[tokio::test]
async fn test_extract_recovers_after_rate_limit() {
    let h = Harness::new(
        vec![Ok("ocr text".into())],
        vec![
            Err(StageError::rate_limited("vision", "429")),
            Ok(r#"{"problemInfo": "Reverse a list"}"#.into()),
        ],
        vec![Ok(String::new())],
    );
    let body = json!({ "imageDataList": [screenshot()] });
    let (status, headers, value) = send(h.router(), post_json("/api/extract", &body)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(value["problemInfo"], "Reverse a list");
    assert_eq!(value["language"], "python");
    assert_eq!(headers["x-assist-attempts"], "2");
    // Whole pipeline restarted: OCR ran again.
    assert_eq!(h.ocr.calls(), 2);
}

#[tokio::test]
async fn test_extract_rate_limit_exhaustion_quotes_ocr_text() {
    let h = Harness::new(
        vec![Ok("# Valid Parentheses".into())],
        vec![Err(StageError::rate_limited("vision", "Requests rate limit exceeded"))],
        vec![Ok(String::new())],
    );
    let body = json!({ "imageDataList": [screenshot()] });
    let (status, headers, value) = send(h.router(), post_json("/api/extract", &body)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        value["problemInfo"],
        "API rate limited. Raw OCR text: # Valid Parentheses..."
    );
    assert_eq!(headers["x-assist-attempts"], "3");
    assert_eq!(headers["x-assist-completion"], "degraded:rate_limited");
    assert_eq!(h.vision.calls(), 3);
}

#[tokio::test]
async fn test_extract_network_exhaustion_without_partial_is_503() {
    let h = Harness::new(
        vec![Err(StageError::network("ocr", "connection reset by peer"))],
        vec![Ok("{}".into())],
        vec![Ok(String::new())],
    );
    let body = json!({ "imageDataList": [screenshot()] });
    let (status, _, value) = send(h.router(), post_json("/api/extract", &body)).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(value["status_code"], 503);
    assert_eq!(h.ocr.calls(), 3);
    assert_eq!(h.vision.calls(), 0);
}

#[tokio::test]
async fn test_extract_network_exhaustion_with_partial_degrades() {
    let h = Harness::new(
        vec![Ok("partial OCR".into())],
        vec![Err(StageError::network("vision", "timed out"))],
        vec![Ok(String::new())],
    );
    let body = json!({ "imageDataList": [screenshot()] });
    let (status, headers, value) = send(h.router(), post_json("/api/extract", &body)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        value["problemInfo"],
        "Network error reaching API services. Raw OCR text: partial OCR..."
    );
    assert_eq!(headers["x-assist-completion"], "degraded:network_exhausted");
}

#[tokio::test]
async fn test_extract_unclassified_error_is_500_immediately() {
    let h = Harness::new(
        vec![Err(StageError::other("ocr", "HTTP 401: Unauthorized"))],
        vec![Ok("{}".into())],
        vec![Ok(String::new())],
    );
    let body = json!({ "imageDataList": [screenshot()] });
    let (status, _, value) = send(h.router(), post_json("/api/extract", &body)).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(value["status_code"], 500);
    assert_eq!(h.ocr.calls(), 1);
}

#[tokio::test]
async fn test_extract_body_over_limit_is_413() {
    let h = Harness::new(vec![Ok("x".into())], vec![Ok("{}".into())], vec![Ok(String::new())]);
    let app = create_router_with_limits(
        h.assistant(),
        ApiLimits {
            max_request_body_bytes: 64,
        },
    );
    let payload = json!({ "imageDataList": ["A".repeat(1024)] }).to_string();
    let request = Request::builder()
        .method("POST")
        .uri("/api/extract")
        .header("content-type", "application/json")
        .header("content-length", payload.len())
        .body(Body::from(payload))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(h.ocr.calls(), 0);
}

// ── /api/generate ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_generate_success_with_string_problem() {
    let h = Harness::new(
        vec![Ok(String::new())],
        vec![Ok(String::new())],
        vec![Ok("{\"Explanation\": \"two pointers\", \"Code\": \"def f(): pass\"}".into())],
    );
    let body = json!({ "problemInfo": "Reverse a string in place", "language": "python" });
    let (status, _, value) = send(h.router(), post_json("/api/generate", &body)).await;

    assert_eq!(status, StatusCode::OK);
    assert!(value["code"].as_str().unwrap().contains("two pointers"));
    assert_eq!(h.generator.calls(), 1);
}

#[tokio::test]
async fn test_generate_accepts_structured_problem() {
    let h = Harness::new(
        vec![Ok(String::new())],
        vec![Ok(String::new())],
        vec![Ok("solution".into())],
    );
    let body = json!({
        "problemInfo": {
            "title": "Two Sum",
            "problem": "Find indices",
            "code": "def two_sum(nums, target):"
        }
    });
    let (status, _, value) = send(h.router(), post_json("/api/generate", &body)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(value["code"], "solution");
}

#[tokio::test]
async fn test_generate_blank_problem_is_400() {
    let h = Harness::new(vec![Ok(String::new())], vec![Ok(String::new())], vec![Ok("x".into())]);
    for body in [json!({}), json!({ "problemInfo": "" }), json!({ "problemInfo": "  \n\t" })] {
        let (status, _, value) = send(h.router(), post_json("/api/generate", &body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "body: {body}");
        assert_eq!(value["message"], "problemInfo must be a non-empty string.");
    }
    assert_eq!(h.generator.calls(), 0);
}

#[tokio::test]
async fn test_generate_rate_limit_exhaustion_returns_generic_message() {
    let h = Harness::new(
        vec![Ok(String::new())],
        vec![Ok(String::new())],
        vec![Err(StageError::rate_limited("generation", "429 Too Many Requests"))],
    );
    let body = json!({ "problemInfo": "Merge intervals" });
    let (status, headers, value) = send(h.router(), post_json("/api/generate", &body)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        value["code"],
        "Unable to generate a solution due to API rate limits. Please try again later."
    );
    assert_eq!(headers["x-assist-completion"], "degraded:rate_limited");
    assert_eq!(h.generator.calls(), 3);
}

#[tokio::test]
async fn test_generate_network_exhaustion_is_503() {
    let h = Harness::new(
        vec![Ok(String::new())],
        vec![Ok(String::new())],
        vec![Err(StageError::network("generation", "connection refused"))],
    );
    let body = json!({ "problemInfo": "Merge intervals" });
    let (status, _, value) = send(h.router(), post_json("/api/generate", &body)).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(value["error_type"], "ServiceUnavailable");
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let h = Harness::new(vec![Ok(String::new())], vec![Ok(String::new())], vec![Ok(String::new())]);
    let response = h
        .router()
        .oneshot(Request::builder().uri("/api/unknown").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
