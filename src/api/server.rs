//! API server setup.

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};

use super::{
    handlers::{extract_handler, generate_handler, health_handler},
    types::{ApiLimits, ApiState},
};
use crate::assist::CodeAssistant;
use crate::error::AssistError;

/// Create the API router with default size limits.
///
/// Public so the routes can be nested into a larger application.
pub fn create_router(assistant: Arc<CodeAssistant>) -> Router {
    create_router_with_limits(assistant, ApiLimits::default())
}

/// Create the API router with custom size limits.
pub fn create_router_with_limits(assistant: Arc<CodeAssistant>, limits: ApiLimits) -> Router {
    let state = ApiState { assistant };

    // The client is a desktop/mobile app talking to a personal backend.
    let cors_layer = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/extract", post(extract_handler))
        .route("/api/generate", post(generate_handler))
        .route("/health", get(health_handler))
        .layer(DefaultBodyLimit::max(limits.max_request_body_bytes))
        .layer(RequestBodyLimitLayer::new(limits.max_request_body_bytes))
        .layer(cors_layer)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `host:port` and serve until Ctrl-C.
///
/// # Errors
/// [`AssistError::Internal`] when the address cannot be bound or the server fails.
pub async fn serve(
    host: &str,
    port: u16,
    assistant: Arc<CodeAssistant>,
    limits: ApiLimits,
) -> Result<(), AssistError> {
    let app = create_router_with_limits(assistant, limits);

    let listener = TcpListener::bind((host, port))
        .await
        .map_err(|e| AssistError::Internal(format!("failed to bind {host}:{port}: {e}")))?;
    let local = listener
        .local_addr()
        .map_err(|e| AssistError::Internal(e.to_string()))?;

    tracing::info!("Backend is running on: http://{}", local);
    tracing::info!(
        "Request body limit: {} MB",
        limits.max_request_body_bytes / (1024 * 1024)
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| AssistError::Internal(format!("server error: {e}")))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
