//! Mapping of library errors onto HTTP responses.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use super::types::ErrorResponse;
use crate::error::AssistError;

/// An error ready to be rendered as a JSON response.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorResponse,
}

impl ApiError {
    fn new(status: StatusCode, error_type: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorResponse {
                error_type: error_type.to_string(),
                message: message.into(),
                status_code: status.as_u16(),
            },
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "ValidationError", message)
    }
}

impl From<AssistError> for ApiError {
    fn from(err: AssistError) -> Self {
        let message = err.to_string();
        match err {
            AssistError::InvalidRequest(msg) => Self::validation(msg),
            AssistError::ServiceUnavailable { .. } => {
                Self::new(StatusCode::SERVICE_UNAVAILABLE, "ServiceUnavailable", message)
            }
            AssistError::Upstream { .. } => {
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "UpstreamError", message)
            }
            AssistError::ProviderNotConfigured { .. } | AssistError::InvalidConfig(_) => {
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "ConfigurationError", message)
            }
            AssistError::Internal(_) => {
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "InternalError", message)
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        // Oversized bodies keep their 413; every other body problem is a 400.
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            return Self::new(
                StatusCode::PAYLOAD_TOO_LARGE,
                "PayloadTooLarge",
                rejection.body_text(),
            );
        }
        Self::validation(format!("Invalid JSON body: {}", rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!("{} {}", self.status, self.body.message);
        } else {
            tracing::debug!("{} {}", self.status, self.body.message);
        }
        (self.status, Json(self.body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_request_is_400() {
        let e = ApiError::from(AssistError::invalid_request("imageDataList cannot be empty."));
        assert_eq!(e.status, StatusCode::BAD_REQUEST);
        assert_eq!(e.body.message, "imageDataList cannot be empty.");
        assert_eq!(e.body.status_code, 400);
    }

    #[test]
    fn exhausted_network_is_503() {
        let e = ApiError::from(AssistError::ServiceUnavailable {
            attempts: 5,
            detail: "reset".into(),
        });
        assert_eq!(e.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(e.body.error_type, "ServiceUnavailable");
    }

    #[test]
    fn upstream_is_500() {
        let e = ApiError::from(AssistError::Upstream {
            stage: "ocr",
            detail: "401".into(),
        });
        assert_eq!(e.status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
