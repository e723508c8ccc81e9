//! HTTP error mapping for engine failures.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use quarry_engine::EngineError;
use serde_json::json;

/// An error ready to leave the process as an HTTP response.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub kind: &'static str,
    pub message: String,
}

impl ApiError {
    /// Map an engine error to its HTTP shape.
    ///
    /// `ExecutionFailure` detail is hidden behind a generic message unless
    /// error disclosure is enabled; the full detail is logged by the caller
    /// before mapping.
    pub fn from_engine(err: EngineError, disclose: bool) -> Self {
        let status = match &err {
            EngineError::NotAccessible(_) => StatusCode::NOT_FOUND,
            EngineError::Forbidden(_) => StatusCode::FORBIDDEN,
            EngineError::ExecutionFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        };
        let message = if err.is_client_error() || disclose {
            err.to_string()
        } else {
            "internal error while executing the statement".to_string()
        };
        Self {
            status,
            kind: err.kind(),
            message,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            kind: "bad_request",
            message: message.into(),
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::FORBIDDEN,
            kind: "forbidden",
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            kind: "internal",
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "kind": self.kind,
        }));
        (self.status, body).into_response()
    }
}
