//! Error types and handling for the gateway.
//!
//! This module provides a unified error type [`AppError`] that wraps various
//! error sources and converts them into Claude-style error responses, since
//! every client of this gateway speaks the Claude Messages API.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use serde_json::json;
use thiserror::Error;

use crate::transformer::error::claude_error_body;

/// Main error type for the application.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors (file not found, parse errors, etc.)
    #[error("Configuration error: {0}")]
    Config(#[from] anyhow::Error),

    /// HTTP request errors from the reqwest client
    #[error("Upstream request error: {0}")]
    Request(#[from] reqwest::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Authentication/authorization failures
    #[error("Unauthorized")]
    Unauthorized,

    /// Malformed client input (bad request body, missing model, etc.)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Upstream signalled a rate limit (HTTP 429 or an in-body 429).
    ///
    /// This is the failover signal: the caller is expected to retry the
    /// request against the next account instead of answering the client.
    #[error("Upstream rate limited (status {status})")]
    UpstreamRateLimited { status: u16, body: Bytes },

    /// Generic internal server errors with custom message
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            // The failover signal normally never reaches the client; if it
            // does (single-account deployments), translate the upstream body.
            AppError::UpstreamRateLimited { status, body } => {
                let status =
                    StatusCode::from_u16(status).unwrap_or(StatusCode::TOO_MANY_REQUESTS);
                let translated = claude_error_body(&body, status.as_u16());
                return (
                    status,
                    [(header::CONTENT_TYPE, "application/json")],
                    translated,
                )
                    .into_response();
            }
            AppError::Config(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "api_error",
                e.to_string(),
            ),
            AppError::Request(e) => {
                if e.is_timeout() {
                    (
                        StatusCode::GATEWAY_TIMEOUT,
                        "api_error",
                        "Gateway timeout".to_string(),
                    )
                } else {
                    (StatusCode::BAD_GATEWAY, "api_error", e.to_string())
                }
            }
            AppError::Serialization(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "api_error",
                e.to_string(),
            ),
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "authentication_error",
                "Unauthorized".to_string(),
            ),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "invalid_request_error", msg)
            }
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "api_error", msg),
        };

        let body = Json(json!({
            "type": "error",
            "error": {
                "type": error_type,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}

/// Convenience type alias for Results using [`AppError`].
pub type Result<T> = std::result::Result<T, AppError>;
