//! Upstream error envelope to Claude error envelope conversion.

use crate::api::chat_models::ChatErrorResponse;
use crate::api::claude_models::ClaudeErrorResponse;
use serde_json::Value;

/// Translate an upstream error body into a Claude error body.
///
/// Bodies that do not parse as an OpenAI-style error envelope are returned
/// unchanged.
pub fn claude_error_body(body: &[u8], status_code: u16) -> Vec<u8> {
    let parsed: ChatErrorResponse = match serde_json::from_slice(body) {
        Ok(parsed) => parsed,
        Err(_) => return body.to_vec(),
    };
    let Some(detail) = parsed.error else {
        return body.to_vec();
    };

    let claude_error = ClaudeErrorResponse::new(error_type_for_status(status_code), detail.message);
    serde_json::to_vec(&claude_error).unwrap_or_else(|_| body.to_vec())
}

/// Map an HTTP status to a Claude error type.
pub fn error_type_for_status(status_code: u16) -> &'static str {
    match status_code {
        400 => "invalid_request_error",
        401 => "authentication_error",
        403 => "permission_error",
        404 => "not_found_error",
        429 => "rate_limit_error",
        code if code >= 500 => "api_error",
        _ => "api_error",
    }
}

/// Cheap check for whether a body is plausibly an OpenAI-style error.
///
/// Used on HTTP 200 responses, where some upstreams wrap errors in a
/// success status.
pub fn looks_like_chat_error(body: &[u8]) -> bool {
    let text = String::from_utf8_lossy(body);
    text.contains("\"error\"") && text.contains("\"message\"")
}

/// Extract the wrapped status code from an HTTP-200 error envelope.
///
/// Only numeric `code` values count; the field is documented as "string or
/// integer" but string codes fall through to the 502 default.
pub fn wrapped_error_status(body: &[u8]) -> Option<u16> {
    let parsed: ChatErrorResponse = serde_json::from_slice(body).ok()?;
    let detail = parsed.error?;

    let status = match detail.code {
        Some(Value::Number(code)) => code.as_f64().map(|c| c as u16).unwrap_or(502),
        _ => 502,
    };
    Some(status)
}

// ============================================================================
// Tests
// ============================================================================
