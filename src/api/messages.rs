//! Claude Messages API endpoint.
//!
//! Accepts Claude-format requests, forwards them through the gateway to the
//! configured upstream accounts and relays the translated response. Accounts
//! are tried in declaration order; a rate-limited account is skipped and the
//! next one gets the request.

use crate::api::claude_models::ClaudeMessagesRequest;
use crate::api::AppState;
use crate::core::{AppError, Result};
use crate::gateway::forward;
use crate::transformer::error::claude_error_body;
use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use std::sync::Arc;

/// Claude Messages API endpoint.
///
/// Supports both streaming and non-streaming modes.
#[tracing::instrument(skip(state, headers, claude_request), fields(request_id = %uuid::Uuid::new_v4().simple()))]
pub async fn create_message(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(claude_request): Json<ClaudeMessagesRequest>,
) -> Result<Response> {
    verify_auth(&headers, &state)?;

    if claude_request.model.trim().is_empty() {
        return Err(AppError::BadRequest("missing model".to_string()));
    }
    if state.config.accounts.is_empty() {
        return Err(AppError::BadRequest(
            "no upstream accounts configured".to_string(),
        ));
    }

    tracing::debug!(
        model = %claude_request.model,
        stream = claude_request.stream,
        "processing Claude request"
    );

    let mut last_rate_limit: Option<(u16, Bytes)> = None;

    for account in &state.config.accounts {
        match forward(&state, account, &claude_request).await {
            Err(AppError::UpstreamRateLimited { status, body }) => {
                tracing::warn!(
                    account = %account.name,
                    status,
                    "upstream rate limited, trying next account"
                );
                last_rate_limit = Some((status, body));
            }
            other => return other,
        }
    }

    // Every account is rate limited; answer with the last upstream body
    let (_, body) = last_rate_limit.unwrap_or((429, Bytes::new()));
    let translated = claude_error_body(&body, StatusCode::TOO_MANY_REQUESTS.as_u16());
    Ok((
        StatusCode::TOO_MANY_REQUESTS,
        [(header::CONTENT_TYPE, "application/json")],
        translated,
    )
        .into_response())
}

/// Check the client's key against the configured master key, if any.
fn verify_auth(headers: &HeaderMap, state: &AppState) -> Result<()> {
    let Some(master_key) = state.config.server.master_api_key.as_deref() else {
        return Ok(());
    };

    let x_api_key = headers.get("x-api-key").and_then(|v| v.to_str().ok());
    if x_api_key == Some(master_key) {
        return Ok(());
    }

    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    if bearer == Some(master_key) {
        return Ok(());
    }

    Err(AppError::Unauthorized)
}
