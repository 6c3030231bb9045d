//! The gateway loop: one Claude request in, one upstream round trip, one
//! Claude response out.
//!
//! Failover is signalled, not handled, here: an upstream 429 (or an HTTP-200
//! body wrapping a 429) aborts with [`AppError::UpstreamRateLimited`] before
//! anything is written to the client, so the caller can retry the request
//! against the next account.

use crate::api::claude_models::{ClaudeMessagesRequest, ClaudeUsage};
use crate::api::AppState;
use crate::core::{AccountConfig, AppError, GatewayConfig, Result};
use crate::gateway::disconnect::{ClientWatch, WatchedBody};
use crate::transformer::error::{claude_error_body, looks_like_chat_error, wrapped_error_status};
use crate::transformer::request::chat_request_bytes;
use crate::transformer::response::build_claude_response;
use crate::transformer::StreamProcessor;
use axum::{
    body::Body,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use futures::StreamExt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Cap on how much of an upstream error body is read.
const MAX_ERROR_BODY: usize = 2 * 1024 * 1024;

/// Bound on the upstream line channel between the reader and the transducer.
const LINE_CHANNEL_CAPACITY: usize = 16;

/// Forward one Claude request to an upstream account.
///
/// Returns the client-ready response, or [`AppError::UpstreamRateLimited`]
/// when the caller should fail over to another account.
pub async fn forward(
    state: &AppState,
    account: &AccountConfig,
    claude_request: &ClaudeMessagesRequest,
) -> Result<Response> {
    let start = Instant::now();

    let base_url = account.base_url.trim();
    let api_key = account.api_key.trim();
    if base_url.is_empty() || api_key.is_empty() {
        return Err(AppError::BadRequest(format!(
            "account {} missing base_url or api_key",
            account.name
        )));
    }
    let url = format!("{}/chat/completions", base_url.trim_end_matches('/'));

    let original_model = claude_request.model.clone();
    if original_model.trim().is_empty() {
        return Err(AppError::BadRequest("missing model".to_string()));
    }

    // The mapped model goes upstream and into the logs; the original model
    // is echoed in every response the client sees. Both stay live for the
    // whole request.
    let mapped_model = account.mapped_model(&original_model);
    let billing_model = mapped_model.clone();

    let mut upstream_request = claude_request.clone();
    upstream_request.model = mapped_model;
    let upstream_body = chat_request_bytes(&upstream_request)?;

    let response = state.upstream.dispatch(&url, upstream_body, account).await?;
    let status = response.status();

    tracing::debug!(
        account = %account.name,
        url = %url,
        status = %status,
        "upstream request completed"
    );

    if status == StatusCode::TOO_MANY_REQUESTS {
        let body = read_body_limited(response, MAX_ERROR_BODY).await?;
        return Err(AppError::UpstreamRateLimited {
            status: status.as_u16(),
            body,
        });
    }

    if status.is_client_error() || status.is_server_error() {
        let body = read_body_limited(response, MAX_ERROR_BODY).await?;
        let translated = claude_error_body(&body, status.as_u16());
        return Ok((
            status,
            [(header::CONTENT_TYPE, "application/json")],
            translated,
        )
            .into_response());
    }

    if claude_request.stream {
        return Ok(stream_response(
            response,
            original_model,
            billing_model,
            account.name.clone(),
            state.config.gateway.clone(),
            start,
        ));
    }

    unary_response(response, &original_model, &billing_model, &account.name, start).await
}

/// Handle a 200 non-streaming upstream response.
async fn unary_response(
    response: reqwest::Response,
    original_model: &str,
    billing_model: &str,
    account_name: &str,
    start: Instant,
) -> Result<Response> {
    let upstream_content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/json")
        .to_string();
    let body = response.bytes().await?;

    // Some upstreams wrap errors in an HTTP 200, with the real status inside
    // the JSON body.
    if looks_like_chat_error(&body) {
        if let Some(wrapped_status) = wrapped_error_status(&body) {
            if wrapped_status == StatusCode::TOO_MANY_REQUESTS.as_u16() {
                return Err(AppError::UpstreamRateLimited {
                    status: wrapped_status,
                    body,
                });
            }
            let translated = claude_error_body(&body, wrapped_status);
            let status = StatusCode::from_u16(wrapped_status)
                .unwrap_or(StatusCode::BAD_GATEWAY);
            return Ok((
                status,
                [(header::CONTENT_TYPE, "application/json")],
                translated,
            )
                .into_response());
        }
    }

    match build_claude_response(&body, original_model) {
        Ok((claude_response, usage)) => {
            tracing::info!(
                model = %billing_model,
                account = %account_name,
                duration_ms = start.elapsed().as_millis() as i64,
                input_tokens = usage.input_tokens,
                output_tokens = usage.output_tokens,
                cache_read_input_tokens = usage.cache_read_input_tokens,
                "request completed"
            );
            let body = serde_json::to_vec(&claude_response)?;
            Ok((
                StatusCode::OK,
                [(header::CONTENT_TYPE, "application/json")],
                body,
            )
                .into_response())
        }
        Err(e) => {
            // Pass the original body through rather than fail the request
            tracing::warn!(
                account = %account_name,
                error = %e,
                "response transform failed, passing upstream body through"
            );
            Ok((
                StatusCode::OK,
                [(header::CONTENT_TYPE, upstream_content_type)],
                body,
            )
                .into_response())
        }
    }
}

/// Handle a 200 streaming upstream response.
///
/// Two tasks cooperate per stream: a reader that splits the upstream body
/// into lines on a bounded channel, and the transducer loop that turns those
/// lines into Claude events. A watchdog interval bounds how long the loop
/// waits for upstream data; a disconnected client stops writes but the
/// upstream keeps draining so the final usage is still collected.
fn stream_response(
    response: reqwest::Response,
    original_model: String,
    billing_model: String,
    account_name: String,
    gateway_config: GatewayConfig,
    start: Instant,
) -> Response {
    let epoch = Instant::now();
    let last_read = Arc::new(AtomicI64::new(0));

    let (line_tx, line_rx) = mpsc::channel(LINE_CHANNEL_CAPACITY);
    tokio::spawn(read_upstream_lines(
        response,
        line_tx,
        Arc::clone(&last_read),
        epoch,
        gateway_config.max_line_size,
    ));

    let stream_interval = (gateway_config.stream_data_interval_timeout > 0)
        .then(|| Duration::from_secs(gateway_config.stream_data_interval_timeout as u64));

    let client_watch = ClientWatch::new();
    let (event_tx, event_rx) = mpsc::channel::<std::result::Result<Bytes, std::io::Error>>(16);

    tokio::spawn(transduce_stream(TransduceContext {
        line_rx,
        event_tx,
        processor: StreamProcessor::new(original_model),
        client_watch: client_watch.clone(),
        stream_interval,
        last_read,
        epoch,
        start,
        billing_model,
        account_name,
    }));

    let event_stream = Box::pin(futures::stream::unfold(event_rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    }));
    let body = Body::from_stream(WatchedBody::new(event_stream, client_watch));

    (
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
            (header::HeaderName::from_static("x-accel-buffering"), "no"),
        ],
        body,
    )
        .into_response()
}

/// Read the upstream body, splitting it into lines for the transducer.
///
/// Updates the shared last-read timestamp on every chunk so the watchdog can
/// measure upstream idle time.
async fn read_upstream_lines(
    response: reqwest::Response,
    line_tx: mpsc::Sender<std::io::Result<String>>,
    last_read: Arc<AtomicI64>,
    epoch: Instant,
    max_line_size: usize,
) {
    let mut upstream = response.bytes_stream();
    let mut buffer: Vec<u8> = Vec::new();

    while let Some(chunk) = upstream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                let _ = line_tx
                    .send(Err(std::io::Error::other(e.to_string())))
                    .await;
                return;
            }
        };

        last_read.store(epoch.elapsed().as_nanos() as i64, Ordering::Relaxed);
        buffer.extend_from_slice(&chunk);

        while let Some(newline) = buffer.iter().position(|&b| b == b'\n') {
            let mut line_bytes: Vec<u8> = buffer.drain(..=newline).collect();
            line_bytes.pop();
            if line_bytes.last() == Some(&b'\r') {
                line_bytes.pop();
            }
            let line = String::from_utf8_lossy(&line_bytes).into_owned();
            if line_tx.send(Ok(line)).await.is_err() {
                return;
            }
        }

        if buffer.len() > max_line_size {
            let _ = line_tx
                .send(Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "upstream line exceeds maximum size",
                )))
                .await;
            return;
        }
    }

    if !buffer.is_empty() {
        let line = String::from_utf8_lossy(&buffer).into_owned();
        let _ = line_tx.send(Ok(line)).await;
    }
}

struct TransduceContext {
    line_rx: mpsc::Receiver<std::io::Result<String>>,
    event_tx: mpsc::Sender<std::result::Result<Bytes, std::io::Error>>,
    processor: StreamProcessor,
    client_watch: ClientWatch,
    stream_interval: Option<Duration>,
    last_read: Arc<AtomicI64>,
    epoch: Instant,
    start: Instant,
    billing_model: String,
    account_name: String,
}

/// The main transduction loop for one streaming request.
async fn transduce_stream(ctx: TransduceContext) {
    let TransduceContext {
        mut line_rx,
        event_tx,
        mut processor,
        client_watch,
        stream_interval,
        last_read,
        epoch,
        start,
        billing_model,
        account_name,
    } = ctx;

    let mut ticker = stream_interval.map(tokio::time::interval);

    let mut first_event_ms: Option<i64> = None;
    let mut client_disconnected = false;
    let mut idle_timeout = false;

    loop {
        tokio::select! {
            received = line_rx.recv() => match received {
                Some(Ok(line)) => {
                    if first_event_ms.is_none() && !line.is_empty() {
                        first_event_ms = Some(start.elapsed().as_millis() as i64);
                    }
                    let events = processor.process_line(&line);
                    if !events.is_empty() && !client_disconnected {
                        if event_tx.send(Ok(Bytes::from(events))).await.is_err() {
                            // Client is gone; keep draining for usage accounting
                            client_disconnected = true;
                        }
                    }
                }
                Some(Err(e)) => {
                    tracing::warn!(account = %account_name, error = %e, "stream read error");
                    break;
                }
                None => break,
            },
            _ = watchdog_tick(ticker.as_mut()), if ticker.is_some() => {
                let Some(interval) = stream_interval else { continue };
                let gap = epoch.elapsed().as_nanos() as i64
                    - last_read.load(Ordering::Relaxed);
                if gap < interval.as_nanos() as i64 {
                    continue;
                }
                if client_disconnected || client_watch.is_disconnected() {
                    client_disconnected = true;
                    tracing::debug!(
                        account = %account_name,
                        "upstream idle after client disconnect, closing with collected usage"
                    );
                } else {
                    idle_timeout = true;
                    tracing::warn!(account = %account_name, "stream data interval timeout");
                }
                break;
            }
            _ = client_watch.disconnected(), if !client_disconnected => {
                // Writes stop, upstream draining continues
                client_disconnected = true;
            }
        }
    }

    // Synthetic terminal flush keeps the client's event state machine
    // well-formed even when the upstream never finished.
    let (final_events, usage) = processor.finish();
    if !final_events.is_empty() && !client_disconnected {
        let _ = event_tx.send(Ok(Bytes::from(final_events))).await;
    }
    client_watch.mark_drained();

    log_stream_stats(StreamStats {
        billing_model,
        account_name,
        duration_ms: start.elapsed().as_millis() as i64,
        first_event_ms,
        client_disconnected,
        idle_timeout,
        usage,
    });
}

async fn watchdog_tick(ticker: Option<&mut tokio::time::Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

/// Final accounting for one streaming request.
struct StreamStats {
    billing_model: String,
    account_name: String,
    duration_ms: i64,
    first_event_ms: Option<i64>,
    client_disconnected: bool,
    idle_timeout: bool,
    usage: ClaudeUsage,
}

fn log_stream_stats(stats: StreamStats) {
    tracing::info!(
        model = %stats.billing_model,
        account = %stats.account_name,
        duration_ms = stats.duration_ms,
        first_event_ms = stats.first_event_ms,
        client_disconnect = stats.client_disconnected,
        idle_timeout = stats.idle_timeout,
        input_tokens = stats.usage.input_tokens,
        output_tokens = stats.usage.output_tokens,
        cache_read_input_tokens = stats.usage.cache_read_input_tokens,
        "stream completed"
    );
}

/// Read at most `limit` bytes of a response body.
async fn read_body_limited(response: reqwest::Response, limit: usize) -> Result<Bytes> {
    let mut body: Vec<u8> = Vec::new();
    let mut upstream = response.bytes_stream();

    while let Some(chunk) = upstream.next().await {
        let chunk = chunk?;
        if body.len() + chunk.len() >= limit {
            body.extend_from_slice(&chunk[..limit - body.len()]);
            break;
        }
        body.extend_from_slice(&chunk);
    }

    Ok(Bytes::from(body))
}
