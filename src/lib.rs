//! Claude Compat Gateway - a protocol-translating proxy for LLM APIs
//!
//! This library accepts requests in the Claude Messages API format and
//! forwards them to any OpenAI-compatible Chat Completions upstream
//! (OpenRouter, LiteLLM, One API, vLLM, ...), translating requests,
//! responses and streaming events in both directions. Features include:
//!
//! - **Full content-block translation**: text, images, tool use/results and
//!   extended thinking (with signature synthesis for upstreams that return
//!   none)
//! - **Streaming transduction**: upstream SSE chunks become well-formed
//!   Claude lifecycle events, with a watchdog for stalled upstreams
//! - **Account failover**: upstream rate limits move the request to the
//!   next configured account before anything reaches the client
//! - **Model mapping**: per-account model name translation, with the
//!   client's original model echoed back in every response
//!
//! # Architecture
//!
//! The codebase is organized into four layers:
//!
//! - [`core`]: configuration and errors
//! - [`api`]: wire models, HTTP handlers and the upstream dispatcher
//! - [`transformer`]: the four protocol converters
//! - [`gateway`]: the per-request forwarding loop

pub mod api;
pub mod core;
pub mod gateway;
pub mod transformer;

// Re-export commonly used types for convenience
pub use api::AppState;
pub use core::{AppConfig, AppError, Result};
