//! Protocol conversion between the Claude Messages API and Chat Completions.
//!
//! Four converters cover the whole surface:
//!
//! - [`request`]: Claude request -> Chat Completions request
//! - [`response`]: Chat Completions response -> Claude response
//! - [`stream`]: Chat Completions SSE stream -> Claude SSE stream
//! - [`error`]: Chat Completions error envelope -> Claude error envelope
//!
//! ```text
//! Client (Claude)                      Upstream (Chat Completions)
//!     request  ── [request] ──────────────▶ POST /chat/completions
//!     response ◀─ [response] ───────────── JSON body
//!     events   ◀─ [stream] ──────────────── data: lines
//!     errors   ◀─ [error] ───────────────── error envelope
//! ```

pub mod error;
pub mod request;
pub mod response;
pub mod stream;

pub use request::{build_chat_request, chat_request_bytes};
pub use response::build_claude_response;
pub use stream::StreamProcessor;
