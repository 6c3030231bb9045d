//! Chat Completions response to Claude response conversion.

use crate::api::chat_models::{ChatResponse, ChatUsage};
use crate::api::claude_models::{constants, ClaudeContentBlock, ClaudeResponse, ClaudeUsage};
use crate::core::Result;
use rand::Rng;
use serde_json::{json, Value};

/// Convert a non-streaming Chat Completions body into a Claude response.
///
/// `original_model` is the model string the client sent; it is echoed in the
/// response no matter what the upstream was actually asked for.
pub fn build_claude_response(
    body: &[u8],
    original_model: &str,
) -> Result<(ClaudeResponse, ClaudeUsage)> {
    let response: ChatResponse = serde_json::from_slice(body)?;

    let mut content: Vec<ClaudeContentBlock> = Vec::new();
    let mut has_tool_use = false;

    if let Some(choice) = response.choices.first() {
        let message = &choice.message;

        // Reasoning can arrive under three different field names; the
        // thinking object is the only one that can carry a signature.
        let mut signature = String::new();
        let mut reasoning = message.reasoning.clone().unwrap_or_default();
        if reasoning.is_empty() {
            reasoning = message.reasoning_content.clone().unwrap_or_default();
        }
        if let Some(thinking) = &message.thinking {
            if !thinking.content.is_empty() {
                reasoning = thinking.content.clone();
                signature = thinking.signature.clone();
            }
        }
        if !reasoning.is_empty() {
            if signature.is_empty() {
                signature = synthesize_signature();
            }
            content.push(ClaudeContentBlock::thinking(reasoning, signature));
        }

        let text = message
            .content
            .as_ref()
            .and_then(Value::as_str)
            .unwrap_or("");
        if !text.is_empty() {
            content.push(ClaudeContentBlock::text(text));
        }

        for tool_call in message.tool_calls.as_deref().unwrap_or_default() {
            has_tool_use = true;

            let input = if tool_call.function.arguments.is_empty() {
                json!({})
            } else {
                serde_json::from_str(&tool_call.function.arguments)
                    .unwrap_or_else(|_| json!({}))
            };

            content.push(ClaudeContentBlock::tool_use(
                tool_call.id.clone(),
                tool_call.function.name.clone(),
                input,
            ));
        }
    }

    if content.is_empty() {
        content.push(ClaudeContentBlock::text(""));
    }

    let stop_reason = match response.choices.first() {
        Some(choice) => map_finish_reason(&choice.finish_reason, has_tool_use),
        None => constants::STOP_END_TURN,
    };

    let usage = extract_usage(response.usage.as_ref());

    let claude_response = ClaudeResponse::new(
        message_id(&response.id),
        original_model,
        content,
        stop_reason,
        usage.clone(),
    );

    Ok((claude_response, usage))
}

/// Map an upstream finish_reason to a Claude stop_reason.
pub fn map_finish_reason(finish_reason: &str, has_tool_use: bool) -> &'static str {
    if has_tool_use {
        return constants::STOP_TOOL_USE;
    }
    match finish_reason {
        "stop" => constants::STOP_END_TURN,
        "tool_calls" => constants::STOP_TOOL_USE,
        "length" => constants::STOP_MAX_TOKENS,
        "content_filter" => constants::STOP_END_TURN,
        _ => constants::STOP_END_TURN,
    }
}

/// Derive Claude usage from Chat Completions usage.
///
/// Claude's `input_tokens` excludes cached prompt tokens, so the cached
/// count is subtracted out and reported separately.
pub fn extract_usage(usage: Option<&ChatUsage>) -> ClaudeUsage {
    let Some(usage) = usage else {
        return ClaudeUsage::default();
    };

    let cached_tokens = usage
        .prompt_tokens_details
        .as_ref()
        .map(|d| d.cached_tokens)
        .unwrap_or(0);

    ClaudeUsage {
        input_tokens: (usage.prompt_tokens - cached_tokens).max(0),
        output_tokens: usage.completion_tokens,
        cache_read_input_tokens: cached_tokens,
    }
}

/// Use the upstream response ID when present, otherwise synthesize one.
pub fn message_id(upstream_id: &str) -> String {
    if !upstream_id.is_empty() {
        return upstream_id.to_string();
    }
    format!("msg_{}", random_id())
}

fn random_id() -> String {
    const CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
    let mut rng = rand::thread_rng();
    (0..12)
        .map(|_| CHARS[rng.gen_range(0..CHARS.len())] as char)
        .collect()
}

/// Synthesize a signature for upstreams that do not return one.
///
/// Claude clients require thinking blocks to carry a signature when replaying
/// them across turns; a Unix-millisecond string satisfies the field without
/// pretending to be cryptographic.
pub fn synthesize_signature() -> String {
    chrono::Utc::now().timestamp_millis().to_string()
}

// ============================================================================
// Tests
// ============================================================================
