//! Claude request to Chat Completions request conversion.
//!
//! The awkward part of this direction is fan-out: one Claude message can
//! carry text, images and tool results in a single content-block list, while
//! Chat Completions wants tool results as separate `role:"tool"` messages.
//! Block order is preserved throughout.

use crate::api::chat_models::{
    ChatMessage, ChatRequest, ChatTool, FunctionCall, FunctionDef, ReasoningConfig,
    StreamOptions, ThinkingPayload, ToolCall,
};
use crate::api::claude_models::{
    constants, ClaudeContentBlock, ClaudeMessage, ClaudeMessageContent, ClaudeMessagesRequest,
    ClaudeSystemPrompt, ClaudeThinkingConfig, ClaudeTool,
};
use crate::core::Result;
use serde_json::{json, Value};

/// Tool types that have no Chat Completions analogue and are dropped.
const SKIPPED_TOOL_TYPES: [&str; 2] = ["web_search", "web_search_20250305"];

/// Convert a Claude Messages request into a Chat Completions request.
///
/// The request's `model` field is used verbatim; model mapping happens in
/// the gateway before this function runs.
pub fn build_chat_request(claude_request: &ClaudeMessagesRequest) -> ChatRequest {
    let mut messages: Vec<ChatMessage> = Vec::new();

    if let Some(ref system) = claude_request.system {
        if let Some(system_message) = build_system_message(system) {
            messages.push(system_message);
        }
    }

    for message in &claude_request.messages {
        messages.extend(convert_message(message));
    }

    ChatRequest {
        model: claude_request.model.clone(),
        messages,
        max_tokens: Some(claude_request.max_tokens),
        temperature: claude_request.temperature,
        top_p: claude_request.top_p,
        stream: claude_request.stream,
        tools: convert_tools(claude_request.tools.as_deref()),
        tool_choice: claude_request
            .tool_choice
            .as_ref()
            .and_then(convert_tool_choice),
        // Streaming needs include_usage so the terminal chunk carries usage
        stream_options: claude_request
            .stream
            .then_some(StreamOptions { include_usage: true }),
        reasoning: claude_request
            .thinking
            .as_ref()
            .and_then(reasoning_config),
    }
}

/// Serialize the converted request to the upstream body bytes.
pub fn chat_request_bytes(claude_request: &ClaudeMessagesRequest) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(&build_chat_request(claude_request))?)
}

/// Build the system message, if the system prompt yields one.
fn build_system_message(system: &ClaudeSystemPrompt) -> Option<ChatMessage> {
    let text = match system {
        ClaudeSystemPrompt::Text(text) => {
            if text.trim().is_empty() {
                return None;
            }
            text.clone()
        }
        ClaudeSystemPrompt::Blocks(blocks) => {
            let texts: Vec<&str> = blocks
                .iter()
                .filter(|b| b.block_type == "text" && !b.text.trim().is_empty())
                .map(|b| b.text.as_str())
                .collect();
            if texts.is_empty() {
                return None;
            }
            texts.join("\n\n")
        }
        // Unrecognized shapes yield no system message
        ClaudeSystemPrompt::Other(_) => return None,
    };

    Some(ChatMessage {
        role: constants::ROLE_SYSTEM.to_string(),
        content: Some(Value::String(text)),
        ..Default::default()
    })
}

/// Convert one Claude message; a single message may fan out into several.
fn convert_message(message: &ClaudeMessage) -> Vec<ChatMessage> {
    match &message.content {
        ClaudeMessageContent::Text(text) => vec![ChatMessage {
            role: message.role.clone(),
            content: Some(Value::String(text.clone())),
            ..Default::default()
        }],
        ClaudeMessageContent::Blocks(blocks) => {
            if message.role == constants::ROLE_ASSISTANT {
                vec![convert_assistant_blocks(blocks)]
            } else {
                convert_user_blocks(&message.role, blocks)
            }
        }
    }
}

/// Convert user-role content blocks.
///
/// Text and image blocks accumulate into a parts buffer; each tool_result
/// flushes the buffer and then emits its own `role:"tool"` message, so the
/// relative order of blocks survives the fan-out.
fn convert_user_blocks(role: &str, blocks: &[ClaudeContentBlock]) -> Vec<ChatMessage> {
    let mut messages: Vec<ChatMessage> = Vec::new();
    let mut parts: Vec<Value> = Vec::new();

    for block in blocks {
        match block {
            ClaudeContentBlock::Text { text } => {
                parts.push(json!({"type": "text", "text": text}));
            }
            ClaudeContentBlock::Image { source } => {
                if source.source_type == "base64" {
                    let data_url =
                        format!("data:{};base64,{}", source.media_type, source.data);
                    parts.push(json!({"type": "image_url", "image_url": {"url": data_url}}));
                }
            }
            ClaudeContentBlock::ToolResult {
                tool_use_id,
                content,
                is_error,
            } => {
                if !parts.is_empty() {
                    messages.push(ChatMessage {
                        role: role.to_string(),
                        content: Some(Value::Array(std::mem::take(&mut parts))),
                        ..Default::default()
                    });
                }
                messages.push(ChatMessage {
                    role: constants::ROLE_TOOL.to_string(),
                    content: Some(Value::String(extract_tool_result_text(
                        content, *is_error,
                    ))),
                    tool_call_id: Some(tool_use_id.clone()),
                    ..Default::default()
                });
            }
            // Thinking blocks in user turns carry nothing the upstream wants
            ClaudeContentBlock::Thinking { .. } => {}
            _ => {}
        }
    }

    if !parts.is_empty() {
        // A lone text part collapses to a plain string
        let content = if parts.len() == 1 && parts[0]["type"] == "text" {
            parts[0]["text"].clone()
        } else {
            Value::Array(parts)
        };
        messages.push(ChatMessage {
            role: role.to_string(),
            content: Some(content),
            ..Default::default()
        });
    }

    messages
}

/// Convert assistant-role content blocks into one combined message.
fn convert_assistant_blocks(blocks: &[ClaudeContentBlock]) -> ChatMessage {
    let mut text_parts: Vec<&str> = Vec::new();
    let mut tool_calls: Vec<ToolCall> = Vec::new();
    let mut thinking_parts: Vec<&str> = Vec::new();
    let mut last_signature = String::new();

    for block in blocks {
        match block {
            ClaudeContentBlock::Text { text } => text_parts.push(text),
            ClaudeContentBlock::ToolUse { id, name, input } => {
                let arguments = serde_json::to_string(input)
                    .unwrap_or_else(|_| "{}".to_string());
                tool_calls.push(ToolCall {
                    index: None,
                    id: id.clone(),
                    call_type: "function".to_string(),
                    function: FunctionCall {
                        name: name.clone(),
                        arguments,
                    },
                });
            }
            ClaudeContentBlock::Thinking {
                thinking,
                signature,
            } => {
                if !thinking.is_empty() {
                    thinking_parts.push(thinking);
                }
                if !signature.is_empty() {
                    last_signature = signature.clone();
                }
            }
            _ => {}
        }
    }

    let mut message = ChatMessage {
        role: constants::ROLE_ASSISTANT.to_string(),
        ..Default::default()
    };

    // Replay prior thinking along with its signature
    if !thinking_parts.is_empty() {
        message.thinking = Some(ThinkingPayload {
            content: thinking_parts.join("\n"),
            signature: last_signature,
        });
    }

    if !text_parts.is_empty() {
        message.content = Some(Value::String(text_parts.concat()));
    }

    if !tool_calls.is_empty() {
        message.tool_calls = Some(tool_calls);
    }

    message
}

/// Extract a plain-text rendering of a tool_result `content` field.
pub fn extract_tool_result_text(content: &Value, is_error: bool) -> String {
    let fallback = || {
        if is_error {
            "Tool execution failed.".to_string()
        } else {
            "Command executed successfully.".to_string()
        }
    };

    match content {
        Value::Null => fallback(),
        Value::String(text) => {
            if text.trim().is_empty() {
                fallback()
            } else {
                text.clone()
            }
        }
        Value::Array(items) => {
            let texts: Vec<&str> = items
                .iter()
                .filter_map(|item| item.get("text").and_then(Value::as_str))
                .collect();
            let joined = texts.join("\n");
            if !joined.trim().is_empty() {
                joined
            } else {
                content.to_string()
            }
        }
        other => other.to_string(),
    }
}

/// Convert Claude tool definitions to Chat Completions tools.
fn convert_tools(claude_tools: Option<&[ClaudeTool]>) -> Option<Vec<ChatTool>> {
    let claude_tools = claude_tools?;

    let tools: Vec<ChatTool> = claude_tools
        .iter()
        .filter_map(convert_tool)
        .collect();

    if tools.is_empty() {
        None
    } else {
        Some(tools)
    }
}

fn convert_tool(tool: &ClaudeTool) -> Option<ChatTool> {
    let name = tool.name.trim();
    if name.is_empty() {
        return None;
    }

    let tool_type = tool.tool_type.as_deref().unwrap_or("");
    if SKIPPED_TOOL_TYPES.contains(&tool_type) {
        return None;
    }

    // "custom" tools carry their schema one level down
    let (description, input_schema) = match (&tool.tool_type, &tool.custom) {
        (Some(t), Some(custom)) if t == "custom" => {
            (custom.description.clone(), custom.input_schema.clone())
        }
        _ => (tool.description.clone(), tool.input_schema.clone()),
    };

    let parameters = input_schema
        .unwrap_or_else(|| json!({"type": "object", "properties": {}}));

    Some(ChatTool {
        tool_type: "function".to_string(),
        function: FunctionDef {
            name: name.to_string(),
            description: description.unwrap_or_default(),
            parameters,
        },
    })
}

/// Map a Claude tool_choice directive to the Chat Completions form.
///
/// Claude: {"type":"auto"} / {"type":"any"} / {"type":"none"} /
/// {"type":"tool","name":X}. Claude "any" means the model must invoke some
/// tool, which is Chat Completions "required".
fn convert_tool_choice(tool_choice: &Value) -> Option<Value> {
    let choice_type = tool_choice.get("type").and_then(Value::as_str)?;

    match choice_type {
        "auto" => Some(json!("auto")),
        "any" => Some(json!("required")),
        "none" => Some(json!("none")),
        "tool" => {
            let name = tool_choice
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or("");
            Some(json!({"type": "function", "function": {"name": name}}))
        }
        _ => None,
    }
}

/// Derive the reasoning effort bucket from a thinking directive.
fn reasoning_config(thinking: &ClaudeThinkingConfig) -> Option<ReasoningConfig> {
    if thinking.config_type != "enabled" && thinking.config_type != "adaptive" {
        return None;
    }

    let budget = thinking.budget_tokens.unwrap_or(0);
    let effort = if budget > 0 && budget <= 4096 {
        "low"
    } else if budget > 4096 && budget <= 16384 {
        "medium"
    } else {
        "high"
    };

    Some(ReasoningConfig {
        effort: effort.to_string(),
    })
}

// ============================================================================
// Tests
// ============================================================================
