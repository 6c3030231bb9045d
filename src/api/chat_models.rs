//! OpenAI Chat Completions request and response models.
//!
//! These shapes cover the upstream-facing side of the gateway and work
//! against any Chat Completions-compatible endpoint. Reasoning output is
//! provider-dependent: some upstreams use `reasoning`, some
//! `reasoning_content`, some a `thinking` object carrying a signature, so
//! the message and delta types accept all three.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Request Types
// ============================================================================

/// Chat Completions request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ChatTool>>,
    /// "auto" / "required" / "none" or a {type:"function",...} object
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_options: Option<StreamOptions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<ReasoningConfig>,
}

/// Streaming options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamOptions {
    pub include_usage: bool,
}

/// Reasoning configuration (the Chat Completions face of Claude `thinking`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningConfig {
    pub effort: String,
}

/// Reasoning content with signature, passed through assistant history.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThinkingPayload {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub content: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub signature: String,
}

/// A Chat Completions message.
///
/// `content` stays a raw JSON value: it is a plain string for most messages
/// and an ordered parts array for multimodal user turns.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(default)]
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<ThinkingPayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

/// Tool (function) call carried by an assistant message or a stream delta.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolCall {
    /// Streaming position of this call; absent on non-streaming responses
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<i64>,
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default)]
    pub call_type: String,
    #[serde(default)]
    pub function: FunctionCall,
}

/// Function name and JSON-encoded arguments.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FunctionCall {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub arguments: String,
}

/// Tool definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTool {
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: FunctionDef,
}

/// Function definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDef {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub parameters: Value,
}

// ============================================================================
// Response Types
// ============================================================================

/// Non-streaming Chat Completions response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<ChatUsage>,
}

/// A response choice.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatChoice {
    #[serde(default)]
    pub message: ChatMessage,
    #[serde(default)]
    pub finish_reason: String,
}

/// Token usage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatUsage {
    #[serde(default)]
    pub prompt_tokens: i64,
    #[serde(default)]
    pub completion_tokens: i64,
    #[serde(default)]
    pub total_tokens: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_tokens_details: Option<PromptTokensDetails>,
}

/// Prompt token details.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptTokensDetails {
    #[serde(default)]
    pub cached_tokens: i64,
}

// ============================================================================
// Streaming Types
// ============================================================================

/// A streaming chunk, one per `data:` line.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamChunk {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub choices: Vec<StreamChoice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<ChatUsage>,
}

/// A streaming choice.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamChoice {
    #[serde(default)]
    pub delta: StreamDelta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

/// Incremental delta within a streaming choice.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<ThinkingDelta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
}

/// Streaming reasoning delta with optional signature.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThinkingDelta {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub signature: String,
}

// ============================================================================
// Error Types
// ============================================================================

/// Upstream error envelope.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatErrorResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ChatErrorDetail>,
}

/// Upstream error detail. `code` is documented as "string or integer" so it
/// stays a raw JSON value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatErrorDetail {
    #[serde(default)]
    pub message: String,
    #[serde(rename = "type", default)]
    pub error_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<Value>,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_chat_request_serialization_skips_absent_fields() {
        let request = ChatRequest {
            model: "glm-4.6".to_string(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: Some(json!("hi")),
                ..Default::default()
            }],
            max_tokens: Some(16),
            temperature: None,
            top_p: None,
            stream: false,
            tools: None,
            tool_choice: None,
            stream_options: None,
            reasoning: None,
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["model"], "glm-4.6");
        assert_eq!(value["max_tokens"], 16);
        assert!(value.get("temperature").is_none());
        assert!(value.get("tools").is_none());
        assert!(value.get("stream_options").is_none());
    }

    #[test]
    fn test_stream_chunk_parses_minimal_delta() {
        let chunk: StreamChunk = serde_json::from_str(
            r#"{"id":"c1","choices":[{"delta":{"content":"hi"},"finish_reason":null}]}"#,
        )
        .unwrap();
        assert_eq!(chunk.id, "c1");
        assert_eq!(chunk.choices[0].delta.content.as_deref(), Some("hi"));
        assert!(chunk.choices[0].finish_reason.is_none());
    }

    #[test]
    fn test_stream_chunk_parses_tool_call_delta() {
        let chunk: StreamChunk = serde_json::from_str(
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"t1","function":{"name":"f","arguments":""}}]}}]}"#,
        )
        .unwrap();
        let calls = chunk.choices[0].delta.tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].index, Some(0));
        assert_eq!(calls[0].id, "t1");
        assert_eq!(calls[0].function.name, "f");
    }

    #[test]
    fn test_usage_with_cached_tokens() {
        let usage: ChatUsage = serde_json::from_value(json!({
            "prompt_tokens": 5,
            "completion_tokens": 2,
            "prompt_tokens_details": {"cached_tokens": 1}
        }))
        .unwrap();
        assert_eq!(usage.prompt_tokens, 5);
        assert_eq!(usage.prompt_tokens_details.unwrap().cached_tokens, 1);
    }

    #[test]
    fn test_error_detail_accepts_string_or_int_code() {
        let numeric: ChatErrorResponse =
            serde_json::from_str(r#"{"error":{"message":"m","code":429}}"#).unwrap();
        assert!(numeric.error.unwrap().code.unwrap().is_number());

        let string: ChatErrorResponse =
            serde_json::from_str(r#"{"error":{"message":"m","code":"429"}}"#).unwrap();
        assert!(string.error.unwrap().code.unwrap().is_string());
    }
}
