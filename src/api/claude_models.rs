//! Claude Messages API request and response models.
//!
//! This module defines the data structures used on the client-facing side of
//! the gateway: requests, responses, content blocks and error envelopes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Constants
// ============================================================================

/// Constants shared across the Claude-facing conversion code.
pub mod constants {
    // Role constants
    pub const ROLE_USER: &str = "user";
    pub const ROLE_ASSISTANT: &str = "assistant";
    pub const ROLE_SYSTEM: &str = "system";
    pub const ROLE_TOOL: &str = "tool";

    // Stop reason constants
    pub const STOP_END_TURN: &str = "end_turn";
    pub const STOP_MAX_TOKENS: &str = "max_tokens";
    pub const STOP_TOOL_USE: &str = "tool_use";

    // SSE event type constants
    pub const EVENT_MESSAGE_START: &str = "message_start";
    pub const EVENT_MESSAGE_STOP: &str = "message_stop";
    pub const EVENT_MESSAGE_DELTA: &str = "message_delta";
    pub const EVENT_CONTENT_BLOCK_START: &str = "content_block_start";
    pub const EVENT_CONTENT_BLOCK_STOP: &str = "content_block_stop";
    pub const EVENT_CONTENT_BLOCK_DELTA: &str = "content_block_delta";

    // Delta type constants
    pub const DELTA_TEXT: &str = "text_delta";
    pub const DELTA_THINKING: &str = "thinking_delta";
    pub const DELTA_SIGNATURE: &str = "signature_delta";
    pub const DELTA_INPUT_JSON: &str = "input_json_delta";
}

// ============================================================================
// Content Block Types
// ============================================================================

/// Image source for Claude image content blocks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaudeImageSource {
    #[serde(rename = "type")]
    pub source_type: String,
    #[serde(default)]
    pub media_type: String,
    #[serde(default)]
    pub data: String,
}

/// Claude content block, tagged by `type`.
///
/// Block kinds this gateway does not understand deserialize into `Unknown`
/// and are dropped by the transformers, never reflected back to the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClaudeContentBlock {
    #[serde(rename = "text")]
    Text {
        #[serde(default)]
        text: String,
    },
    #[serde(rename = "image")]
    Image { source: ClaudeImageSource },
    #[serde(rename = "thinking")]
    Thinking {
        #[serde(default)]
        thinking: String,
        #[serde(default)]
        signature: String,
    },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: Value,
    },
    #[serde(rename = "tool_result")]
    ToolResult {
        tool_use_id: String,
        #[serde(default)]
        content: Value,
        #[serde(default)]
        is_error: bool,
    },
    #[serde(other)]
    Unknown,
}

impl ClaudeContentBlock {
    /// Create a text content block.
    pub fn text(text: impl Into<String>) -> Self {
        ClaudeContentBlock::Text { text: text.into() }
    }

    /// Create a thinking content block.
    pub fn thinking(thinking: impl Into<String>, signature: impl Into<String>) -> Self {
        ClaudeContentBlock::Thinking {
            thinking: thinking.into(),
            signature: signature.into(),
        }
    }

    /// Create a tool use content block.
    pub fn tool_use(id: impl Into<String>, name: impl Into<String>, input: Value) -> Self {
        ClaudeContentBlock::ToolUse {
            id: id.into(),
            name: name.into(),
            input,
        }
    }
}

// ============================================================================
// Message Types
// ============================================================================

/// Content that can be either a string or a list of content blocks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClaudeMessageContent {
    Text(String),
    Blocks(Vec<ClaudeContentBlock>),
}

/// A message in Claude conversation format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaudeMessage {
    pub role: String,
    pub content: ClaudeMessageContent,
}

/// System content block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaudeSystemBlock {
    #[serde(rename = "type")]
    pub block_type: String,
    #[serde(default)]
    pub text: String,
}

/// System prompt: a string, a list of typed text blocks, or anything else
/// (which yields no system message at all).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClaudeSystemPrompt {
    Text(String),
    Blocks(Vec<ClaudeSystemBlock>),
    Other(Value),
}

// ============================================================================
// Tool Types
// ============================================================================

/// Schema override carried by `type == "custom"` tools.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaudeToolCustom {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub input_schema: Option<Value>,
}

/// Tool definition for the Claude API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaudeTool {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub tool_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom: Option<ClaudeToolCustom>,
}

/// Configuration for Claude's extended thinking feature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaudeThinkingConfig {
    #[serde(rename = "type")]
    pub config_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget_tokens: Option<i64>,
}

// ============================================================================
// Request Types
// ============================================================================

/// Request model for the Claude Messages API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaudeMessagesRequest {
    /// The model to use for completion
    pub model: String,

    /// Maximum number of tokens to generate
    pub max_tokens: i64,

    /// List of messages in the conversation
    pub messages: Vec<ClaudeMessage>,

    /// System prompt or instructions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<ClaudeSystemPrompt>,

    /// Whether to stream the response
    #[serde(default)]
    pub stream: bool,

    /// Sampling temperature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,

    /// Nucleus sampling probability
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,

    /// List of tools available to the model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ClaudeTool>>,

    /// How the model should use tools
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<Value>,

    /// Extended thinking configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<ClaudeThinkingConfig>,
}

// ============================================================================
// Response Types
// ============================================================================

/// Token usage reported to the client.
///
/// `input_tokens` excludes cache reads: it is derived from the upstream
/// usage as `max(0, prompt_tokens - cached_tokens)`.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ClaudeUsage {
    #[serde(default)]
    pub input_tokens: i64,
    #[serde(default)]
    pub output_tokens: i64,
    #[serde(default)]
    pub cache_read_input_tokens: i64,
}

/// Response model for the Claude Messages API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaudeResponse {
    pub id: String,
    #[serde(rename = "type")]
    pub response_type: String,
    pub role: String,
    pub model: String,
    pub content: Vec<ClaudeContentBlock>,
    pub stop_reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_sequence: Option<String>,
    pub usage: ClaudeUsage,
}

impl ClaudeResponse {
    /// Create a new Claude response.
    pub fn new(
        id: impl Into<String>,
        model: impl Into<String>,
        content: Vec<ClaudeContentBlock>,
        stop_reason: impl Into<String>,
        usage: ClaudeUsage,
    ) -> Self {
        Self {
            id: id.into(),
            response_type: "message".to_string(),
            role: constants::ROLE_ASSISTANT.to_string(),
            model: model.into(),
            content,
            stop_reason: stop_reason.into(),
            stop_sequence: None,
            usage,
        }
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Claude API error detail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaudeErrorDetail {
    #[serde(rename = "type")]
    pub error_type: String,
    pub message: String,
}

/// Claude API error envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaudeErrorResponse {
    #[serde(rename = "type")]
    pub response_type: String,
    pub error: ClaudeErrorDetail,
}

impl ClaudeErrorResponse {
    /// Create a new Claude error response.
    pub fn new(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            response_type: "error".to_string(),
            error: ClaudeErrorDetail {
                error_type: error_type.into(),
                message: message.into(),
            },
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
