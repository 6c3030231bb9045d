//! Chat Completions SSE stream to Claude SSE stream transduction.
//!
//! [`StreamProcessor`] consumes the upstream feed one line at a time and
//! emits Claude lifecycle events, tracking which content block is currently
//! open. Exactly one block is open at any moment; a delta of a different
//! kind forces the open block closed first. Closing a thinking block that
//! never received a real signature injects a synthetic one, because Claude
//! clients refuse to replay signature-less thinking across turns.

use crate::api::chat_models::{StreamChunk, ToolCall};
use crate::api::claude_models::{constants, ClaudeUsage};
use crate::transformer::response::{
    extract_usage, map_finish_reason, message_id, synthesize_signature,
};
use serde_json::{json, Value};
use std::collections::HashMap;

/// Kind of the currently open content block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    Text,
    Thinking,
    ToolUse,
}

/// Incremental assembly of a single streamed tool call.
#[allow(dead_code)]
#[derive(Debug, Default)]
struct ToolCallAssembly {
    id: String,
    name: String,
    arguments: String,
}

/// Streaming transducer state for one request.
pub struct StreamProcessor {
    original_model: String,
    message_start_sent: bool,
    message_stop_sent: bool,
    block_index: i64,
    /// The open block, if any
    block_type: Option<BlockKind>,
    used_tool: bool,
    /// Whether the current thinking block received a real signature
    thinking_got_signature: bool,
    /// Tool assemblies keyed by the upstream streaming index
    active_tool_calls: HashMap<i64, ToolCallAssembly>,
    usage: ClaudeUsage,
}

impl StreamProcessor {
    pub fn new(original_model: impl Into<String>) -> Self {
        Self {
            original_model: original_model.into(),
            message_start_sent: false,
            message_stop_sent: false,
            block_index: 0,
            block_type: None,
            used_tool: false,
            thinking_got_signature: false,
            active_tool_calls: HashMap::new(),
            usage: ClaudeUsage::default(),
        }
    }

    /// Process one line of the upstream feed, returning zero or more Claude
    /// events as a framed SSE string.
    pub fn process_line(&mut self, line: &str) -> String {
        let line = line.trim();
        if line.is_empty() {
            return String::new();
        }

        let Some(payload) = line.strip_prefix("data:") else {
            // Comments and other SSE fields are ignored
            return String::new();
        };
        let payload = payload.trim();
        if payload.is_empty() || payload == "[DONE]" {
            return self.finish_if_needed();
        }

        let Ok(chunk) = serde_json::from_str::<StreamChunk>(payload) else {
            // Malformed chunks are dropped; the stream carries on
            return String::new();
        };

        // After message_stop, late chunks still feed usage accounting (the
        // include_usage chunk can trail the finish_reason) but emit nothing.
        if self.message_stop_sent {
            if let Some(usage) = chunk.usage.as_ref() {
                self.usage = extract_usage(Some(usage));
            }
            return String::new();
        }

        let mut out = String::new();

        if !self.message_start_sent {
            out.push_str(&self.emit_message_start(&chunk.id));
        }

        // Usage arrives on the terminal chunk when include_usage is set
        if let Some(usage) = chunk.usage.as_ref() {
            self.usage = extract_usage(Some(usage));
        }

        for choice in &chunk.choices {
            let delta = &choice.delta;

            if let Some(thinking) = &delta.thinking {
                if !thinking.content.is_empty() {
                    out.push_str(&self.thinking_delta(&thinking.content));
                }
                if !thinking.signature.is_empty() {
                    out.push_str(&self.signature_delta(&thinking.signature));
                }
            }

            // reasoning_content and reasoning are provider-specific spellings
            if let Some(reasoning) = delta
                .reasoning_content
                .as_deref()
                .filter(|s| !s.is_empty())
            {
                out.push_str(&self.thinking_delta(reasoning));
            } else if let Some(reasoning) =
                delta.reasoning.as_deref().filter(|s| !s.is_empty())
            {
                out.push_str(&self.thinking_delta(reasoning));
            }

            if let Some(content) = delta.content.as_deref().filter(|s| !s.is_empty()) {
                out.push_str(&self.text_delta(content));
            }

            for tool_call in delta.tool_calls.as_deref().unwrap_or_default() {
                out.push_str(&self.tool_call_delta(tool_call));
            }

            if let Some(reason) = choice.finish_reason.as_deref().filter(|s| !s.is_empty()) {
                out.push_str(&self.emit_finish(reason));
            }
        }

        out
    }

    /// Flush the stream at upstream end, returning any final events and the
    /// accumulated usage.
    pub fn finish(&mut self) -> (String, ClaudeUsage) {
        (self.finish_if_needed(), self.usage.clone())
    }

    /// Accumulated usage so far.
    pub fn usage(&self) -> &ClaudeUsage {
        &self.usage
    }

    fn emit_message_start(&mut self, response_id: &str) -> String {
        if self.message_start_sent {
            return String::new();
        }

        let event = json!({
            "type": constants::EVENT_MESSAGE_START,
            "message": {
                "id": message_id(response_id),
                "type": "message",
                "role": constants::ROLE_ASSISTANT,
                "content": [],
                "model": self.original_model,
                "stop_reason": null,
                "stop_sequence": null,
                "usage": {
                    "input_tokens": self.usage.input_tokens,
                    "output_tokens": 0
                }
            }
        });

        self.message_start_sent = true;
        format_event(constants::EVENT_MESSAGE_START, &event)
    }

    fn text_delta(&mut self, text: &str) -> String {
        let mut out = String::new();

        match self.block_type {
            Some(BlockKind::Thinking) => {
                out.push_str(&self.close_thinking_with_synthetic_signature());
            }
            Some(kind) if kind != BlockKind::Text => {
                out.push_str(&self.close_block());
            }
            _ => {}
        }

        if self.block_type.is_none() {
            out.push_str(
                &self.open_block(BlockKind::Text, json!({"type": "text", "text": ""})),
            );
        }

        out.push_str(&format_event(
            constants::EVENT_CONTENT_BLOCK_DELTA,
            &json!({
                "type": constants::EVENT_CONTENT_BLOCK_DELTA,
                "index": self.block_index,
                "delta": {"type": constants::DELTA_TEXT, "text": text}
            }),
        ));

        out
    }

    fn thinking_delta(&mut self, text: &str) -> String {
        let mut out = String::new();

        // A non-thinking block is closed as-is; only thinking blocks need
        // signature finalization.
        if matches!(self.block_type, Some(kind) if kind != BlockKind::Thinking) {
            out.push_str(&self.close_block());
        }

        if self.block_type.is_none() {
            out.push_str(&self.open_block(
                BlockKind::Thinking,
                json!({"type": "thinking", "thinking": ""}),
            ));
        }

        out.push_str(&format_event(
            constants::EVENT_CONTENT_BLOCK_DELTA,
            &json!({
                "type": constants::EVENT_CONTENT_BLOCK_DELTA,
                "index": self.block_index,
                "delta": {"type": constants::DELTA_THINKING, "thinking": text}
            }),
        ));

        out
    }

    /// A real signature ends the thinking block.
    fn signature_delta(&mut self, signature: &str) -> String {
        if self.block_type != Some(BlockKind::Thinking) {
            return String::new();
        }

        self.thinking_got_signature = true;

        let mut out = format_event(
            constants::EVENT_CONTENT_BLOCK_DELTA,
            &json!({
                "type": constants::EVENT_CONTENT_BLOCK_DELTA,
                "index": self.block_index,
                "delta": {"type": constants::DELTA_SIGNATURE, "signature": signature}
            }),
        );
        out.push_str(&self.close_block());
        out
    }

    /// Close the open thinking block, injecting a synthetic signature if the
    /// upstream never supplied one (DeepSeek, GLM and similar).
    fn close_thinking_with_synthetic_signature(&mut self) -> String {
        if self.block_type != Some(BlockKind::Thinking) {
            return String::new();
        }
        if self.thinking_got_signature {
            return self.close_block();
        }

        let mut out = format_event(
            constants::EVENT_CONTENT_BLOCK_DELTA,
            &json!({
                "type": constants::EVENT_CONTENT_BLOCK_DELTA,
                "index": self.block_index,
                "delta": {
                    "type": constants::DELTA_SIGNATURE,
                    "signature": synthesize_signature()
                }
            }),
        );
        out.push_str(&self.close_block());
        out
    }

    fn tool_call_delta(&mut self, tool_call: &ToolCall) -> String {
        let mut out = String::new();
        self.used_tool = true;

        let index = tool_call.index.unwrap_or(0);

        if !self.active_tool_calls.contains_key(&index) {
            match self.block_type {
                Some(BlockKind::Thinking) => {
                    out.push_str(&self.close_thinking_with_synthetic_signature());
                }
                Some(_) => out.push_str(&self.close_block()),
                None => {}
            }

            // Some upstreams omit the id or name on the first delta
            let tool_id = if tool_call.id.is_empty() {
                format!("call_{}_{}", chrono::Utc::now().timestamp_millis(), index)
            } else {
                tool_call.id.clone()
            };
            let tool_name = if tool_call.function.name.is_empty() {
                format!("tool_{}", index)
            } else {
                tool_call.function.name.clone()
            };

            out.push_str(&self.open_block(
                BlockKind::ToolUse,
                json!({
                    "type": "tool_use",
                    "id": &tool_id,
                    "name": &tool_name,
                    "input": {}
                }),
            ));

            self.active_tool_calls.insert(
                index,
                ToolCallAssembly {
                    id: tool_id,
                    name: tool_name,
                    arguments: String::new(),
                },
            );
        }

        if !tool_call.function.arguments.is_empty() {
            if let Some(assembly) = self.active_tool_calls.get_mut(&index) {
                assembly.arguments.push_str(&tool_call.function.arguments);

                // Partial JSON passes through byte-for-byte, unvalidated
                out.push_str(&format_event(
                    constants::EVENT_CONTENT_BLOCK_DELTA,
                    &json!({
                        "type": constants::EVENT_CONTENT_BLOCK_DELTA,
                        "index": self.block_index,
                        "delta": {
                            "type": constants::DELTA_INPUT_JSON,
                            "partial_json": tool_call.function.arguments
                        }
                    }),
                ));
            }
        }

        out
    }

    fn emit_finish(&mut self, finish_reason: &str) -> String {
        if self.message_stop_sent {
            return String::new();
        }

        let mut out = String::new();

        match self.block_type {
            Some(BlockKind::Thinking) => {
                out.push_str(&self.close_thinking_with_synthetic_signature());
            }
            Some(_) => out.push_str(&self.close_block()),
            None => {}
        }

        let stop_reason = map_finish_reason(finish_reason, self.used_tool);

        out.push_str(&format_event(
            constants::EVENT_MESSAGE_DELTA,
            &json!({
                "type": constants::EVENT_MESSAGE_DELTA,
                "delta": {"stop_reason": stop_reason, "stop_sequence": null},
                "usage": {"output_tokens": self.usage.output_tokens}
            }),
        ));
        out.push_str(&format_event(
            constants::EVENT_MESSAGE_STOP,
            &json!({"type": constants::EVENT_MESSAGE_STOP}),
        ));

        self.message_stop_sent = true;
        out
    }

    /// Emit the terminal events if the stream started but never finished.
    fn finish_if_needed(&mut self) -> String {
        if self.message_stop_sent || !self.message_start_sent {
            return String::new();
        }
        self.emit_finish("stop")
    }

    fn open_block(&mut self, kind: BlockKind, content_block: Value) -> String {
        if self.block_type.is_some() {
            return String::new();
        }

        if kind == BlockKind::Thinking {
            self.thinking_got_signature = false;
        }

        let event = json!({
            "type": constants::EVENT_CONTENT_BLOCK_START,
            "index": self.block_index,
            "content_block": content_block
        });

        self.block_type = Some(kind);
        format_event(constants::EVENT_CONTENT_BLOCK_START, &event)
    }

    fn close_block(&mut self) -> String {
        if self.block_type.is_none() {
            return String::new();
        }

        let event = json!({
            "type": constants::EVENT_CONTENT_BLOCK_STOP,
            "index": self.block_index
        });

        self.block_type = None;
        self.block_index += 1;
        format_event(constants::EVENT_CONTENT_BLOCK_STOP, &event)
    }
}

/// Frame a Claude event as `event: <type>\ndata: <json>\n\n`.
fn format_event(event_type: &str, data: &Value) -> String {
    format!(
        "event: {}\ndata: {}\n\n",
        event_type,
        serde_json::to_string(data).unwrap_or_default()
    )
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    /// Parse framed SSE output into (event_type, payload) pairs.
    fn parse_events(raw: &str) -> Vec<(String, Value)> {
        raw.split("\n\n")
            .filter(|frame| !frame.is_empty())
            .map(|frame| {
                let mut lines = frame.lines();
                let event = lines
                    .next()
                    .and_then(|l| l.strip_prefix("event: "))
                    .expect("event line")
                    .to_string();
                let data = lines
                    .next()
                    .and_then(|l| l.strip_prefix("data: "))
                    .expect("data line");
                (event, serde_json::from_str(data).expect("valid JSON"))
            })
            .collect()
    }

    fn run(lines: &[&str]) -> Vec<(String, Value)> {
        let mut processor = StreamProcessor::new("claude-x");
        let mut raw = String::new();
        for line in lines {
            raw.push_str(&processor.process_line(line));
        }
        let (trailing, _) = processor.finish();
        raw.push_str(&trailing);
        parse_events(&raw)
    }

    #[test]
    fn test_reasoning_without_signature() {
        let events = run(&[
            r#"data: {"id":"c1","choices":[{"delta":{"reasoning_content":"think "}}]}"#,
            r#"data: {"choices":[{"delta":{"reasoning_content":"more"}}]}"#,
            r#"data: {"choices":[{"delta":{"content":"answer"}}]}"#,
            r#"data: {"choices":[{"delta":{},"finish_reason":"stop"}]}"#,
            "data: [DONE]",
        ]);

        let types: Vec<&str> = events.iter().map(|(t, _)| t.as_str()).collect();
        assert_eq!(
            types,
            vec![
                "message_start",
                "content_block_start",
                "content_block_delta",
                "content_block_delta",
                "content_block_delta",
                "content_block_stop",
                "content_block_start",
                "content_block_delta",
                "content_block_stop",
                "message_delta",
                "message_stop",
            ]
        );

        // Thinking block at index 0
        assert_eq!(events[1].1["content_block"]["type"], "thinking");
        assert_eq!(events[1].1["index"], 0);
        assert_eq!(events[2].1["delta"]["thinking"], "think ");
        assert_eq!(events[3].1["delta"]["thinking"], "more");

        // A synthetic numeric signature closes it
        assert_eq!(events[4].1["delta"]["type"], "signature_delta");
        let signature = events[4].1["delta"]["signature"].as_str().unwrap();
        assert!(signature.parse::<i64>().is_ok());
        assert_eq!(events[5].1["index"], 0);

        // Text block at index 1
        assert_eq!(events[6].1["content_block"]["type"], "text");
        assert_eq!(events[6].1["index"], 1);
        assert_eq!(events[7].1["delta"]["text"], "answer");

        assert_eq!(events[9].1["delta"]["stop_reason"], "end_turn");
    }

    #[test]
    fn test_tool_call_assembled_across_chunks() {
        let events = run(&[
            r#"data: {"id":"c1","choices":[{"delta":{"tool_calls":[{"index":0,"id":"t2","function":{"name":"f"}}]}}]}"#,
            r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"a\":"}}]}}]}"#,
            r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"1}"}}]}}]}"#,
            r#"data: {"choices":[{"delta":{},"finish_reason":"tool_calls"}]}"#,
        ]);

        let types: Vec<&str> = events.iter().map(|(t, _)| t.as_str()).collect();
        assert_eq!(
            types,
            vec![
                "message_start",
                "content_block_start",
                "content_block_delta",
                "content_block_delta",
                "content_block_stop",
                "message_delta",
                "message_stop",
            ]
        );

        assert_eq!(events[1].1["content_block"]["type"], "tool_use");
        assert_eq!(events[1].1["content_block"]["id"], "t2");
        assert_eq!(events[1].1["content_block"]["name"], "f");
        assert_eq!(events[2].1["delta"]["partial_json"], "{\"a\":");
        assert_eq!(events[3].1["delta"]["partial_json"], "1}");
        assert_eq!(events[5].1["delta"]["stop_reason"], "tool_use");
    }

    #[test]
    fn test_message_start_uses_upstream_id() {
        let events = run(&[r#"data: {"id":"cmpl_9","choices":[{"delta":{"content":"x"}}]}"#]);
        assert_eq!(events[0].1["message"]["id"], "cmpl_9");
        assert_eq!(events[0].1["message"]["model"], "claude-x");
    }

    #[test]
    fn test_message_start_synthesizes_missing_id() {
        let events = run(&[r#"data: {"choices":[{"delta":{"content":"x"}}]}"#]);
        let id = events[0].1["message"]["id"].as_str().unwrap();
        assert!(id.starts_with("msg_"));
    }

    #[test]
    fn test_real_signature_closes_thinking_block() {
        let events = run(&[
            r#"data: {"choices":[{"delta":{"thinking":{"content":"deep"}}}]}"#,
            r#"data: {"choices":[{"delta":{"thinking":{"signature":"sig_abc"}}}]}"#,
            r#"data: {"choices":[{"delta":{"content":"out"}}]}"#,
            r#"data: {"choices":[{"delta":{},"finish_reason":"stop"}]}"#,
        ]);

        let signature_events: Vec<&(String, Value)> = events
            .iter()
            .filter(|(_, v)| v["delta"]["type"] == "signature_delta")
            .collect();
        assert_eq!(signature_events.len(), 1);
        assert_eq!(signature_events[0].1["delta"]["signature"], "sig_abc");
    }

    #[test]
    fn test_thinking_and_signature_in_one_chunk() {
        let events = run(&[
            r#"data: {"choices":[{"delta":{"thinking":{"content":"d","signature":"s1"}}}]}"#,
            r#"data: {"choices":[{"delta":{},"finish_reason":"stop"}]}"#,
        ]);

        let types: Vec<&str> = events.iter().map(|(t, _)| t.as_str()).collect();
        assert_eq!(
            types,
            vec![
                "message_start",
                "content_block_start",
                "content_block_delta",
                "content_block_delta",
                "content_block_stop",
                "message_delta",
                "message_stop",
            ]
        );
    }

    #[test]
    fn test_signature_outside_thinking_block_ignored() {
        let events = run(&[
            r#"data: {"choices":[{"delta":{"content":"text"}}]}"#,
            r#"data: {"choices":[{"delta":{"thinking":{"signature":"s"}}}]}"#,
            r#"data: {"choices":[{"delta":{},"finish_reason":"stop"}]}"#,
        ]);
        assert!(events
            .iter()
            .all(|(_, v)| v["delta"]["type"] != "signature_delta"));
    }

    #[test]
    fn test_reasoning_closes_text_block_without_signature() {
        let events = run(&[
            r#"data: {"choices":[{"delta":{"content":"text"}}]}"#,
            r#"data: {"choices":[{"delta":{"reasoning":"later thought"}}]}"#,
            r#"data: {"choices":[{"delta":{},"finish_reason":"stop"}]}"#,
        ]);

        // text stop at index 0 happens directly, no signature injection
        assert_eq!(events[3].0, "content_block_stop");
        assert_eq!(events[3].1["index"], 0);
        assert_eq!(events[4].1["content_block"]["type"], "thinking");
        assert_eq!(events[4].1["index"], 1);
    }

    #[test]
    fn test_done_without_finish_reason_flushes() {
        let events = run(&[
            r#"data: {"choices":[{"delta":{"content":"x"}}]}"#,
            "data:[DONE]",
        ]);
        let types: Vec<&str> = events.iter().map(|(t, _)| t.as_str()).collect();
        assert_eq!(
            types,
            vec![
                "message_start",
                "content_block_start",
                "content_block_delta",
                "content_block_stop",
                "message_delta",
                "message_stop",
            ]
        );
    }

    #[test]
    fn test_empty_stream_emits_nothing() {
        let events = run(&["data: [DONE]"]);
        assert!(events.is_empty());

        let mut processor = StreamProcessor::new("claude-x");
        let (trailing, usage) = processor.finish();
        assert!(trailing.is_empty());
        assert_eq!(usage, ClaudeUsage::default());
    }

    #[test]
    fn test_malformed_and_irrelevant_lines_dropped() {
        let events = run(&[
            "",
            ": keep-alive",
            "event: something",
            "data: {not json",
            r#"data: {"choices":[{"delta":{"content":"ok"}}]}"#,
            r#"data: {"choices":[{"delta":{},"finish_reason":"stop"}]}"#,
        ]);
        assert_eq!(events[0].0, "message_start");
        assert_eq!(events[2].1["delta"]["text"], "ok");
    }

    #[test]
    fn test_usage_accumulated_into_message_delta() {
        let events = run(&[
            r#"data: {"choices":[{"delta":{"content":"hi"}}]}"#,
            r#"data: {"choices":[{"delta":{},"finish_reason":"stop"}],"usage":{"prompt_tokens":10,"completion_tokens":7,"prompt_tokens_details":{"cached_tokens":4}}}"#,
        ]);

        let message_delta = events
            .iter()
            .find(|(t, _)| t == "message_delta")
            .map(|(_, v)| v)
            .unwrap();
        assert_eq!(message_delta["usage"]["output_tokens"], 7);
    }

    #[test]
    fn test_finish_returns_derived_usage() {
        let mut processor = StreamProcessor::new("claude-x");
        processor.process_line(r#"data: {"choices":[{"delta":{"content":"hi"}}]}"#);
        processor.process_line(
            r#"data: {"choices":[],"usage":{"prompt_tokens":10,"completion_tokens":7,"prompt_tokens_details":{"cached_tokens":4}}}"#,
        );
        let (_, usage) = processor.finish();
        assert_eq!(usage.input_tokens, 6);
        assert_eq!(usage.output_tokens, 7);
        assert_eq!(usage.cache_read_input_tokens, 4);
    }

    #[test]
    fn test_message_stop_emitted_once() {
        let mut processor = StreamProcessor::new("claude-x");
        let mut raw = String::new();
        raw.push_str(&processor.process_line(r#"data: {"choices":[{"delta":{"content":"x"}}]}"#));
        raw.push_str(
            &processor.process_line(r#"data: {"choices":[{"delta":{},"finish_reason":"stop"}]}"#),
        );
        raw.push_str(&processor.process_line("data: [DONE]"));
        let (trailing, _) = processor.finish();
        raw.push_str(&trailing);

        let stops = parse_events(&raw)
            .iter()
            .filter(|(t, _)| t == "message_stop")
            .count();
        assert_eq!(stops, 1);
    }

    #[test]
    fn test_two_tool_calls_get_distinct_blocks() {
        let events = run(&[
            r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"id":"a","function":{"name":"f","arguments":"{}"}}]}}]}"#,
            r#"data: {"choices":[{"delta":{"tool_calls":[{"index":1,"id":"b","function":{"name":"g","arguments":"{}"}}]}}]}"#,
            r#"data: {"choices":[{"delta":{},"finish_reason":"tool_calls"}]}"#,
        ]);

        let starts: Vec<&Value> = events
            .iter()
            .filter(|(t, _)| t == "content_block_start")
            .map(|(_, v)| v)
            .collect();
        assert_eq!(starts.len(), 2);
        assert_eq!(starts[0]["index"], 0);
        assert_eq!(starts[0]["content_block"]["id"], "a");
        assert_eq!(starts[1]["index"], 1);
        assert_eq!(starts[1]["content_block"]["id"], "b");
    }

    #[test]
    fn test_tool_call_fallback_id_and_name() {
        let events = run(&[
            r#"data: {"choices":[{"delta":{"tool_calls":[{"index":2,"function":{"arguments":"{}"}}]}}]}"#,
            r#"data: {"choices":[{"delta":{},"finish_reason":"tool_calls"}]}"#,
        ]);

        let start = &events[1].1["content_block"];
        assert!(start["id"].as_str().unwrap().starts_with("call_"));
        assert!(start["id"].as_str().unwrap().ends_with("_2"));
        assert_eq!(start["name"], "tool_2");
    }

    #[test]
    fn test_thinking_before_tool_gets_signature_injected() {
        let events = run(&[
            r#"data: {"choices":[{"delta":{"reasoning_content":"plan"}}]}"#,
            r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"id":"t","function":{"name":"f"}}]}}]}"#,
            r#"data: {"choices":[{"delta":{},"finish_reason":"tool_calls"}]}"#,
        ]);

        // signature injected before the thinking block closes
        assert_eq!(events[3].1["delta"]["type"], "signature_delta");
        assert_eq!(events[4].0, "content_block_stop");
        assert_eq!(events[5].1["content_block"]["type"], "tool_use");
    }

    #[test]
    fn test_event_stream_invariants() {
        let events = run(&[
            r#"data: {"choices":[{"delta":{"reasoning_content":"a"}}]}"#,
            r#"data: {"choices":[{"delta":{"content":"b"}}]}"#,
            r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"id":"t","function":{"name":"f","arguments":"{}"}}]}}]}"#,
            r#"data: {"choices":[{"delta":{},"finish_reason":"tool_calls"}]}"#,
        ]);

        assert_eq!(events.first().unwrap().0, "message_start");
        assert_eq!(events.last().unwrap().0, "message_stop");

        // Every delta references the currently open block
        let mut open: Option<i64> = None;
        for (event_type, value) in &events {
            match event_type.as_str() {
                "content_block_start" => {
                    assert!(open.is_none(), "block opened while another was open");
                    open = value["index"].as_i64();
                }
                "content_block_delta" => {
                    assert_eq!(value["index"].as_i64(), open, "delta outside open block");
                }
                "content_block_stop" => {
                    assert_eq!(value["index"].as_i64(), open);
                    open = None;
                }
                "message_delta" | "message_stop" => {
                    assert!(open.is_none(), "message end with a block still open");
                }
                _ => {}
            }
        }
    }
}
