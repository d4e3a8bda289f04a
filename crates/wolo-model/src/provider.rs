// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::BTreeMap;
use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use wolo_error::WoloError;

use crate::{FinishReason, Message, TokenUsage};

/// A tool schema advertised to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    /// JSON Schema of the parameters object
    pub parameters: Value,
}

/// A completion request, expressed in the internal message model.  The
/// provider maps it onto the wire format.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    pub tools: Vec<ToolSchema>,
    /// Prepended as the system message when `messages` does not contain one.
    pub system_prompt: String,
    /// Request a reasoning trace and echo stored traces back upstream.
    pub enable_think: bool,
}

/// A single streamed event decoded from the provider.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    TextDelta(String),
    /// A fragment of a tool call.  `index` keys accumulation: providers
    /// interleave fragments of parallel calls and may repeat or reorder the
    /// id/name fields within one index.
    ToolCallDelta {
        index: u32,
        id: String,
        name: String,
        arguments: String,
    },
    ReasoningDelta(String),
    Usage(TokenUsage),
    Finish(FinishReason),
    Done,
}

pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, WoloError>> + Send>>;

/// The transport contract the agent loop consumes.  `ChatClient` implements
/// it over HTTP+SSE; the scripted mocks implement it for tests.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    fn model_name(&self) -> &str;

    /// Context window used for the compaction budget, when known.
    fn context_window(&self) -> Option<u32> {
        None
    }

    /// Maximum completion tokens configured for this endpoint.
    fn max_tokens(&self) -> Option<u32> {
        None
    }

    async fn complete(&self, req: ChatRequest) -> Result<EventStream, WoloError>;
}

// ─── Tool-call assembly ──────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct PendingToolCall {
    id: String,
    name: String,
    args_buf: String,
}

/// A fully assembled tool call ready to become a `ToolPart`.
#[derive(Debug, Clone)]
pub struct AssembledToolCall {
    pub id: String,
    pub name: String,
    pub input: Map<String, Value>,
}

/// Accumulates [`StreamEvent::ToolCallDelta`] fragments keyed by the
/// provider's parallel-call index and parses each argument buffer when the
/// stream finishes.
#[derive(Debug, Default)]
pub struct ToolCallAssembler {
    pending: BTreeMap<u32, PendingToolCall>,
}

impl ToolCallAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, index: u32, id: &str, name: &str, arguments: &str) {
        let slot = self.pending.entry(index).or_default();
        if !id.is_empty() {
            slot.id = id.to_string();
        }
        if !name.is_empty() {
            slot.name = name.to_string();
        }
        slot.args_buf.push_str(arguments);
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Close all pending calls, in index order.
    ///
    /// Arguments that do not parse as a JSON object fail the whole turn with
    /// `LLMError` — a half-parsed tool input must never be dispatched.
    pub fn finish(self) -> Result<Vec<AssembledToolCall>, WoloError> {
        let mut out = Vec::with_capacity(self.pending.len());
        for (i, p) in self.pending {
            if p.name.is_empty() {
                tracing::warn!(index = i, "dropping tool call with empty name");
                continue;
            }
            let input: Map<String, Value> = if p.args_buf.trim().is_empty() {
                Map::new()
            } else {
                match serde_json::from_str::<Value>(&p.args_buf) {
                    Ok(Value::Object(m)) => m,
                    Ok(other) => {
                        return Err(WoloError::llm(format!(
                            "tool call arguments for '{}' are not an object: {other}",
                            p.name
                        ))
                        .with_context("kind", "tool_arg_parse_failed")
                        .with_context("tool_name", p.name));
                    }
                    Err(e) => {
                        return Err(WoloError::llm(format!(
                            "unparseable tool call arguments for '{}': {e}",
                            p.name
                        ))
                        .with_context("kind", "tool_arg_parse_failed")
                        .with_context("tool_name", p.name));
                    }
                }
            };
            let id = if p.id.is_empty() {
                // Providers occasionally omit the id; synthesize one so the
                // result message can still reference the call.
                format!("call_synthetic_{i}")
            } else {
                p.id
            };
            out.push(AssembledToolCall {
                id,
                name: p.name,
                input,
            });
        }
        Ok(out)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn assembler_accumulates_fragments_by_index() {
        let mut a = ToolCallAssembler::new();
        a.push(0, "call_1", "write", "");
        a.push(0, "", "", r#"{"path":"#);
        a.push(0, "", "", r#""/tmp/x"}"#);
        let calls = a.finish().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "write");
        assert_eq!(calls[0].input.get("path").unwrap(), &json!("/tmp/x"));
    }

    #[test]
    fn assembler_orders_parallel_calls_by_index() {
        let mut a = ToolCallAssembler::new();
        a.push(1, "c2", "glob", "{}");
        a.push(0, "c1", "read", "{}");
        let calls = a.finish().unwrap();
        assert_eq!(calls[0].name, "read");
        assert_eq!(calls[1].name, "glob");
    }

    #[test]
    fn assembler_tolerates_reordered_id_and_name_fields() {
        let mut a = ToolCallAssembler::new();
        a.push(0, "", "", r#"{"x":"#);
        a.push(0, "late_id", "shell", "1}");
        let calls = a.finish().unwrap();
        assert_eq!(calls[0].id, "late_id");
        assert_eq!(calls[0].name, "shell");
    }

    #[test]
    fn empty_arguments_become_empty_object() {
        let mut a = ToolCallAssembler::new();
        a.push(0, "c1", "todoread", "");
        let calls = a.finish().unwrap();
        assert!(calls[0].input.is_empty());
    }

    #[test]
    fn invalid_json_is_llm_error_with_kind() {
        let mut a = ToolCallAssembler::new();
        a.push(0, "c1", "write", "{not json");
        let err = a.finish().unwrap_err();
        assert!(matches!(err, WoloError::Llm(_)));
        assert_eq!(err.kind(), Some("tool_arg_parse_failed"));
    }

    #[test]
    fn non_object_arguments_are_rejected() {
        let mut a = ToolCallAssembler::new();
        a.push(0, "c1", "write", "[1,2]");
        assert!(a.finish().is_err());
    }

    #[test]
    fn nameless_call_is_dropped() {
        let mut a = ToolCallAssembler::new();
        a.push(0, "c1", "", "{}");
        assert!(a.finish().unwrap().is_empty());
    }

    #[test]
    fn missing_id_gets_synthetic_fallback() {
        let mut a = ToolCallAssembler::new();
        a.push(3, "", "read", "{}");
        let calls = a.finish().unwrap();
        assert_eq!(calls[0].id, "call_synthetic_3");
    }
}
