// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// Why the model stopped producing output for a message.
///
/// Serialized exactly as the wire strings; an unfinished message carries the
/// empty string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum FinishReason {
    #[serde(rename = "stop")]
    Stop,
    #[serde(rename = "length")]
    Length,
    #[serde(rename = "tool_calls")]
    ToolCalls,
    #[serde(rename = "error")]
    Error,
    #[serde(rename = "")]
    #[default]
    None,
}

impl FinishReason {
    /// Map a wire-format `finish_reason` string; unknown values become `Stop`
    /// so a nonstandard provider still terminates the turn cleanly.
    pub fn from_wire(s: &str) -> Self {
        match s {
            "stop" => Self::Stop,
            "length" => Self::Length,
            "tool_calls" => Self::ToolCalls,
            "error" => Self::Error,
            "" => Self::None,
            _ => Self::Stop,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

/// One content part of a message.  Order within a message is creation order
/// and never changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Part {
    Text(TextPart),
    Tool(ToolPart),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextPart {
    pub id: String,
    pub text: String,
}

impl TextPart {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            text: text.into(),
        }
    }
}

/// A tool invocation embedded in an assistant message.
///
/// The part id doubles as the wire-level `tool_call_id`.  A part reaches
/// `Completed` or `Failed` exactly once; after that only compaction may touch
/// it, and only to set `metadata.pruned`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolPart {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub input: Map<String, Value>,
    #[serde(default)]
    pub output: String,
    #[serde(default)]
    pub status: ToolStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    /// Pruning flags, error codes, tool-specific outputs.  Unknown keys are
    /// preserved verbatim across save/load.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl ToolPart {
    pub fn new(id: impl Into<String>, name: impl Into<String>, input: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            input,
            output: String::new(),
            status: ToolStatus::Pending,
            start_time: None,
            end_time: None,
            metadata: Map::new(),
        }
    }

    pub fn begin(&mut self) {
        self.status = ToolStatus::Running;
        self.start_time = Some(Utc::now());
    }

    pub fn complete(&mut self, output: impl Into<String>) {
        self.output = output.into();
        self.status = ToolStatus::Completed;
        self.end_time = Some(Utc::now());
    }

    pub fn fail(&mut self, output: impl Into<String>) {
        self.output = output.into();
        self.status = ToolStatus::Failed;
        self.end_time = Some(Utc::now());
    }

    pub fn set_meta(&mut self, key: &str, value: Value) {
        self.metadata.insert(key.to_string(), value);
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.status, ToolStatus::Completed | ToolStatus::Failed)
    }

    /// Canonical serialization of the input map, used for doom-loop hashing
    /// and token estimation.  BTreeMap-free: serde_json::Map preserves
    /// insertion order, which is the model-produced order and is stable.
    pub fn input_json(&self) -> String {
        serde_json::to_string(&self.input).unwrap_or_else(|_| "{}".into())
    }
}

/// A single conversation message: an ordered list of parts plus metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub finished: bool,
    #[serde(default)]
    pub finish_reason: FinishReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_content: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Message {
    fn with_text(role: Role, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            timestamp: Utc::now(),
            finished: true,
            finish_reason: FinishReason::Stop,
            reasoning_content: None,
            metadata: Map::new(),
            parts: vec![Part::Text(TextPart::new(text))],
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::with_text(Role::User, text)
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::with_text(Role::System, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::with_text(Role::Assistant, text)
    }

    /// An empty, unfinished assistant message ready to grow from stream
    /// deltas.
    pub fn assistant_streaming() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role: Role::Assistant,
            timestamp: Utc::now(),
            finished: false,
            finish_reason: FinishReason::None,
            reasoning_content: None,
            metadata: Map::new(),
            parts: Vec::new(),
        }
    }

    /// Concatenated text of all text parts.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::Text(t) => Some(t.text.as_str()),
                Part::Tool(_) => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Append a streamed text delta to the trailing text part (creating one
    /// when the message ends in a tool part or is empty).
    pub fn push_text_delta(&mut self, delta: &str) {
        if let Some(Part::Text(t)) = self.parts.last_mut() {
            t.text.push_str(delta);
        } else {
            self.parts.push(Part::Text(TextPart::new(delta)));
        }
    }

    pub fn push_reasoning_delta(&mut self, delta: &str) {
        self.reasoning_content
            .get_or_insert_with(String::new)
            .push_str(delta);
    }

    pub fn add_tool_part(&mut self, part: ToolPart) {
        self.parts.push(Part::Tool(part));
    }

    pub fn tool_parts(&self) -> impl Iterator<Item = &ToolPart> {
        self.parts.iter().filter_map(|p| match p {
            Part::Tool(t) => Some(t),
            Part::Text(_) => None,
        })
    }

    pub fn tool_parts_mut(&mut self) -> impl Iterator<Item = &mut ToolPart> {
        self.parts.iter_mut().filter_map(|p| match p {
            Part::Tool(t) => Some(t),
            Part::Text(_) => None,
        })
    }

    pub fn has_tool_calls(&self) -> bool {
        self.tool_parts().next().is_some()
    }

    /// An assistant message is only sendable upstream when it carries
    /// non-empty text or at least one tool part.
    pub fn is_sendable(&self) -> bool {
        !self.text().trim().is_empty() || self.has_tool_calls()
    }

    pub fn finish(&mut self, reason: FinishReason) {
        self.finished = true;
        self.finish_reason = reason;
    }
}

// ─── Todos ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Todo {
    pub id: String,
    pub content: String,
    pub status: TodoStatus,
    /// Present-continuous description shown while the item is in progress.
    #[serde(rename = "activeForm", default, skip_serializing_if = "Option::is_none")]
    pub active_form: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
}

// ─── Token usage ─────────────────────────────────────────────────────────────

/// Cumulative token accounting for one task, monotonically increasing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    pub fn add(&mut self, other: TokenUsage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn user_message_has_single_text_part() {
        let m = Message::user("hello");
        assert_eq!(m.role, Role::User);
        assert_eq!(m.text(), "hello");
        assert_eq!(m.parts.len(), 1);
    }

    #[test]
    fn message_ids_are_unique() {
        assert_ne!(Message::user("a").id, Message::user("a").id);
    }

    #[test]
    fn streaming_assistant_starts_unfinished() {
        let m = Message::assistant_streaming();
        assert!(!m.finished);
        assert_eq!(m.finish_reason, FinishReason::None);
        assert!(m.parts.is_empty());
    }

    #[test]
    fn text_deltas_accumulate_into_one_part() {
        let mut m = Message::assistant_streaming();
        m.push_text_delta("hel");
        m.push_text_delta("lo");
        assert_eq!(m.text(), "hello");
        assert_eq!(m.parts.len(), 1);
    }

    #[test]
    fn text_delta_after_tool_part_opens_new_part() {
        let mut m = Message::assistant_streaming();
        m.push_text_delta("before");
        m.add_tool_part(ToolPart::new("tc1", "read", Map::new()));
        m.push_text_delta("after");
        assert_eq!(m.parts.len(), 3);
        assert_eq!(m.text(), "before\nafter");
    }

    #[test]
    fn reasoning_deltas_accumulate() {
        let mut m = Message::assistant_streaming();
        m.push_reasoning_delta("think ");
        m.push_reasoning_delta("hard");
        assert_eq!(m.reasoning_content.as_deref(), Some("think hard"));
    }

    #[test]
    fn tool_part_lifecycle_sets_times() {
        let mut p = ToolPart::new("tc1", "shell", Map::new());
        assert_eq!(p.status, ToolStatus::Pending);
        p.begin();
        assert_eq!(p.status, ToolStatus::Running);
        assert!(p.start_time.is_some());
        p.complete("done");
        assert_eq!(p.status, ToolStatus::Completed);
        assert!(p.end_time.is_some());
        assert!(p.is_finished());
    }

    #[test]
    fn failed_part_keeps_error_output() {
        let mut p = ToolPart::new("tc1", "write", Map::new());
        p.fail("denied");
        assert_eq!(p.status, ToolStatus::Failed);
        assert_eq!(p.output, "denied");
    }

    #[test]
    fn empty_assistant_is_not_sendable() {
        let m = Message::assistant_streaming();
        assert!(!m.is_sendable());
    }

    #[test]
    fn assistant_with_only_tool_part_is_sendable() {
        let mut m = Message::assistant_streaming();
        m.add_tool_part(ToolPart::new("tc1", "read", Map::new()));
        assert!(m.is_sendable());
    }

    #[test]
    fn whitespace_only_text_is_not_sendable() {
        let mut m = Message::assistant_streaming();
        m.push_text_delta("   \n");
        assert!(!m.is_sendable());
    }

    #[test]
    fn finish_reason_from_wire_maps_known_values() {
        assert_eq!(FinishReason::from_wire("stop"), FinishReason::Stop);
        assert_eq!(FinishReason::from_wire("length"), FinishReason::Length);
        assert_eq!(
            FinishReason::from_wire("tool_calls"),
            FinishReason::ToolCalls
        );
        assert_eq!(FinishReason::from_wire(""), FinishReason::None);
        assert_eq!(FinishReason::from_wire("weird"), FinishReason::Stop);
    }

    #[test]
    fn message_serde_round_trip_preserves_everything() {
        let mut m = Message::assistant_streaming();
        m.push_text_delta("result: ");
        let mut p = ToolPart::new("tc9", "grep", Map::new());
        p.input.insert("pattern".into(), json!("fn main"));
        p.complete("src/main.rs:1: fn main()");
        p.set_meta("truncated", json!(false));
        m.add_tool_part(p);
        m.finish(FinishReason::ToolCalls);
        m.metadata.insert("custom_key".into(), json!({"nested": [1, 2]}));

        let encoded = serde_json::to_string_pretty(&m).unwrap();
        let decoded: Message = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.id, m.id);
        assert_eq!(decoded.parts, m.parts);
        assert_eq!(decoded.finish_reason, FinishReason::ToolCalls);
        assert_eq!(decoded.metadata, m.metadata);
    }

    #[test]
    fn unknown_metadata_keys_survive_round_trip() {
        let raw = r#"{
            "id": "m1", "role": "user", "timestamp": "2026-01-01T00:00:00Z",
            "finished": true, "finish_reason": "stop",
            "metadata": {"future_field": {"a": 1}},
            "parts": [{"type": "text", "id": "p1", "text": "hi"}]
        }"#;
        let m: Message = serde_json::from_str(raw).unwrap();
        let back = serde_json::to_value(&m).unwrap();
        assert_eq!(back["metadata"]["future_field"]["a"], json!(1));
    }

    #[test]
    fn finish_reason_serializes_to_empty_string_when_none() {
        let m = Message::assistant_streaming();
        let v = serde_json::to_value(&m).unwrap();
        assert_eq!(v["finish_reason"], json!(""));
    }

    #[test]
    fn todo_active_form_uses_camel_case_key() {
        let t = Todo {
            id: "1".into(),
            content: "build".into(),
            status: TodoStatus::InProgress,
            active_form: Some("Building".into()),
            index: None,
        };
        let v = serde_json::to_value(&t).unwrap();
        assert_eq!(v["activeForm"], json!("Building"));
        assert_eq!(v["status"], json!("in_progress"));
    }

    #[test]
    fn token_usage_add_is_cumulative() {
        let mut u = TokenUsage::default();
        u.add(TokenUsage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        });
        u.add(TokenUsage {
            prompt_tokens: 1,
            completion_tokens: 1,
            total_tokens: 2,
        });
        assert_eq!(u.total_tokens, 17);
        assert_eq!(u.prompt_tokens, 11);
    }

    #[test]
    fn input_json_is_stable_for_same_input() {
        let mut a = Map::new();
        a.insert("path".into(), json!("/tmp/x"));
        a.insert("content".into(), json!("a"));
        let p1 = ToolPart::new("1", "write", a.clone());
        let p2 = ToolPart::new("2", "write", a);
        assert_eq!(p1.input_json(), p2.input_json());
    }
}
