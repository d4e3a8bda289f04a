// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Deterministic providers for tests: no network, exact event sequences.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream;
use serde_json::Value;

use wolo_error::WoloError;

use crate::{
    ChatProvider, ChatRequest, EventStream, FinishReason, StreamEvent, TokenUsage,
};

/// A pre-scripted provider.  Each `complete` call pops the next event script
/// from the front of the queue; running out of scripts is a test bug and
/// surfaces as an `LLMError`.
pub struct ScriptedClient {
    scripts: Mutex<VecDeque<Vec<StreamEvent>>>,
    context_window: Option<u32>,
    max_tokens: Option<u32>,
    /// Every request seen, in order, so tests can inspect what was sent.
    pub requests: Arc<Mutex<Vec<ChatRequest>>>,
}

impl ScriptedClient {
    pub fn new(scripts: Vec<Vec<StreamEvent>>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            context_window: None,
            max_tokens: None,
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_context_window(mut self, window: u32) -> Self {
        self.context_window = Some(window);
        self
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    /// Script for a plain text turn that finishes with `stop`.
    pub fn text_turn(text: &str) -> Vec<StreamEvent> {
        vec![
            StreamEvent::TextDelta(text.to_string()),
            StreamEvent::Usage(TokenUsage {
                prompt_tokens: 10,
                completion_tokens: 10,
                total_tokens: 20,
            }),
            StreamEvent::Finish(FinishReason::Stop),
            StreamEvent::Done,
        ]
    }

    /// Script for a turn that requests a single tool call.
    pub fn tool_turn(id: &str, name: &str, args: &Value) -> Vec<StreamEvent> {
        vec![
            StreamEvent::ToolCallDelta {
                index: 0,
                id: id.to_string(),
                name: name.to_string(),
                arguments: args.to_string(),
            },
            StreamEvent::Usage(TokenUsage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            }),
            StreamEvent::Finish(FinishReason::ToolCalls),
            StreamEvent::Done,
        ]
    }

    /// Provider that always answers with the same text, forever.
    pub fn always_text(text: &str) -> AlwaysText {
        AlwaysText {
            text: text.to_string(),
        }
    }
}

#[async_trait]
impl ChatProvider for ScriptedClient {
    fn model_name(&self) -> &str {
        "scripted-mock"
    }

    fn context_window(&self) -> Option<u32> {
        self.context_window
    }

    fn max_tokens(&self) -> Option<u32> {
        self.max_tokens
    }

    async fn complete(&self, req: ChatRequest) -> Result<EventStream, WoloError> {
        self.requests.lock().unwrap().push(req);
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| WoloError::llm("scripted client ran out of scripts"))?;
        let events: Vec<Result<StreamEvent, WoloError>> = script.into_iter().map(Ok).collect();
        Ok(Box::pin(stream::iter(events)))
    }
}

/// Infinitely repeating single-text provider, for tests that do not care
/// about turn counts (e.g. compaction summaries).
pub struct AlwaysText {
    text: String,
}

#[async_trait]
impl ChatProvider for AlwaysText {
    fn model_name(&self) -> &str {
        "always-text-mock"
    }

    async fn complete(&self, _req: ChatRequest) -> Result<EventStream, WoloError> {
        let events: Vec<Result<StreamEvent, WoloError>> = vec![
            Ok(StreamEvent::TextDelta(self.text.clone())),
            Ok(StreamEvent::Finish(FinishReason::Stop)),
            Ok(StreamEvent::Done),
        ];
        Ok(Box::pin(stream::iter(events)))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
