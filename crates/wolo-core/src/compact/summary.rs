// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! LLM summary compaction: the expensive, high-priority policy.
//!
//! Keeps the most recent user↔assistant exchanges verbatim and asks the
//! model to fold everything older into a dense checkpoint.  The checkpoint
//! becomes a synthetic user message at the head of the surviving window,
//! tagged so later turns (and the UI) can recognise it.  The summarized
//! messages stay on disk; the record holds their ids.

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

use wolo_model::{
    ChatProvider, ChatRequest, CompactionPolicy, CompactionRecord, Message, Part, Role,
    StreamEvent,
};

use super::estimate::estimate_messages;
use super::{CompactionContext, CompactionStrategy, PolicyResult};

const SUMMARY_PROMPT: &str = "You are compacting the history of a coding-agent session. \
Summarise the conversation below into a dense technical checkpoint. Cover, in order: \
(1) what was done, with file paths and commands kept verbatim where they matter; \
(2) what is currently in progress; \
(3) which files were read, created, or modified; \
(4) what should happen next. \
The summary replaces the original history, so include every detail needed to continue.";

pub struct SummaryStrategy {
    client: Arc<dyn ChatProvider>,
}

impl SummaryStrategy {
    pub fn new(client: Arc<dyn ChatProvider>) -> Self {
        Self { client }
    }

    /// Index where the preserved tail begins: the start of the Nth-last
    /// user↔assistant exchange.
    fn split_index(&self, ctx: &CompactionContext<'_>) -> usize {
        let keep = ctx.config.summary.recent_exchanges_to_keep;
        let mut user_indices: Vec<usize> = ctx
            .messages
            .iter()
            .enumerate()
            .filter(|(_, m)| m.role == Role::User && !is_summary(m))
            .map(|(i, _)| i)
            .collect();
        user_indices.reverse();
        user_indices.get(keep.saturating_sub(1)).copied().unwrap_or(0)
    }

    async fn request_summary(&self, body: String) -> Result<String, String> {
        let req = ChatRequest {
            messages: vec![Message::user(format!("{SUMMARY_PROMPT}\n\n---\n\n{body}"))],
            tools: vec![],
            system_prompt: String::new(),
            enable_think: false,
        };
        let mut stream = self
            .client
            .complete(req)
            .await
            .map_err(|e| format!("summary model call failed: {e}"))?;
        let mut text = String::new();
        while let Some(event) = stream.next().await {
            match event.map_err(|e| format!("summary stream failed: {e}"))? {
                StreamEvent::TextDelta(delta) => text.push_str(&delta),
                StreamEvent::Done => break,
                _ => {}
            }
        }
        Ok(text)
    }
}

fn is_summary(message: &Message) -> bool {
    message
        .metadata
        .get("compaction")
        .and_then(|c| c.get("is_summary"))
        == Some(&json!(true))
}

/// Plain-text rendering of messages for the summary prompt body.
fn serialize_history(messages: &[Message]) -> String {
    messages
        .iter()
        .filter(|m| m.role != Role::System)
        .map(|m| {
            let role = match m.role {
                Role::User => "User",
                Role::Assistant => "Assistant",
                Role::System => "System",
            };
            let mut body = String::new();
            for part in &m.parts {
                match part {
                    Part::Text(t) => {
                        if !body.is_empty() {
                            body.push('\n');
                        }
                        body.push_str(&t.text);
                    }
                    Part::Tool(t) => {
                        body.push_str(&format!(
                            "\n[tool {}({}) -> {}]",
                            t.name,
                            t.input_json(),
                            t.output
                        ));
                    }
                }
            }
            format!("{role}: {body}")
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[async_trait]
impl CompactionStrategy for SummaryStrategy {
    fn name(&self) -> &str {
        "llm_summary"
    }

    fn policy_type(&self) -> CompactionPolicy {
        CompactionPolicy::Summary
    }

    fn priority(&self) -> i32 {
        100
    }

    fn should_apply(&self, ctx: &CompactionContext<'_>) -> bool {
        self.split_index(ctx) > 0
    }

    fn estimate_savings(&self, ctx: &CompactionContext<'_>) -> usize {
        let split = self.split_index(ctx);
        let folded = estimate_messages(&ctx.messages[..split]);
        // the summary itself costs roughly half a thousand tokens
        folded.saturating_sub(500)
    }

    async fn apply(&self, ctx: &CompactionContext<'_>) -> PolicyResult {
        let split = self.split_index(ctx);
        if split == 0 {
            return PolicyResult::skipped();
        }
        let older = &ctx.messages[..split];
        let preserved = &ctx.messages[split..];
        debug!(
            folded = older.len(),
            preserved = preserved.len(),
            "requesting summary compaction"
        );

        let summary_text = match self.request_summary(serialize_history(older)).await {
            Ok(t) if !t.trim().is_empty() => t,
            Ok(_) => return PolicyResult::failed("summary model returned empty text"),
            Err(e) => return PolicyResult::failed(e),
        };

        let mut record = CompactionRecord::new(ctx.session_id, self.policy_type());

        let mut summary_message = Message::user(format!(
            "[Conversation summary — earlier history was compacted]\n\n{summary_text}"
        ));
        summary_message.metadata.insert(
            "compaction".into(),
            json!({ "is_summary": true, "record_id": record.id }),
        );

        // Window: any system prefix, then the summary at the position of the
        // first surviving message, then the survivors.
        let mut messages: Vec<Message> = Vec::with_capacity(preserved.len() + 2);
        let system_prefix: Vec<Message> = older
            .iter()
            .filter(|m| m.role == Role::System)
            .cloned()
            .collect();
        messages.extend(system_prefix);
        messages.push(summary_message.clone());
        messages.extend(preserved.iter().cloned());

        record.original_tokens = ctx.token_count;
        record.result_tokens = estimate_messages(&messages);
        record.original_message_count = ctx.messages.len();
        record.result_message_count = messages.len();
        record.compacted_message_ids = older
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| m.id.clone())
            .collect();
        record.preserved_message_ids = preserved.iter().map(|m| m.id.clone()).collect();
        record.summary_message_id = Some(summary_message.id.clone());
        record.summary_text = Some(summary_text);
        record.config_snapshot = json!({
            "policy": "summary",
            "recent_exchanges_to_keep": ctx.config.summary.recent_exchanges_to_keep,
            // The limit is derived from the endpoint's context_window (or
            // max_tokens when unset) minus reserved_tokens; recorded so the
            // basis of the decision is auditable.
            "token_limit": ctx.token_limit,
            "token_limit_base": "context_window_or_max_tokens_minus_reserved",
            "model": ctx.model,
        });

        PolicyResult::applied(messages, record)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
