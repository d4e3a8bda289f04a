// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Tool-output pruning: the cheap compaction policy.
//!
//! Walks the window newest→oldest and replaces old, bulky tool outputs with
//! a short notice.  Recent turns, a recency token budget, and configured
//! protected tools are never touched.  The pruned parts keep their ids and
//! inputs — only the output text is swapped — and the on-disk originals
//! remain intact, referenced from the emitted record.

use async_trait::async_trait;
use serde_json::json;

use wolo_model::{CompactionPolicy, CompactionRecord, Message, Part, Role};

use super::estimate::{estimate_messages, estimate_text};
use super::{CompactionContext, CompactionStrategy, PolicyResult};

pub struct ToolPruningStrategy;

/// Message indices whose tool outputs are protected from pruning.
///
/// Protection covers the last `protect_recent_turns` user↔assistant turns
/// (a turn starts at a user message) and, below that, the most recent
/// `protect_token_threshold` tokens worth of tool outputs.
fn first_prunable_index(ctx: &CompactionContext<'_>) -> usize {
    let messages = ctx.messages;
    // Find the start of the Nth-last turn.
    let mut turn_starts: Vec<usize> = messages
        .iter()
        .enumerate()
        .filter(|(_, m)| m.role == Role::User)
        .map(|(i, _)| i)
        .collect();
    turn_starts.reverse();
    let turn_boundary = turn_starts
        .get(ctx.config.pruning.protect_recent_turns.saturating_sub(1))
        .copied()
        .unwrap_or(0);

    // Below the turn boundary, walk backwards accumulating tool-output
    // tokens until the recency budget is spent.
    let mut budget = ctx.config.pruning.protect_token_threshold as i64;
    let mut boundary = 0usize;
    for i in (0..turn_boundary).rev() {
        let tool_tokens: usize = messages[i]
            .tool_parts()
            .map(|t| estimate_text(&t.output))
            .sum();
        budget -= tool_tokens as i64;
        if budget < 0 {
            boundary = i + 1;
            break;
        }
    }
    boundary.min(turn_boundary)
}

fn is_prunable(part: &wolo_model::ToolPart, protected_tools: &[String]) -> bool {
    part.is_finished()
        && !part.output.is_empty()
        && part.metadata.get("pruned") != Some(&json!(true))
        && !protected_tools.iter().any(|t| t == &part.name)
}

#[async_trait]
impl CompactionStrategy for ToolPruningStrategy {
    fn name(&self) -> &str {
        "tool_output_pruning"
    }

    fn policy_type(&self) -> CompactionPolicy {
        CompactionPolicy::ToolPruning
    }

    fn priority(&self) -> i32 {
        50
    }

    fn should_apply(&self, ctx: &CompactionContext<'_>) -> bool {
        self.estimate_savings(ctx) >= ctx.config.pruning.minimum_prune_tokens
    }

    fn estimate_savings(&self, ctx: &CompactionContext<'_>) -> usize {
        let boundary = first_prunable_index(ctx);
        let replacement = estimate_text(&ctx.config.pruning.replacement_text);
        ctx.messages[..boundary]
            .iter()
            .flat_map(|m| m.tool_parts())
            .filter(|p| is_prunable(p, &ctx.config.pruning.protected_tools))
            .map(|p| estimate_text(&p.output).saturating_sub(replacement))
            .sum()
    }

    async fn apply(&self, ctx: &CompactionContext<'_>) -> PolicyResult {
        let boundary = first_prunable_index(ctx);
        let replacement_text = ctx.config.pruning.replacement_text.clone();
        let mut messages: Vec<Message> = ctx.messages.to_vec();
        let mut affected: Vec<String> = Vec::new();

        for message in &mut messages[..boundary] {
            let mut touched = false;
            for part in message.parts.iter_mut() {
                if let Part::Tool(tool) = part {
                    if is_prunable(tool, &ctx.config.pruning.protected_tools) {
                        let original_tokens = estimate_text(&tool.output);
                        tool.output = replacement_text.clone();
                        tool.metadata.insert("pruned".into(), json!(true));
                        tool.metadata
                            .insert("pruned_tokens".into(), json!(original_tokens));
                        touched = true;
                    }
                }
            }
            if touched {
                affected.push(message.id.clone());
            }
        }

        if affected.is_empty() {
            return PolicyResult::skipped();
        }

        let preserved: Vec<String> = ctx
            .messages
            .iter()
            .map(|m| m.id.clone())
            .filter(|id| !affected.contains(id))
            .collect();

        let mut record = CompactionRecord::new(ctx.session_id, self.policy_type());
        record.original_tokens = ctx.token_count;
        record.result_tokens = estimate_messages(&messages);
        record.original_message_count = ctx.messages.len();
        record.result_message_count = messages.len();
        record.compacted_message_ids = affected;
        record.preserved_message_ids = preserved;
        record.config_snapshot = json!({
            "policy": "tool_pruning",
            "protect_recent_turns": ctx.config.pruning.protect_recent_turns,
            "protect_token_threshold": ctx.config.pruning.protect_token_threshold,
            "minimum_prune_tokens": ctx.config.pruning.minimum_prune_tokens,
        });

        PolicyResult::applied(messages, record)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
