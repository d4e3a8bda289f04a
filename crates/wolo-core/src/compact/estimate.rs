// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Tokenizer-free token estimation.
//!
//! Heuristic: 4 characters per token for most text, 1.5 for CJK unified
//! ideographs (which tokenize much denser), plus a fixed per-message
//! overhead and a per-tool-call overhead covering the wire framing.

use wolo_model::{Message, Part};

/// Fixed cost of message framing (role, separators).
pub const PER_MESSAGE_OVERHEAD: usize = 10;

/// Fixed cost of a tool call's framing (id, function wrapper).
pub const PER_TOOL_CALL_OVERHEAD: usize = 20;

const CHARS_PER_TOKEN: f64 = 4.0;
const CJK_CHARS_PER_TOKEN: f64 = 1.5;

/// Estimate tokens for a text fragment.
pub fn estimate_text(text: &str) -> usize {
    let mut cjk = 0usize;
    let mut other = 0usize;
    for c in text.chars() {
        if ('\u{4E00}'..='\u{9FFF}').contains(&c) {
            cjk += 1;
        } else {
            other += 1;
        }
    }
    let tokens = other as f64 / CHARS_PER_TOKEN + cjk as f64 / CJK_CHARS_PER_TOKEN;
    tokens.ceil() as usize
}

/// Estimate tokens for one message including framing overhead.
pub fn estimate_message(message: &Message) -> usize {
    let mut total = PER_MESSAGE_OVERHEAD;
    if let Some(r) = &message.reasoning_content {
        total += estimate_text(r);
    }
    for part in &message.parts {
        match part {
            Part::Text(t) => total += estimate_text(&t.text),
            Part::Tool(t) => {
                total += PER_TOOL_CALL_OVERHEAD;
                total += estimate_text(&t.input_json());
                total += estimate_text(&t.output);
            }
        }
    }
    total
}

/// Estimate tokens for a whole window.
pub fn estimate_messages(messages: &[Message]) -> usize {
    messages.iter().map(estimate_message).sum()
}

/// Window estimate preferring a model-reported prompt size when available.
///
/// The provider's usage number covers the head of the window exactly as the
/// model saw it; when it exceeds our heuristic the heuristic was low, so
/// take the larger of the two.
pub fn estimate_window(messages: &[Message], reported_prompt_tokens: Option<u64>) -> usize {
    let estimated = estimate_messages(messages);
    match reported_prompt_tokens {
        Some(actual) => estimated.max(actual as usize),
        None => estimated,
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
