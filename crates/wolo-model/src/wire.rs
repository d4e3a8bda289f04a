// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Mapping between the internal message model and the OpenAI-compatible
//! chat-completions wire format.
//!
//! Extracted as free functions so the mapping is unit-testable without HTTP.

use serde_json::{json, Value};

use crate::{ChatRequest, Message, Role, ToolSchema};

/// Convert the internal message list into the wire-format `messages` array.
///
/// - A system message is prepended from `system_prompt` when the list lacks
///   one.
/// - User/system messages flatten to the concatenated text of their text
///   parts.
/// - An assistant message becomes `{content, tool_calls[]}`; each of its
///   tool parts then produces a following `{role: tool}` result message in
///   source order.  Assistant messages with neither text nor tool calls are
///   dropped — providers reject them.
/// - With `enable_think`, stored reasoning traces are echoed back on
///   assistant messages as `reasoning_content`.
pub fn build_wire_messages(req: &ChatRequest) -> Vec<Value> {
    let mut out: Vec<Value> = Vec::with_capacity(req.messages.len() + 1);

    let has_system = req.messages.iter().any(|m| m.role == Role::System);
    if !has_system && !req.system_prompt.is_empty() {
        out.push(json!({ "role": "system", "content": req.system_prompt }));
    }

    for m in &req.messages {
        match m.role {
            Role::System => {
                out.push(json!({ "role": "system", "content": m.text() }));
            }
            Role::User => {
                out.push(json!({ "role": "user", "content": m.text() }));
            }
            Role::Assistant => {
                if !m.is_sendable() {
                    continue;
                }
                let tool_calls: Vec<Value> = m
                    .tool_parts()
                    .map(|p| {
                        json!({
                            "id": p.id,
                            "type": "function",
                            "function": {
                                "name": p.name,
                                "arguments": p.input_json(),
                            }
                        })
                    })
                    .collect();

                let mut msg = json!({ "role": "assistant", "content": m.text() });
                if !tool_calls.is_empty() {
                    msg["tool_calls"] = json!(tool_calls);
                }
                if req.enable_think {
                    if let Some(r) = &m.reasoning_content {
                        msg["reasoning_content"] = json!(r);
                    }
                }
                out.push(msg);

                for p in m.tool_parts() {
                    out.push(json!({
                        "role": "tool",
                        "tool_call_id": p.id,
                        "content": p.output,
                    }));
                }
            }
        }
    }
    out
}

/// Wire-format `tools` array from the registry schemas.
pub fn build_wire_tools(tools: &[ToolSchema]) -> Vec<Value> {
    tools
        .iter()
        .map(|t| {
            json!({
                "type": "function",
                "function": {
                    "name": t.name,
                    "description": t.description,
                    "parameters": t.parameters,
                }
            })
        })
        .collect()
}

/// Sampling parameters attached to every request.  Only the standard chat
/// parameter names are used; anything vendor-specific rides in `extra`.
#[derive(Debug, Clone, Default)]
pub struct SamplingParams {
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub max_tokens: Option<u32>,
}

/// Full request body for a streaming chat completion.
pub fn build_request_body(model: &str, req: &ChatRequest, params: &SamplingParams) -> Value {
    let mut body = json!({
        "model": model,
        "messages": build_wire_messages(req),
        "stream": true,
        "stream_options": { "include_usage": true },
    });
    if !req.tools.is_empty() {
        body["tools"] = json!(build_wire_tools(&req.tools));
    }
    if let Some(t) = params.temperature {
        body["temperature"] = json!(t);
    }
    if let Some(p) = params.top_p {
        body["top_p"] = json!(p);
    }
    if let Some(m) = params.max_tokens {
        body["max_tokens"] = json!(m);
    }
    if req.enable_think {
        body["extra"] = json!({ "thinking": { "type": "enabled" } });
    }
    body
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
