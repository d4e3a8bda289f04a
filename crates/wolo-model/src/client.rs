// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Streaming chat-completions client for OpenAI-compatible endpoints.
//!
//! The wire format is `/chat/completions` with `stream: true`; the response
//! is a server-sent-event stream of partial deltas.  SSE events can be split
//! across TCP packets, so a line buffer is maintained across chunks and
//! events are only emitted for complete lines.

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use tracing::debug;

use wolo_config::ResolvedEndpoint;
use wolo_error::WoloError;

use crate::wire::{build_request_body, SamplingParams};
use crate::{ChatProvider, ChatRequest, EventStream, FinishReason, StreamEvent, TokenUsage};

pub struct ChatClient {
    model: String,
    chat_url: String,
    api_key: String,
    params: SamplingParams,
    context_window: Option<u32>,
    client: reqwest::Client,
}

impl ChatClient {
    pub fn new(endpoint: &ResolvedEndpoint) -> Self {
        let base = endpoint.api_base.trim_end_matches('/');
        Self {
            model: endpoint.model.clone(),
            chat_url: format!("{base}/chat/completions"),
            api_key: endpoint.api_key.clone(),
            params: SamplingParams {
                temperature: endpoint.temperature,
                top_p: endpoint.top_p,
                max_tokens: endpoint.max_tokens,
            },
            context_window: endpoint.context_window,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ChatProvider for ChatClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn context_window(&self) -> Option<u32> {
        self.context_window
    }

    fn max_tokens(&self) -> Option<u32> {
        self.params.max_tokens
    }

    async fn complete(&self, req: ChatRequest) -> Result<EventStream, WoloError> {
        let body = build_request_body(&self.model, &req, &self.params);
        debug!(
            model = %self.model,
            message_count = req.messages.len(),
            tool_count = req.tools.len(),
            "sending completion request"
        );

        let resp = self
            .client
            .post(&self.chat_url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                WoloError::llm(format!("request failed: {e}"))
                    .with_context("model", self.model.clone())
            })?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let text = resp.text().await.unwrap_or_default();
            return Err(WoloError::llm(format!("HTTP {status}: {text}"))
                .with_context("kind", "http_error")
                .with_context("status", status.to_string())
                .with_context("model", self.model.clone()));
        }

        let byte_stream = resp.bytes_stream();
        let event_stream = byte_stream
            .scan(SseDecoder::default(), |decoder, chunk| {
                let events = match chunk {
                    Ok(bytes) => decoder.push_bytes(&bytes),
                    Err(e) => vec![Err(WoloError::llm(format!("stream read failed: {e}"))
                        .with_context("kind", "malformed_stream"))],
                };
                std::future::ready(Some(events))
            })
            .flat_map(futures::stream::iter);

        Ok(Box::pin(event_stream))
    }
}

/// Incremental SSE decoder.  Holds the partial trailing line between chunks.
#[derive(Default)]
struct SseDecoder {
    buf: String,
}

impl SseDecoder {
    fn push_bytes(&mut self, bytes: &[u8]) -> Vec<Result<StreamEvent, WoloError>> {
        self.buf.push_str(&String::from_utf8_lossy(bytes));
        drain_complete_sse_lines(&mut self.buf)
    }
}

/// Drain all complete `\n`-terminated SSE lines from `buf`.
///
/// Any trailing incomplete line is left in `buf` so the next TCP chunk can
/// extend it.
pub(crate) fn drain_complete_sse_lines(buf: &mut String) -> Vec<Result<StreamEvent, WoloError>> {
    let mut events = Vec::new();
    while let Some(nl_pos) = buf.find('\n') {
        let line = buf[..nl_pos].trim_end_matches('\r').to_string();
        *buf = buf[nl_pos + 1..].to_string();
        events.extend(parse_sse_data_line(&line));
    }
    events
}

/// Parse one complete SSE `data:` line into zero or more events.
///
/// Empty lines and comment lines are skipped; an unparseable data payload is
/// a malformed stream and fails the turn.
fn parse_sse_data_line(line: &str) -> Vec<Result<StreamEvent, WoloError>> {
    let Some(data) = line.strip_prefix("data: ").map(str::trim) else {
        return vec![];
    };
    if data.is_empty() {
        return vec![];
    }
    if data == "[DONE]" {
        return vec![Ok(StreamEvent::Done)];
    }
    match serde_json::from_str::<Value>(data) {
        Ok(v) => parse_sse_chunk(&v),
        Err(e) => vec![Err(WoloError::llm(format!("malformed stream chunk: {e}"))
            .with_context("kind", "malformed_stream"))],
    }
}

/// Decode one parsed chunk into events.  A single chunk can carry both a
/// delta and a `finish_reason`.
fn parse_sse_chunk(v: &Value) -> Vec<Result<StreamEvent, WoloError>> {
    let mut events = Vec::new();

    // Usage-only chunk (emitted when stream_options.include_usage = true).
    if let Some(usage) = v.get("usage").filter(|u| !u.is_null()) {
        let prompt = usage["prompt_tokens"].as_u64().unwrap_or(0);
        let completion = usage["completion_tokens"].as_u64().unwrap_or(0);
        let total = usage["total_tokens"].as_u64().unwrap_or(prompt + completion);
        events.push(Ok(StreamEvent::Usage(TokenUsage {
            prompt_tokens: prompt,
            completion_tokens: completion,
            total_tokens: total,
        })));
    }

    let choice = &v["choices"][0];
    let delta = &choice["delta"];

    if let Some(tool_calls) = delta.get("tool_calls").and_then(Value::as_array) {
        for tc in tool_calls {
            events.push(Ok(StreamEvent::ToolCallDelta {
                index: tc["index"].as_u64().unwrap_or(0) as u32,
                id: tc["id"].as_str().unwrap_or("").to_string(),
                name: tc["function"]["name"].as_str().unwrap_or("").to_string(),
                arguments: tc["function"]["arguments"]
                    .as_str()
                    .unwrap_or("")
                    .to_string(),
            }));
        }
    }

    if let Some(thinking) = delta.get("reasoning_content").and_then(Value::as_str) {
        if !thinking.is_empty() {
            events.push(Ok(StreamEvent::ReasoningDelta(thinking.to_string())));
        }
    }

    if let Some(text) = delta.get("content").and_then(Value::as_str) {
        if !text.is_empty() {
            events.push(Ok(StreamEvent::TextDelta(text.to_string())));
        }
    }

    if let Some(reason) = choice["finish_reason"].as_str() {
        events.push(Ok(StreamEvent::Finish(FinishReason::from_wire(reason))));
    }

    events
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(input: &str) -> Vec<StreamEvent> {
        let mut buf = input.to_string();
        drain_complete_sse_lines(&mut buf)
            .into_iter()
            .map(|r| r.unwrap())
            .collect()
    }

    #[test]
    fn text_delta_is_decoded() {
        let events =
            decode("data: {\"choices\":[{\"delta\":{\"content\":\"hello\"}}]}\n");
        assert!(matches!(&events[0], StreamEvent::TextDelta(t) if t == "hello"));
    }

    #[test]
    fn done_sentinel_is_decoded() {
        let events = decode("data: [DONE]\n");
        assert!(matches!(events[0], StreamEvent::Done));
    }

    #[test]
    fn tool_call_delta_carries_index_id_name_args() {
        let events = decode(
            "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":2,\"id\":\"c9\",\
             \"function\":{\"name\":\"grep\",\"arguments\":\"{\\\"pa\"}}]}}]}\n",
        );
        match &events[0] {
            StreamEvent::ToolCallDelta {
                index,
                id,
                name,
                arguments,
            } => {
                assert_eq!(*index, 2);
                assert_eq!(id, "c9");
                assert_eq!(name, "grep");
                assert_eq!(arguments, "{\"pa");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn reasoning_delta_is_decoded() {
        let events = decode(
            "data: {\"choices\":[{\"delta\":{\"reasoning_content\":\"hmm\"}}]}\n",
        );
        assert!(matches!(&events[0], StreamEvent::ReasoningDelta(t) if t == "hmm"));
    }

    #[test]
    fn finish_reason_produces_finish_event() {
        let events =
            decode("data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"tool_calls\"}]}\n");
        assert!(matches!(
            events[0],
            StreamEvent::Finish(FinishReason::ToolCalls)
        ));
    }

    #[test]
    fn usage_chunk_is_decoded() {
        let events = decode(
            "data: {\"choices\":[],\"usage\":{\"prompt_tokens\":12,\"completion_tokens\":3,\
             \"total_tokens\":15}}\n",
        );
        match &events[0] {
            StreamEvent::Usage(u) => {
                assert_eq!(u.prompt_tokens, 12);
                assert_eq!(u.completion_tokens, 3);
                assert_eq!(u.total_tokens, 15);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn split_event_across_chunks_is_reassembled() {
        let mut buf = String::new();
        buf.push_str("data: {\"choices\":[{\"delta\":{\"con");
        let events = drain_complete_sse_lines(&mut buf);
        assert!(events.is_empty(), "incomplete line must not emit");
        buf.push_str("tent\":\"x\"}}]}\n");
        let events = drain_complete_sse_lines(&mut buf);
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0].as_ref().unwrap(),
            StreamEvent::TextDelta(t) if t == "x"
        ));
    }

    #[test]
    fn crlf_line_endings_are_accepted() {
        let events = decode("data: [DONE]\r\n");
        assert!(matches!(events[0], StreamEvent::Done));
    }

    #[test]
    fn comment_and_blank_lines_are_skipped() {
        let events = decode(": keep-alive\n\ndata: [DONE]\n");
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn malformed_json_is_malformed_stream_error() {
        let mut buf = "data: {nope\n".to_string();
        let events = drain_complete_sse_lines(&mut buf);
        let err = events.into_iter().next().unwrap().unwrap_err();
        assert_eq!(err.kind(), Some("malformed_stream"));
    }

    #[test]
    fn delta_and_finish_in_one_chunk_produce_two_events() {
        let events = decode(
            "data: {\"choices\":[{\"delta\":{\"content\":\"bye\"},\"finish_reason\":\"stop\"}]}\n",
        );
        assert_eq!(events.len(), 2);
        assert!(matches!(events[1], StreamEvent::Finish(FinishReason::Stop)));
    }
}
