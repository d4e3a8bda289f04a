// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::debug;

use wolo_error::WoloError;
use wolo_model::ToolPart;

use crate::tool::{require_str, Tool, ToolCategory, ToolContext, ToolSpec};
use crate::truncate;

/// Rendering width for HTML-to-text conversion.
const RENDER_WIDTH: usize = 100;

pub struct WebFetchTool {
    client: reqwest::Client,
}

impl Default for WebFetchTool {
    fn default() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Tool for WebFetchTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "webfetch".into(),
            description: "Fetch a URL. HTML pages are converted to the requested format: \
                          'text' (rendered plain text), 'markdown' (text with link and \
                          emphasis markers), or 'html' (raw body)."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "url": {
                        "type": "string",
                        "description": "HTTP or HTTPS URL to fetch"
                    },
                    "format": {
                        "type": "string",
                        "enum": ["text", "markdown", "html"],
                        "description": "Output format (default text)"
                    }
                },
                "required": ["url"]
            }),
            category: ToolCategory::Web,
            icon: "🌐",
            show_output: false,
        }
    }

    fn read_only(&self) -> bool {
        true
    }

    fn brief(&self, input: &Map<String, Value>) -> Option<String> {
        input
            .get("url")
            .and_then(Value::as_str)
            .map(|u| format!("fetch {u}"))
    }

    async fn execute(&self, part: &mut ToolPart, _ctx: &ToolContext) -> Result<(), WoloError> {
        let Some(url) = require_str(part, "url") else {
            return Ok(());
        };
        let format = part
            .input
            .get("format")
            .and_then(Value::as_str)
            .unwrap_or("text")
            .to_string();
        if !matches!(format.as_str(), "text" | "markdown" | "html") {
            part.fail(format!(
                "unknown format '{format}'; expected text, markdown, or html"
            ));
            return Ok(());
        }
        if !url.starts_with("http://") && !url.starts_with("https://") {
            part.fail(format!("unsupported URL scheme in '{url}'"));
            return Ok(());
        }

        debug!(url = %url, format = %format, "webfetch tool");

        let resp = match self.client.get(&url).send().await {
            Ok(r) => r,
            Err(e) => {
                part.fail(format!("fetch failed: {e}"));
                return Ok(());
            }
        };
        let status = resp.status();
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let body = match resp.text().await {
            Ok(b) => b,
            Err(e) => {
                part.fail(format!("reading response body failed: {e}"));
                return Ok(());
            }
        };
        if !status.is_success() {
            part.set_meta("status", json!(status.as_u16()));
            part.fail(format!("HTTP {status} fetching {url}"));
            return Ok(());
        }

        let is_html = content_type.contains("html")
            || body.trim_start().to_lowercase().starts_with("<!doctype html")
            || body.trim_start().to_lowercase().starts_with("<html");

        let rendered = match (format.as_str(), is_html) {
            ("html", _) | (_, false) => body,
            // html2text renders links/emphasis with markdown-style markers,
            // which covers both the text and markdown formats.
            ("markdown", true) | ("text", true) => {
                html2text::from_read(body.as_bytes(), RENDER_WIDTH)
            }
            _ => body,
        };

        part.set_meta("status", json!(status.as_u16()));
        part.set_meta("content_type", json!(content_type));
        let (output, meta) = truncate::apply_ceiling(&rendered);
        for (k, v) in meta {
            part.set_meta(&k, v);
        }
        part.complete(output);
        Ok(())
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::test_context;
    use wolo_model::ToolStatus;

    fn part_with(args: Value) -> ToolPart {
        ToolPart::new(
            "wf1",
            "webfetch",
            args.as_object().cloned().unwrap_or_default(),
        )
    }

    #[tokio::test]
    async fn rejects_non_http_schemes() {
        let (_dir, ctx) = test_context();
        let mut part = part_with(json!({"url": "file:///etc/passwd"}));
        WebFetchTool::default().execute(&mut part, &ctx).await.unwrap();
        assert_eq!(part.status, ToolStatus::Failed);
        assert!(part.output.contains("unsupported URL scheme"));
    }

    #[tokio::test]
    async fn rejects_unknown_format() {
        let (_dir, ctx) = test_context();
        let mut part = part_with(json!({"url": "https://example.com", "format": "pdf"}));
        WebFetchTool::default().execute(&mut part, &ctx).await.unwrap();
        assert_eq!(part.status, ToolStatus::Failed);
        assert!(part.output.contains("unknown format"));
    }

    #[tokio::test]
    async fn unreachable_host_fails_cleanly() {
        let (_dir, ctx) = test_context();
        let mut part = part_with(json!({
            "url": "http://127.0.0.1:1/nothing-listens-here"
        }));
        WebFetchTool::default().execute(&mut part, &ctx).await.unwrap();
        assert_eq!(part.status, ToolStatus::Failed);
        assert!(part.output.contains("fetch failed"));
    }

    #[test]
    fn html_detection_and_conversion() {
        let html = "<html><body><h1>Title</h1><p>Some <b>bold</b> text.</p></body></html>";
        let text = html2text::from_read(html.as_bytes(), RENDER_WIDTH);
        assert!(text.contains("Title"));
        assert!(text.contains("bold"));
        assert!(!text.contains("<h1>"));
    }
}
