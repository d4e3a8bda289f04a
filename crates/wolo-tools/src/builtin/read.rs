// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::debug;

use wolo_error::WoloError;
use wolo_model::ToolPart;

use crate::tool::{require_str, Tool, ToolCategory, ToolContext, ToolSpec};

/// Default number of lines returned when no limit is given.
const DEFAULT_LIMIT: usize = 2000;

pub struct ReadTool;

#[async_trait]
impl Tool for ReadTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "read".into(),
            description: "Read a text file from the local filesystem. \
                          Returns content with 1-based line numbers in the form 'NNNNN| line'. \
                          Use offset (1-based first line) and limit for large files. \
                          Binary files are rejected."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "file_path": {
                        "type": "string",
                        "description": "Absolute or workdir-relative path to the file"
                    },
                    "offset": {
                        "type": "integer",
                        "description": "1-based line number to start from (default 1)"
                    },
                    "limit": {
                        "type": "integer",
                        "description": "Maximum number of lines to return (default 2000)"
                    }
                },
                "required": ["file_path"]
            }),
            category: ToolCategory::File,
            icon: "📄",
            show_output: false,
        }
    }

    fn read_only(&self) -> bool {
        true
    }

    fn brief(&self, input: &Map<String, Value>) -> Option<String> {
        input
            .get("file_path")
            .and_then(Value::as_str)
            .map(|p| format!("read {p}"))
    }

    async fn execute(&self, part: &mut ToolPart, ctx: &ToolContext) -> Result<(), WoloError> {
        let Some(raw_path) = require_str(part, "file_path") else {
            return Ok(());
        };
        let path = ctx.workdir.join(&raw_path);
        let offset = part
            .input
            .get("offset")
            .and_then(Value::as_u64)
            .map(|n| n.max(1) as usize)
            .unwrap_or(1);
        let limit = part
            .input
            .get("limit")
            .and_then(Value::as_u64)
            .map(|n| n as usize)
            .unwrap_or(DEFAULT_LIMIT);

        debug!(path = %path.display(), offset, limit, "read tool");

        let bytes = match tokio::fs::read(&path).await {
            Ok(b) => b,
            Err(e) => {
                part.set_meta("error", json!("file_not_found"));
                part.fail(format!("cannot read {}: {e}", path.display()));
                return Ok(());
            }
        };
        if looks_binary(&bytes) {
            part.set_meta("error", json!("binary_refused"));
            part.fail(format!(
                "{} looks like a binary file; reading it is refused",
                path.display()
            ));
            return Ok(());
        }
        let content = String::from_utf8_lossy(&bytes);

        let total_lines = content.lines().count();
        let mut out = String::new();
        let mut shown = 0usize;
        for (idx, line) in content.lines().enumerate() {
            let n = idx + 1;
            if n < offset {
                continue;
            }
            if shown >= limit {
                break;
            }
            out.push_str(&format!("{n:>5}| {line}\n"));
            shown += 1;
        }
        if out.is_empty() && total_lines > 0 {
            part.fail(format!(
                "offset {offset} is past the end of the file ({total_lines} lines)"
            ));
            return Ok(());
        }

        ctx.file_times.lock().unwrap().record(&path);

        part.set_meta("total_lines", json!(total_lines));
        if offset + shown <= total_lines {
            part.set_meta("truncated", json!(true));
            part.set_meta("tail_start_line", json!(offset + shown));
            out.push_str(&format!(
                "[{} more lines; use offset={} to continue]\n",
                total_lines - (offset - 1) - shown,
                offset + shown
            ));
        }
        part.complete(out);
        Ok(())
    }
}

/// A file is treated as binary when its first 8 KiB contain a NUL byte.
fn looks_binary(bytes: &[u8]) -> bool {
    bytes.iter().take(8192).any(|&b| b == 0)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
