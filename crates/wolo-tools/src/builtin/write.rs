// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::debug;

use wolo_error::WoloError;
use wolo_model::ToolPart;

use crate::safety::Operation;
use crate::tool::{require_str, Tool, ToolCategory, ToolContext, ToolSpec};

pub struct WriteTool;

#[async_trait]
impl Tool for WriteTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "write".into(),
            description: "Write a file to the local filesystem, overwriting any existing \
                          content. Prefer edit for changing existing files. Parent \
                          directories are created automatically. Fails when the file was \
                          modified externally since the agent last read it."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "file_path": {
                        "type": "string",
                        "description": "Absolute or workdir-relative path to the file"
                    },
                    "content": {
                        "type": "string",
                        "description": "Full content to write"
                    }
                },
                "required": ["file_path", "content"]
            }),
            category: ToolCategory::File,
            icon: "✏️",
            show_output: false,
        }
    }

    fn brief(&self, input: &Map<String, Value>) -> Option<String> {
        input
            .get("file_path")
            .and_then(Value::as_str)
            .map(|p| format!("write {p}"))
    }

    async fn execute(&self, part: &mut ToolPart, ctx: &ToolContext) -> Result<(), WoloError> {
        let Some(raw_path) = require_str(part, "file_path") else {
            return Ok(());
        };
        let Some(content) = require_str(part, "content") else {
            return Ok(());
        };
        let path = ctx.workdir.join(&raw_path);
        debug!(path = %path.display(), bytes = content.len(), "write tool");

        // Stale check before the (possibly interactive) path gate so the
        // model gets the conflict answer even when the path needs confirming.
        if let Some(reason) = ctx.file_times.lock().unwrap().external_change(&path) {
            part.set_meta("error", json!("external_modification"));
            part.fail(reason);
            return Ok(());
        }

        let file_times = ctx.file_times.clone();
        let target = path.clone();
        ctx.guard
            .execute_with_path_check(part, &path, Operation::Write, move || async move {
                if let Some(parent) = target.parent() {
                    if !parent.as_os_str().is_empty() {
                        tokio::fs::create_dir_all(parent)
                            .await
                            .map_err(|e| format!("cannot create parent dirs: {e}"))?;
                    }
                }
                tokio::fs::write(&target, content.as_bytes())
                    .await
                    .map_err(|e| format!("write failed: {e}"))?;
                file_times.lock().unwrap().record(&target);
                let mut meta = Map::new();
                meta.insert("bytes".into(), json!(content.len()));
                Ok((
                    format!("Wrote {} bytes to {}", content.len(), target.display()),
                    meta,
                ))
            })
            .await
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
