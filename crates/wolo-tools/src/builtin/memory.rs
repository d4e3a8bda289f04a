// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Map, Value};
use tracing::debug;

use wolo_error::WoloError;
use wolo_model::ToolPart;

use crate::tool::{require_str, Tool, ToolCategory, ToolContext, ToolSpec};

/// Appends notes to the user-scope memory file, outside any session.
pub struct MemoryTool {
    memory_file: PathBuf,
}

impl MemoryTool {
    pub fn new(memory_file: PathBuf) -> Self {
        Self { memory_file }
    }
}

#[async_trait]
impl Tool for MemoryTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "memory".into(),
            description: "Append a note to the user's persistent memory. Notes survive \
                          across sessions. Use tags to make notes findable later."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "content": {
                        "type": "string",
                        "description": "The note to remember"
                    },
                    "tags": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "Optional labels, e.g. [\"project\", \"preference\"]"
                    }
                },
                "required": ["content"]
            }),
            category: ToolCategory::Knowledge,
            icon: "🧠",
            show_output: false,
        }
    }

    async fn execute(&self, part: &mut ToolPart, _ctx: &ToolContext) -> Result<(), WoloError> {
        let Some(content) = require_str(part, "content") else {
            return Ok(());
        };
        let tags: Vec<String> = part
            .input
            .get("tags")
            .and_then(Value::as_array)
            .map(|a| {
                a.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        debug!(file = %self.memory_file.display(), "memory tool");

        let tag_str = if tags.is_empty() {
            String::new()
        } else {
            format!(" [{}]", tags.join(", "))
        };
        let line = format!(
            "- {}{}  {}\n",
            Utc::now().format("%Y-%m-%d"),
            tag_str,
            content.replace('\n', "\n  ")
        );

        if let Some(parent) = self.memory_file.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                part.fail(format!("cannot create memory dir: {e}"));
                return Ok(());
            }
        }
        let existing = tokio::fs::read_to_string(&self.memory_file)
            .await
            .unwrap_or_default();
        match tokio::fs::write(&self.memory_file, format!("{existing}{line}")).await {
            Ok(()) => {
                part.set_meta("tags", json!(tags));
                part.complete("noted");
            }
            Err(e) => part.fail(format!("cannot write memory file: {e}")),
        }
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
            "m1",
            "memory",
            args.as_object().cloned().unwrap_or_default(),
        )
    }

    #[tokio::test]
    async fn appends_dated_note() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("memory.md");
        let (_d, ctx) = test_context();
        let tool = MemoryTool::new(file.clone());
        let mut part = part_with(json!({"content": "prefers rebase over merge"}));
        tool.execute(&mut part, &ctx).await.unwrap();
        assert_eq!(part.status, ToolStatus::Completed);
        let body = std::fs::read_to_string(&file).unwrap();
        assert!(body.contains("prefers rebase over merge"));
        assert!(body.starts_with("- 2"), "note should start with a date: {body}");
    }

    #[tokio::test]
    async fn notes_accumulate_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("memory.md");
        let (_d, ctx) = test_context();
        let tool = MemoryTool::new(file.clone());
        for note in ["first", "second"] {
            let mut part = part_with(json!({"content": note}));
            tool.execute(&mut part, &ctx).await.unwrap();
        }
        let body = std::fs::read_to_string(&file).unwrap();
        let first = body.find("first").unwrap();
        let second = body.find("second").unwrap();
        assert!(first < second);
    }

    #[tokio::test]
    async fn tags_are_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("memory.md");
        let (_d, ctx) = test_context();
        let tool = MemoryTool::new(file.clone());
        let mut part = part_with(json!({
            "content": "uses nushell",
            "tags": ["environment", "shell"]
        }));
        tool.execute(&mut part, &ctx).await.unwrap();
        let body = std::fs::read_to_string(&file).unwrap();
        assert!(body.contains("[environment, shell]"));
        assert_eq!(part.metadata["tags"], json!(["environment", "shell"]));
    }
}
