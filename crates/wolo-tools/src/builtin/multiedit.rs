// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::debug;

use wolo_error::WoloError;
use wolo_model::ToolPart;

use crate::builtin::edit::{apply_text_edit, diff_summary};
use crate::safety::{deny_part, Authorization, Operation};
use crate::tool::{Tool, ToolCategory, ToolContext, ToolSpec};

pub struct MultiEditTool;

#[async_trait]
impl Tool for MultiEditTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "multiedit".into(),
            description: "Apply several text replacements in one call. Each edit is \
                          {file_path, old_text, new_text} and is applied in order; each \
                          file goes through the path-safety check independently. \
                          Returns one result line per edit."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "edits": {
                        "type": "array",
                        "description": "Ordered list of edits to apply",
                        "items": {
                            "type": "object",
                            "properties": {
                                "file_path": {"type": "string"},
                                "old_text": {"type": "string"},
                                "new_text": {"type": "string"}
                            },
                            "required": ["file_path", "old_text", "new_text"]
                        }
                    }
                },
                "required": ["edits"]
            }),
            category: ToolCategory::File,
            icon: "🔧",
            show_output: true,
        }
    }

    fn brief(&self, input: &Map<String, Value>) -> Option<String> {
        input
            .get("edits")
            .and_then(Value::as_array)
            .map(|e| format!("multiedit ({} edits)", e.len()))
    }

    async fn execute(&self, part: &mut ToolPart, ctx: &ToolContext) -> Result<(), WoloError> {
        let Some(edits) = part.input.get("edits").and_then(Value::as_array).cloned() else {
            part.fail("missing required parameter 'edits'");
            return Ok(());
        };
        if edits.is_empty() {
            part.fail("'edits' must contain at least one edit");
            return Ok(());
        }

        let mut lines: Vec<String> = Vec::with_capacity(edits.len());
        let mut applied = 0usize;
        let mut failed = 0usize;
        let mut total_additions = 0usize;
        let mut total_deletions = 0usize;
        let mut denied_by_user = false;

        for (i, edit) in edits.iter().enumerate() {
            let (Some(raw_path), Some(old_text), Some(new_text)) = (
                edit.get("file_path").and_then(Value::as_str),
                edit.get("old_text").and_then(Value::as_str),
                edit.get("new_text").and_then(Value::as_str),
            ) else {
                failed += 1;
                lines.push(format!(
                    "edit {}: malformed (file_path, old_text, new_text are required)",
                    i + 1
                ));
                continue;
            };
            let path = ctx.workdir.join(raw_path);
            debug!(path = %path.display(), step = i + 1, "multiedit step");

            // Each per-file step goes through the middleware independently.
            // A Quit answer aborts the whole call by propagating the
            // cancellation out of the loop.
            match ctx.guard.authorize(&path, Operation::MultiEdit).await? {
                Authorization::Denied {
                    reason,
                    metadata_key,
                } => {
                    failed += 1;
                    if metadata_key == crate::safety::META_DENIED_BY_USER {
                        denied_by_user = true;
                    }
                    part.set_meta(metadata_key, json!(true));
                    lines.push(format!("{raw_path}: denied ({reason})"));
                    continue;
                }
                Authorization::Allowed => {}
            }

            let before = match tokio::fs::read_to_string(&path).await {
                Ok(c) => c,
                Err(e) => {
                    failed += 1;
                    lines.push(format!("{raw_path}: cannot read ({e})"));
                    continue;
                }
            };
            if let Some(reason) = ctx.file_times.lock().unwrap().external_change(&path) {
                failed += 1;
                lines.push(format!("{raw_path}: {reason}"));
                continue;
            }
            match apply_text_edit(&before, old_text, new_text) {
                Ok(after) => {
                    if let Err(e) = tokio::fs::write(&path, after.as_bytes()).await {
                        failed += 1;
                        lines.push(format!("{raw_path}: write failed ({e})"));
                        continue;
                    }
                    ctx.file_times.lock().unwrap().record(&path);
                    let (_, additions, deletions) = diff_summary(&before, &after, raw_path);
                    total_additions += additions;
                    total_deletions += deletions;
                    applied += 1;
                    lines.push(format!("{raw_path}: +{additions} -{deletions}"));
                }
                Err(e) => {
                    failed += 1;
                    lines.push(format!("{raw_path}: {} ({})", e.message(), e.code()));
                }
            }
        }

        part.set_meta("applied", json!(applied));
        part.set_meta("failed", json!(failed));
        part.set_meta("additions", json!(total_additions));
        part.set_meta("deletions", json!(total_deletions));

        let summary = format!(
            "{}\n{applied} edit(s) applied, {failed} failed",
            lines.join("\n")
        );
        if denied_by_user {
            deny_part(part, "one or more files were denied by the user", crate::safety::META_DENIED_BY_USER);
            part.output = summary;
        } else if failed > 0 {
            part.fail(summary);
        } else {
            part.complete(summary);
        }
        Ok(())
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{denying_context, test_context};
    use wolo_model::ToolStatus;

    fn part_with(args: Value) -> ToolPart {
        ToolPart::new(
            "me1",
            "multiedit",
            args.as_object().cloned().unwrap_or_default(),
        )
    }

    #[tokio::test]
    async fn applies_edits_in_order_across_files() {
        let (_dir, ctx) = test_context();
        std::fs::write(ctx.workdir.join("a.txt"), "one\n").unwrap();
        std::fs::write(ctx.workdir.join("b.txt"), "two\n").unwrap();
        let mut part = part_with(json!({
            "edits": [
                {"file_path": "a.txt", "old_text": "one", "new_text": "ONE"},
                {"file_path": "b.txt", "old_text": "two", "new_text": "TWO"}
            ]
        }));
        MultiEditTool.execute(&mut part, &ctx).await.unwrap();
        assert_eq!(part.status, ToolStatus::Completed, "{}", part.output);
        assert_eq!(
            std::fs::read_to_string(ctx.workdir.join("a.txt")).unwrap(),
            "ONE\n"
        );
        assert_eq!(
            std::fs::read_to_string(ctx.workdir.join("b.txt")).unwrap(),
            "TWO\n"
        );
        assert_eq!(part.metadata["applied"], json!(2));
        assert!(part.output.contains("a.txt: +1 -1"));
    }

    #[tokio::test]
    async fn later_edit_sees_earlier_result_in_same_file() {
        let (_dir, ctx) = test_context();
        std::fs::write(ctx.workdir.join("f.txt"), "start\n").unwrap();
        let mut part = part_with(json!({
            "edits": [
                {"file_path": "f.txt", "old_text": "start", "new_text": "middle"},
                {"file_path": "f.txt", "old_text": "middle", "new_text": "end"}
            ]
        }));
        MultiEditTool.execute(&mut part, &ctx).await.unwrap();
        assert_eq!(part.status, ToolStatus::Completed, "{}", part.output);
        assert_eq!(
            std::fs::read_to_string(ctx.workdir.join("f.txt")).unwrap(),
            "end\n"
        );
    }

    #[tokio::test]
    async fn failed_match_is_reported_per_file_and_fails_part() {
        let (_dir, ctx) = test_context();
        std::fs::write(ctx.workdir.join("a.txt"), "one\n").unwrap();
        let mut part = part_with(json!({
            "edits": [
                {"file_path": "a.txt", "old_text": "one", "new_text": "ONE"},
                {"file_path": "a.txt", "old_text": "absent", "new_text": "x"}
            ]
        }));
        MultiEditTool.execute(&mut part, &ctx).await.unwrap();
        assert_eq!(part.status, ToolStatus::Failed);
        // first edit still landed
        assert_eq!(
            std::fs::read_to_string(ctx.workdir.join("a.txt")).unwrap(),
            "ONE\n"
        );
        assert!(part.output.contains("text_not_found"), "{}", part.output);
        assert_eq!(part.metadata["applied"], json!(1));
        assert_eq!(part.metadata["failed"], json!(1));
    }

    #[tokio::test]
    async fn denied_file_marks_part_denied() {
        let (_dir, ctx) = denying_context();
        std::fs::write(ctx.workdir.join("ok.txt"), "fine\n").unwrap();
        let mut part = part_with(json!({
            "edits": [
                {"file_path": "ok.txt", "old_text": "fine", "new_text": "FINE"},
                {"file_path": "/not-allowed/x.txt", "old_text": "a", "new_text": "b"}
            ]
        }));
        MultiEditTool.execute(&mut part, &ctx).await.unwrap();
        assert_eq!(part.status, ToolStatus::Failed);
        assert_eq!(
            part.metadata.get(crate::safety::META_DENIED_BY_USER),
            Some(&json!(true))
        );
        // the allowed edit was still applied before the denial line
        assert_eq!(
            std::fs::read_to_string(ctx.workdir.join("ok.txt")).unwrap(),
            "FINE\n"
        );
        assert!(part.output.contains("denied"));
    }

    #[tokio::test]
    async fn missing_edits_parameter_fails() {
        let (_dir, ctx) = test_context();
        let mut part = part_with(json!({}));
        MultiEditTool.execute(&mut part, &ctx).await.unwrap();
        assert_eq!(part.status, ToolStatus::Failed);
    }
}
