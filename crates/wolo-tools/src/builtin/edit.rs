// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Smart text replacement with a matcher cascade.
//!
//! Matching strategies, tried in order:
//! 1. exact substring
//! 2. whitespace-normalized line match (trailing/internal runs collapsed)
//! 3. indentation-flexible match (common leading indent stripped on both
//!    sides; replacement re-indented to the file's depth)
//!
//! A unique match applies; zero matches and ambiguous matches are structured
//! failures the model can act on.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use similar::{ChangeTag, TextDiff};
use tracing::debug;

use wolo_error::WoloError;
use wolo_model::ToolPart;

use crate::safety::Operation;
use crate::tool::{require_str, Tool, ToolCategory, ToolContext, ToolSpec};

/// Why an edit could not be applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditError {
    /// `old_text` matched nothing, under any strategy.
    NotFound,
    /// `old_text` matched more than once at the best strategy level.
    Ambiguous { count: usize },
    EmptyOldText,
}

impl EditError {
    pub fn code(&self) -> &'static str {
        match self {
            EditError::NotFound => "text_not_found",
            EditError::Ambiguous { .. } => "multiple_matches",
            EditError::EmptyOldText => "text_not_found",
        }
    }

    pub fn message(&self) -> String {
        match self {
            EditError::NotFound => {
                "old_text was not found in the file; re-read it and copy the text exactly"
                    .to_string()
            }
            EditError::Ambiguous { count } => format!(
                "old_text matches {count} locations; include more surrounding lines to make it unique"
            ),
            EditError::EmptyOldText => "old_text must not be empty".to_string(),
        }
    }
}

/// Apply the matcher cascade, returning the new file content.
pub fn apply_text_edit(content: &str, old_text: &str, new_text: &str) -> Result<String, EditError> {
    if old_text.is_empty() {
        return Err(EditError::EmptyOldText);
    }

    // Strategy 1: exact substring.
    let exact = content.match_indices(old_text).count();
    match exact {
        1 => return Ok(content.replacen(old_text, new_text, 1)),
        0 => {}
        n => return Err(EditError::Ambiguous { count: n }),
    }

    let file_lines: Vec<&str> = content.lines().collect();
    let old_lines: Vec<&str> = old_text.lines().collect();
    if old_lines.is_empty() || file_lines.len() < old_lines.len() {
        return Err(EditError::NotFound);
    }
    let n = old_lines.len();

    let old_indent = common_indent(&old_lines);

    // Strategy 2: whitespace-normalized line comparison (indent included).
    // The replacement is re-indented by the depth difference between the
    // matched window and old_text, so an indent-shifted match still produces
    // correctly nested code.
    let norm_old: Vec<String> = old_lines.iter().map(|l| normalize_ws(l)).collect();
    let ws_hits: Vec<usize> = (0..=(file_lines.len() - n))
        .filter(|&i| {
            file_lines[i..i + n]
                .iter()
                .map(|l| normalize_ws(l))
                .eq(norm_old.iter().cloned())
        })
        .collect();
    if ws_hits.len() == 1 {
        let pos = ws_hits[0];
        let win_indent = common_indent(&file_lines[pos..pos + n]);
        let delta = win_indent as i64 - old_indent as i64;
        let replacement: Vec<String> = new_text.lines().map(|l| adjust_indent(l, delta)).collect();
        return Ok(splice_lines(content, &file_lines, pos, n, replacement));
    }

    // Strategy 3: indentation-flexible exact comparison.  Stricter than the
    // normalized match on line content, so it can break a tie strategy 2
    // could not.
    let stripped_old: Vec<String> = strip_indent(&old_lines, old_indent);
    let indent_hits: Vec<(usize, usize)> = (0..=(file_lines.len() - n))
        .filter_map(|i| {
            let window = &file_lines[i..i + n];
            let win_indent = common_indent(window);
            if strip_indent(window, win_indent) == stripped_old {
                Some((i, win_indent))
            } else {
                None
            }
        })
        .collect();
    match indent_hits.len() {
        1 => {
            let (pos, win_indent) = indent_hits[0];
            let delta = win_indent as i64 - old_indent as i64;
            let replacement: Vec<String> = new_text
                .lines()
                .map(|l| adjust_indent(l, delta))
                .collect();
            Ok(splice_lines(content, &file_lines, pos, n, replacement))
        }
        0 if ws_hits.len() > 1 => Err(EditError::Ambiguous {
            count: ws_hits.len(),
        }),
        0 => Err(EditError::NotFound),
        count => Err(EditError::Ambiguous { count }),
    }
}

/// Collapse every whitespace run to one space and trim the ends.
fn normalize_ws(line: &str) -> String {
    line.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Minimum leading-space count across non-empty lines.
fn common_indent(lines: &[&str]) -> usize {
    lines
        .iter()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.len() - l.trim_start().len())
        .min()
        .unwrap_or(0)
}

fn strip_indent(lines: &[&str], indent: usize) -> Vec<String> {
    lines
        .iter()
        .map(|l| {
            if l.len() >= indent {
                l[indent..].to_string()
            } else {
                l.trim_start().to_string()
            }
        })
        .collect()
}

fn adjust_indent(line: &str, delta: i64) -> String {
    if delta == 0 || line.trim().is_empty() {
        return line.to_string();
    }
    if delta > 0 {
        format!("{}{line}", " ".repeat(delta as usize))
    } else {
        let remove = (-delta) as usize;
        if line.len() >= remove && line[..remove].bytes().all(|b| b == b' ') {
            line[remove..].to_string()
        } else {
            line.trim_start_matches(' ').to_string()
        }
    }
}

/// Replace `count` lines starting at `pos` with `replacement`, preserving
/// the original trailing-newline state.
fn splice_lines(
    original: &str,
    file_lines: &[&str],
    pos: usize,
    count: usize,
    replacement: Vec<String>,
) -> String {
    let mut out: Vec<String> = Vec::with_capacity(file_lines.len());
    out.extend(file_lines[..pos].iter().map(|s| s.to_string()));
    out.extend(replacement);
    out.extend(file_lines[pos + count..].iter().map(|s| s.to_string()));
    let mut joined = out.join("\n");
    if original.ends_with('\n') {
        joined.push('\n');
    }
    joined
}

/// Unified diff plus line-change counts for the result metadata.
pub fn diff_summary(before: &str, after: &str, path: &str) -> (String, usize, usize) {
    let diff = TextDiff::from_lines(before, after);
    let mut additions = 0usize;
    let mut deletions = 0usize;
    for change in diff.iter_all_changes() {
        match change.tag() {
            ChangeTag::Insert => additions += 1,
            ChangeTag::Delete => deletions += 1,
            ChangeTag::Equal => {}
        }
    }
    let text = diff
        .unified_diff()
        .context_radius(3)
        .header(&format!("a/{path}"), &format!("b/{path}"))
        .to_string();
    (text, additions, deletions)
}

pub struct EditTool;

#[async_trait]
impl Tool for EditTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "edit".into(),
            description: "Replace old_text with new_text in a file. old_text must match \
                          exactly once; whitespace and indentation differences are \
                          corrected automatically when the match is otherwise unique. \
                          Returns a unified diff of the change."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "file_path": {
                        "type": "string",
                        "description": "Absolute or workdir-relative path to the file"
                    },
                    "old_text": {
                        "type": "string",
                        "description": "Text to find (must be unique in the file)"
                    },
                    "new_text": {
                        "type": "string",
                        "description": "Replacement text"
                    }
                },
                "required": ["file_path", "old_text", "new_text"]
            }),
            category: ToolCategory::File,
            icon: "🔧",
            show_output: true,
        }
    }

    fn brief(&self, input: &Map<String, Value>) -> Option<String> {
        input
            .get("file_path")
            .and_then(Value::as_str)
            .map(|p| format!("edit {p}"))
    }

    async fn execute(&self, part: &mut ToolPart, ctx: &ToolContext) -> Result<(), WoloError> {
        let Some(raw_path) = require_str(part, "file_path") else {
            return Ok(());
        };
        let Some(old_text) = require_str(part, "old_text") else {
            return Ok(());
        };
        let Some(new_text) = require_str(part, "new_text") else {
            return Ok(());
        };
        let path = ctx.workdir.join(&raw_path);
        debug!(path = %path.display(), "edit tool");

        let before = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) => {
                part.set_meta("error", json!("file_not_found"));
                part.fail(format!("cannot read {}: {e}", path.display()));
                return Ok(());
            }
        };
        if let Some(reason) = ctx.file_times.lock().unwrap().external_change(&path) {
            part.set_meta("error", json!("external_modification"));
            part.fail(reason);
            return Ok(());
        }

        let after = match apply_text_edit(&before, &old_text, &new_text) {
            Ok(a) => a,
            Err(e) => {
                part.set_meta("error", json!(e.code()));
                part.fail(e.message());
                return Ok(());
            }
        };
        let (diff_text, additions, deletions) = diff_summary(&before, &after, &raw_path);

        let file_times = ctx.file_times.clone();
        let target = path.clone();
        ctx.guard
            .execute_with_path_check(part, &path, Operation::Edit, move || async move {
                tokio::fs::write(&target, after.as_bytes())
                    .await
                    .map_err(|e| format!("write failed: {e}"))?;
                file_times.lock().unwrap().record(&target);
                let mut meta = Map::new();
                meta.insert("additions".into(), json!(additions));
                meta.insert("deletions".into(), json!(deletions));
                Ok((diff_text, meta))
            })
            .await
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::test_context;
    use wolo_model::ToolStatus;

    fn part_with(args: Value) -> ToolPart {
        ToolPart::new("e1", "edit", args.as_object().cloned().unwrap_or_default())
    }

    // ── cascade unit tests ───────────────────────────────────────────────────

    #[test]
    fn exact_match_replaces_once() {
        let out = apply_text_edit("fn a() { old(); }\n", "old()", "new()").unwrap();
        assert_eq!(out, "fn a() { new(); }\n");
    }

    #[test]
    fn exact_ambiguous_is_rejected_with_count() {
        let err = apply_text_edit("x(); x();\n", "x()", "y()").unwrap_err();
        assert_eq!(err, EditError::Ambiguous { count: 2 });
        assert_eq!(err.code(), "multiple_matches");
    }

    #[test]
    fn whitespace_normalized_match_applies() {
        // file uses tabs + double spaces; old_text uses single spaces
        let content = "fn  main()\t{\n\tdo_work( );\n}\n";
        let out = apply_text_edit(content, "fn main() {\ndo_work( );\n}", "fn main() {}").unwrap();
        assert!(out.contains("fn main() {}"), "{out}");
    }

    #[test]
    fn indentation_flexible_match_reindents_replacement() {
        let content = "    fn foo() {\n        old();\n    }\n";
        let out = apply_text_edit(
            content,
            "fn foo() {\n    old();\n}",
            "fn foo() {\n    new();\n}",
        )
        .unwrap();
        assert!(out.contains("        new();"), "replacement not re-indented: {out}");
        assert!(out.contains("    fn foo() {"), "{out}");
    }

    #[test]
    fn no_match_is_text_not_found() {
        let err = apply_text_edit("hello\n", "absent", "x").unwrap_err();
        assert_eq!(err, EditError::NotFound);
        assert_eq!(err.code(), "text_not_found");
    }

    #[test]
    fn empty_old_text_is_rejected() {
        assert_eq!(
            apply_text_edit("a", "", "b").unwrap_err(),
            EditError::EmptyOldText
        );
    }

    #[test]
    fn trailing_newline_is_preserved_by_line_splice() {
        let content = "  a\n  b\n  c\n";
        let out = apply_text_edit(content, "a\nb", "z").unwrap();
        assert!(out.ends_with('\n'));
        assert!(out.contains("z"));
        assert!(out.contains("  c"));
    }

    #[test]
    fn diff_counts_additions_and_deletions() {
        let (text, adds, dels) = diff_summary("a\nb\nc\n", "a\nB\nc\nd\n", "f.txt");
        assert_eq!(adds, 2); // B and d
        assert_eq!(dels, 1); // b
        assert!(text.contains("-b"));
        assert!(text.contains("+B"));
        assert!(text.contains("a/f.txt"));
    }

    // ── tool-level tests ─────────────────────────────────────────────────────

    #[tokio::test]
    async fn edit_writes_file_and_emits_diff() {
        let (_dir, ctx) = test_context();
        std::fs::write(ctx.workdir.join("m.rs"), "fn main() { old(); }\n").unwrap();
        let mut part = part_with(json!({
            "file_path": "m.rs",
            "old_text": "old()",
            "new_text": "new()"
        }));
        EditTool.execute(&mut part, &ctx).await.unwrap();
        assert_eq!(part.status, ToolStatus::Completed, "{}", part.output);
        assert!(part.output.contains("-fn main() { old(); }"));
        assert!(part.output.contains("+fn main() { new(); }"));
        assert_eq!(part.metadata["additions"], json!(1));
        assert_eq!(part.metadata["deletions"], json!(1));
        assert_eq!(
            std::fs::read_to_string(ctx.workdir.join("m.rs")).unwrap(),
            "fn main() { new(); }\n"
        );
    }

    #[tokio::test]
    async fn missing_file_is_structured_failure() {
        let (_dir, ctx) = test_context();
        let mut part = part_with(json!({
            "file_path": "ghost.rs",
            "old_text": "a",
            "new_text": "b"
        }));
        EditTool.execute(&mut part, &ctx).await.unwrap();
        assert_eq!(part.status, ToolStatus::Failed);
        assert_eq!(part.metadata["error"], json!("file_not_found"));
    }

    #[tokio::test]
    async fn ambiguous_match_reports_count() {
        let (_dir, ctx) = test_context();
        std::fs::write(ctx.workdir.join("d.txt"), "dup\ndup\n").unwrap();
        let mut part = part_with(json!({
            "file_path": "d.txt",
            "old_text": "dup",
            "new_text": "one"
        }));
        EditTool.execute(&mut part, &ctx).await.unwrap();
        assert_eq!(part.status, ToolStatus::Failed);
        assert_eq!(part.metadata["error"], json!("multiple_matches"));
        assert!(part.output.contains("2 locations"));
        // file untouched
        assert_eq!(
            std::fs::read_to_string(ctx.workdir.join("d.txt")).unwrap(),
            "dup\ndup\n"
        );
    }

    #[tokio::test]
    async fn external_modification_blocks_edit() {
        let (_dir, ctx) = test_context();
        let p = ctx.workdir.join("f.txt");
        std::fs::write(&p, "v1\n").unwrap();
        ctx.file_times.lock().unwrap().record(&p);
        std::thread::sleep(std::time::Duration::from_millis(20));
        std::fs::write(&p, "v1 external\n").unwrap();

        let mut part = part_with(json!({
            "file_path": "f.txt",
            "old_text": "v1",
            "new_text": "v2"
        }));
        EditTool.execute(&mut part, &ctx).await.unwrap();
        assert_eq!(part.status, ToolStatus::Failed);
        assert_eq!(part.metadata["error"], json!("external_modification"));
    }
}
