// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Map, Value};
use tracing::debug;

use wolo_error::WoloError;
use wolo_model::ToolPart;

use crate::builtin::grep::collect_files;
use crate::tool::{require_str, Tool, ToolCategory, ToolContext, ToolSpec};
use crate::truncate;

const MAX_PATHS: usize = 200;

pub struct GlobTool;

#[async_trait]
impl Tool for GlobTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "glob".into(),
            description: "Find files by path pattern. Supports `*` (within a component), \
                          `**` (across directories) and `?`. Results are relative to the \
                          search root, newest first."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "pattern": {
                        "type": "string",
                        "description": "Path pattern, e.g. \"src/**/*.rs\""
                    },
                    "path": {
                        "type": "string",
                        "description": "Directory to search (default: workdir)"
                    }
                },
                "required": ["pattern"]
            }),
            category: ToolCategory::Search,
            icon: "🗂",
            show_output: false,
        }
    }

    fn read_only(&self) -> bool {
        true
    }

    fn brief(&self, input: &Map<String, Value>) -> Option<String> {
        input
            .get("pattern")
            .and_then(Value::as_str)
            .map(|p| format!("glob {p}"))
    }

    async fn execute(&self, part: &mut ToolPart, ctx: &ToolContext) -> Result<(), WoloError> {
        let Some(pattern) = require_str(part, "pattern") else {
            return Ok(());
        };
        let root = part
            .input
            .get("path")
            .and_then(Value::as_str)
            .map(|p| ctx.workdir.join(p))
            .unwrap_or_else(|| ctx.workdir.clone());
        let Some(re) = path_glob_to_regex(&pattern) else {
            part.fail(format!("invalid glob pattern '{pattern}'"));
            return Ok(());
        };

        debug!(pattern = %pattern, root = %root.display(), "glob tool");

        let mut hits: Vec<String> = Vec::new();
        for (path, _) in collect_files(&root, None) {
            let rel = path.strip_prefix(&root).unwrap_or(&path);
            let rel_str = rel.to_string_lossy();
            if re.is_match(&rel_str) {
                hits.push(rel_str.into_owned());
                if hits.len() >= MAX_PATHS {
                    break;
                }
            }
        }

        part.set_meta("match_count", json!(hits.len()));
        if hits.is_empty() {
            part.complete(format!("no files match '{pattern}'"));
            return Ok(());
        }
        let (output, meta) = truncate::apply_ceiling(&hits.join("\n"));
        for (k, v) in meta {
            part.set_meta(&k, v);
        }
        part.complete(output);
        Ok(())
    }
}

/// Translate a path glob into an anchored regex.
///
/// `**/` matches any number of directory components (including none), `*`
/// stays within one component, `?` matches a single non-separator char.
fn path_glob_to_regex(pattern: &str) -> Option<Regex> {
    let mut re = String::from("^");
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => {
                if chars.peek() == Some(&'*') {
                    chars.next();
                    // swallow a following separator so `**/x` also matches `x`
                    if chars.peek() == Some(&'/') {
                        chars.next();
                        re.push_str("(?:.*/)?");
                    } else {
                        re.push_str(".*");
                    }
                } else {
                    re.push_str("[^/]*");
                }
            }
            '?' => re.push_str("[^/]"),
            c => re.push_str(&regex::escape(&c.to_string())),
        }
    }
    re.push('$');
    Regex::new(&re).ok()
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
