// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Map, Value};
use tracing::debug;
use walkdir::WalkDir;

use wolo_error::WoloError;
use wolo_model::ToolPart;

use crate::tool::{require_str, Tool, ToolCategory, ToolContext, ToolSpec};
use crate::truncate;

const DEFAULT_MAX_RESULTS: usize = 100;

pub struct GrepTool;

#[async_trait]
impl Tool for GrepTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "grep".into(),
            description: "Search file contents with a regular expression. Results are \
                          grouped per file, files ordered by modification time (newest \
                          first), as 'path:line_number: line'. Use the glob parameter \
                          to restrict file names (e.g. \"*.rs\")."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "pattern": {
                        "type": "string",
                        "description": "Regular expression to search for"
                    },
                    "path": {
                        "type": "string",
                        "description": "Directory to search (default: workdir)"
                    },
                    "glob": {
                        "type": "string",
                        "description": "Filename filter, e.g. \"*.rs\""
                    },
                    "max_results": {
                        "type": "integer",
                        "description": "Cap on matching lines (default 100)"
                    }
                },
                "required": ["pattern"]
            }),
            category: ToolCategory::Search,
            icon: "🔍",
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
            .map(|p| format!("grep /{p}/"))
    }

    async fn execute(&self, part: &mut ToolPart, ctx: &ToolContext) -> Result<(), WoloError> {
        let Some(pattern) = require_str(part, "pattern") else {
            return Ok(());
        };
        let re = match Regex::new(&pattern) {
            Ok(r) => r,
            Err(e) => {
                part.fail(format!("invalid regex: {e}"));
                return Ok(());
            }
        };
        let root = part
            .input
            .get("path")
            .and_then(Value::as_str)
            .map(|p| ctx.workdir.join(p))
            .unwrap_or_else(|| ctx.workdir.clone());
        let name_filter = part
            .input
            .get("glob")
            .and_then(Value::as_str)
            .and_then(glob_to_regex);
        let max_results = part
            .input
            .get("max_results")
            .and_then(Value::as_u64)
            .map(|n| n as usize)
            .unwrap_or(DEFAULT_MAX_RESULTS);

        debug!(pattern = %pattern, root = %root.display(), "grep tool");

        let files = collect_files(&root, name_filter.as_ref());
        let mut matches: Vec<String> = Vec::new();
        let mut hit_cap = false;
        'files: for (path, _) in &files {
            let Ok(content) = std::fs::read(path) else {
                continue;
            };
            if content.iter().take(8192).any(|&b| b == 0) {
                continue; // binary
            }
            let text = String::from_utf8_lossy(&content);
            let shown = path.strip_prefix(&ctx.workdir).unwrap_or(path);
            for (idx, line) in text.lines().enumerate() {
                if re.is_match(line) {
                    if matches.len() >= max_results {
                        hit_cap = true;
                        break 'files;
                    }
                    matches.push(format!("{}:{}: {}", shown.display(), idx + 1, line));
                }
            }
        }

        part.set_meta("match_count", json!(matches.len()));
        if matches.is_empty() {
            part.complete(format!("no matches for /{pattern}/"));
            return Ok(());
        }
        let mut output = matches.join("\n");
        if hit_cap {
            output.push_str(&format!(
                "\n[stopped at {max_results} matches; refine the pattern to see more]"
            ));
            part.set_meta("truncated", json!(true));
        }
        let (output, meta) = truncate::apply_ceiling(&output);
        for (k, v) in meta {
            part.set_meta(&k, v);
        }
        part.complete(output);
        Ok(())
    }
}

/// All regular files under `root`, newest mtime first.  Hidden directories
/// (`.git` and friends) are skipped.
pub(crate) fn collect_files(
    root: &Path,
    name_filter: Option<&Regex>,
) -> Vec<(PathBuf, SystemTime)> {
    let mut files: Vec<(PathBuf, SystemTime)> = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| {
            !(e.depth() > 0
                && e.file_name()
                    .to_str()
                    .map(|n| n.starts_with('.'))
                    .unwrap_or(false))
        })
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            name_filter
                .map(|re| {
                    e.file_name()
                        .to_str()
                        .map(|n| re.is_match(n))
                        .unwrap_or(false)
                })
                .unwrap_or(true)
        })
        .map(|e| {
            let mtime = e
                .path()
                .metadata()
                .ok()
                .and_then(|m| m.modified().ok())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            (e.into_path(), mtime)
        })
        .collect();
    files.sort_by(|a, b| b.1.cmp(&a.1));
    files
}

/// Convert a filename glob (`*`, `?`) into an anchored regex.
pub(crate) fn glob_to_regex(pattern: &str) -> Option<Regex> {
    let mut re = String::from("^");
    for ch in pattern.chars() {
        match ch {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            c => re.push_str(&regex::escape(&c.to_string())),
        }
    }
    re.push('$');
    Regex::new(&re).ok()
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::test_context;
    use wolo_model::ToolStatus;

    fn part_with(args: Value) -> ToolPart {
        ToolPart::new("g1", "grep", args.as_object().cloned().unwrap_or_default())
    }

    #[tokio::test]
    async fn finds_matching_lines_with_location() {
        let (_dir, ctx) = test_context();
        std::fs::write(ctx.workdir.join("a.rs"), "fn main() {}\nfn helper() {}\n").unwrap();
        let mut part = part_with(json!({"pattern": "fn \\w+"}));
        GrepTool.execute(&mut part, &ctx).await.unwrap();
        assert_eq!(part.status, ToolStatus::Completed);
        assert!(part.output.contains("a.rs:1: fn main() {}"));
        assert!(part.output.contains("a.rs:2: fn helper() {}"));
        assert_eq!(part.metadata["match_count"], json!(2));
    }

    #[tokio::test]
    async fn glob_filter_restricts_files() {
        let (_dir, ctx) = test_context();
        std::fs::write(ctx.workdir.join("a.rs"), "needle\n").unwrap();
        std::fs::write(ctx.workdir.join("b.txt"), "needle\n").unwrap();
        let mut part = part_with(json!({"pattern": "needle", "glob": "*.rs"}));
        GrepTool.execute(&mut part, &ctx).await.unwrap();
        assert!(part.output.contains("a.rs"));
        assert!(!part.output.contains("b.txt"));
    }

    #[tokio::test]
    async fn max_results_caps_output() {
        let (_dir, ctx) = test_context();
        let many: String = (0..50).map(|i| format!("needle {i}\n")).collect();
        std::fs::write(ctx.workdir.join("big.txt"), many).unwrap();
        let mut part = part_with(json!({"pattern": "needle", "max_results": 5}));
        GrepTool.execute(&mut part, &ctx).await.unwrap();
        assert_eq!(part.metadata["match_count"], json!(5));
        assert!(part.output.contains("stopped at 5 matches"));
    }

    #[tokio::test]
    async fn no_matches_is_a_completed_empty_answer() {
        let (_dir, ctx) = test_context();
        std::fs::write(ctx.workdir.join("a.txt"), "nothing here\n").unwrap();
        let mut part = part_with(json!({"pattern": "absent_token"}));
        GrepTool.execute(&mut part, &ctx).await.unwrap();
        assert_eq!(part.status, ToolStatus::Completed);
        assert!(part.output.contains("no matches"));
    }

    #[tokio::test]
    async fn invalid_regex_fails_part() {
        let (_dir, ctx) = test_context();
        let mut part = part_with(json!({"pattern": "("}));
        GrepTool.execute(&mut part, &ctx).await.unwrap();
        assert_eq!(part.status, ToolStatus::Failed);
    }

    #[tokio::test]
    async fn hidden_directories_are_skipped() {
        let (_dir, ctx) = test_context();
        std::fs::create_dir_all(ctx.workdir.join(".git")).unwrap();
        std::fs::write(ctx.workdir.join(".git/config"), "needle\n").unwrap();
        std::fs::write(ctx.workdir.join("real.txt"), "needle\n").unwrap();
        let mut part = part_with(json!({"pattern": "needle"}));
        GrepTool.execute(&mut part, &ctx).await.unwrap();
        assert!(part.output.contains("real.txt"));
        assert!(!part.output.contains(".git"));
    }

    #[test]
    fn newest_files_sort_first() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("old.txt"), "x").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));
        std::fs::write(dir.path().join("new.txt"), "x").unwrap();
        let files = collect_files(dir.path(), None);
        assert!(files[0].0.ends_with("new.txt"));
    }

    #[test]
    fn glob_translation_handles_star_and_question() {
        let re = glob_to_regex("*.r?").unwrap();
        assert!(re.is_match("main.rs"));
        assert!(!re.is_match("main.rson"));
        assert!(!re.is_match("rs"));
    }
}
