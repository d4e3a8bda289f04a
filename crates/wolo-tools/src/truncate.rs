// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Output ceiling applied by every tool that can produce large text.

use serde_json::{json, Map, Value};

/// Default ceiling: whichever of these limits is hit first.
pub const MAX_LINES: usize = 2000;
pub const MAX_BYTES: usize = 50 * 1024;

/// Apply the output ceiling to `content`.
///
/// Returns the (possibly truncated) text plus metadata entries describing
/// the cut.  Truncated output ends with guidance pointing at `grep` and
/// `read` with offset/limit, and the metadata records where the tail starts
/// so a follow-up call can resume there.
pub fn apply_ceiling(content: &str) -> (String, Map<String, Value>) {
    apply_ceiling_with(content, MAX_LINES, MAX_BYTES)
}

pub fn apply_ceiling_with(
    content: &str,
    max_lines: usize,
    max_bytes: usize,
) -> (String, Map<String, Value>) {
    let mut meta = Map::new();
    let total_lines = content.lines().count();
    if total_lines <= max_lines && content.len() <= max_bytes {
        return (content.to_string(), meta);
    }

    let mut kept = String::new();
    let mut kept_lines = 0usize;
    for line in content.lines() {
        let needed = if kept.is_empty() {
            line.len()
        } else {
            line.len() + 1
        };
        if kept_lines >= max_lines || kept.len() + needed > max_bytes {
            break;
        }
        if !kept.is_empty() {
            kept.push('\n');
        }
        kept.push_str(line);
        kept_lines += 1;
    }

    let omitted_lines = total_lines.saturating_sub(kept_lines);
    let omitted_bytes = content.len().saturating_sub(kept.len());
    meta.insert("truncated".into(), json!(true));
    meta.insert("omitted_lines".into(), json!(omitted_lines));
    meta.insert("omitted_bytes".into(), json!(omitted_bytes));
    // Tail pointer: first line number (1-based) that was cut.
    meta.insert("tail_start_line".into(), json!(kept_lines + 1));

    let text = format!(
        "{kept}\n[output truncated: {omitted_lines} lines / {omitted_bytes} bytes omitted; \
         use grep to search the rest, or read with offset={} to continue]",
        kept_lines + 1
    );
    (text, meta)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
