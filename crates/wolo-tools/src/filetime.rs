// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Per-session tracker of file modification times as seen by the agent.
///
/// `read` records the mtime at read; before a write, `external_change`
/// reports whether someone else touched the file since the agent last saw
/// it.  Files the agent never read are not checked — the tracker only
/// detects modifications behind the agent's back, it does not enforce a
/// read-before-write discipline.
#[derive(Debug, Default)]
pub struct FileTimeTracker {
    seen: HashMap<PathBuf, SystemTime>,
}

impl FileTimeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the current on-disk mtime for `path` (after a read or a write
    /// by the agent itself).
    pub fn record(&mut self, path: &Path) {
        if let Ok(meta) = std::fs::metadata(path) {
            if let Ok(mtime) = meta.modified() {
                self.seen.insert(path.to_path_buf(), mtime);
            }
        }
    }

    /// Returns a description of the external change when `path` was read
    /// before but its on-disk mtime has moved since.
    pub fn external_change(&self, path: &Path) -> Option<String> {
        let recorded = self.seen.get(path)?;
        let current = std::fs::metadata(path).ok()?.modified().ok()?;
        if current > *recorded {
            Some(format!(
                "{} was modified externally since it was last read; re-read it before writing",
                path.display()
            ))
        } else {
            None
        }
    }

    pub fn has_seen(&self, path: &Path) -> bool {
        self.seen.contains_key(path)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
