// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Map, Value};

use wolo_config::{Config, ExecMode};
use wolo_error::WoloError;
use wolo_model::{ToolPart, ToolSchema};
use wolo_store::SessionStore;

use crate::filetime::FileTimeTracker;
use crate::safety::PathGuard;

/// Rough grouping used for display and registry listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolCategory {
    File,
    Search,
    Process,
    Web,
    Session,
    Knowledge,
}

/// Static description of a tool as advertised to the model and the UI.
#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON Schema of the parameters object, including the `required` list.
    pub parameters: Value,
    pub category: ToolCategory,
    pub icon: &'static str,
    /// Whether the UI should render the full output by default.
    pub show_output: bool,
}

impl ToolSpec {
    pub fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.parameters.clone(),
        }
    }
}

/// Everything a tool execution may touch.  Built per agent loop — the guard
/// and file-time tracker are loop-scoped state, not globals.
pub struct ToolContext {
    pub session_id: String,
    pub workdir: PathBuf,
    pub config: Arc<Config>,
    pub store: Arc<SessionStore>,
    pub file_times: Arc<Mutex<FileTimeTracker>>,
    pub guard: Arc<PathGuard>,
}

/// Trait every built-in (and namespaced external) tool implements.
///
/// `execute` mutates the tool part in place: output, status, timing, and
/// metadata.  Expected failures (file not found, pattern mismatch, path
/// denial) are written into the part with `status = failed` so the model can
/// react next turn; only programming and store errors return `Err`.
#[async_trait]
pub trait Tool: Send + Sync {
    fn spec(&self) -> ToolSpec;

    /// Read-only tools are exempt from the doom-loop guard.
    fn read_only(&self) -> bool {
        false
    }

    /// Whether this tool is advertised to the model in `mode`.
    fn available_in(&self, _mode: ExecMode) -> bool {
        true
    }

    /// One-line summary of a call for compact UI rendering.
    fn brief(&self, _input: &Map<String, Value>) -> Option<String> {
        None
    }

    async fn execute(&self, part: &mut ToolPart, ctx: &ToolContext) -> Result<(), WoloError>;
}

/// Fetch a required string argument, failing the part when absent.
///
/// Returns `None` after marking the part failed, so callers can simply
/// `return Ok(())`.
pub fn require_str(part: &mut ToolPart, key: &str) -> Option<String> {
    match part.input.get(key).and_then(Value::as_str) {
        Some(s) => Some(s.to_string()),
        None => {
            let seen = serde_json::to_string(&part.input).unwrap_or_else(|_| "{}".into());
            part.fail(format!("missing required parameter '{key}'. Received: {seen}"));
            None
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
