// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use wolo_config::{Config, ExecMode};
use wolo_model::ToolSchema;

use crate::builtin;
use crate::tool::Tool;

/// Central registry holding all available tools.
///
/// External tool providers (MCP servers, plugins) register under namespaced
/// names (`mcp:<server>:<tool>`) but share the same [`Tool`] contract.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Registry with every built-in tool, configured from `config`.
    pub fn builtin(config: &Config, memory_file: PathBuf) -> Self {
        let mut reg = Self::new();
        reg.register(builtin::ReadTool);
        reg.register(builtin::WriteTool);
        reg.register(builtin::EditTool);
        reg.register(builtin::MultiEditTool);
        reg.register(builtin::GrepTool);
        reg.register(builtin::GlobTool);
        reg.register(builtin::ShellTool);
        reg.register(builtin::WebFetchTool::default());
        reg.register(builtin::TodoWriteTool);
        reg.register(builtin::TodoReadTool);
        reg.register(builtin::SkillTool::new(
            config.skills_dir.as_ref().map(PathBuf::from),
        ));
        reg.register(builtin::MemoryTool::new(memory_file));
        reg.register(builtin::QuestionTool);
        reg
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.tools.insert(tool.spec().name, Arc::new(tool));
    }

    /// Register an externally provided tool under a namespaced name.
    pub fn register_namespaced(&mut self, namespace: &str, tool: impl Tool + 'static) {
        let name = format!("{namespace}:{}", tool.spec().name);
        self.tools.insert(name, Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Schemas advertised to the model in `mode`, sorted by name.  The
    /// `question` tool (and anything else mode-gated) drops out in solo.
    pub fn schemas_for_mode(&self, mode: ExecMode) -> Vec<ToolSchema> {
        let mut schemas: Vec<ToolSchema> = self
            .tools
            .values()
            .filter(|t| t.available_in(mode))
            .map(|t| t.spec().schema())
            .collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
