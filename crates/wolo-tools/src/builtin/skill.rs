// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! On-demand skill loading.
//!
//! Skills are markdown documents in the configured skills directory.  The
//! tool description is composed dynamically to embed an
//! `<available_skills>` list, so the model can see what exists before
//! deciding to load one.

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::debug;

use wolo_error::WoloError;
use wolo_model::ToolPart;

use crate::tool::{require_str, Tool, ToolCategory, ToolContext, ToolSpec};

#[derive(Debug, Clone)]
pub struct SkillInfo {
    pub name: String,
    pub summary: String,
}

pub struct SkillTool {
    skills_dir: Option<PathBuf>,
    available: Vec<SkillInfo>,
}

impl SkillTool {
    /// Scan `skills_dir` once at registration time.  A missing directory is
    /// not an error — the tool just advertises an empty list.
    pub fn new(skills_dir: Option<PathBuf>) -> Self {
        let available = skills_dir
            .as_deref()
            .map(scan_skills)
            .unwrap_or_default();
        Self {
            skills_dir,
            available,
        }
    }

    pub fn available(&self) -> &[SkillInfo] {
        &self.available
    }
}

fn scan_skills(dir: &std::path::Path) -> Vec<SkillInfo> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut skills: Vec<SkillInfo> = entries
        .flatten()
        .filter_map(|e| {
            let path = e.path();
            if path.extension().and_then(|x| x.to_str()) != Some("md") {
                return None;
            }
            let name = path.file_stem()?.to_str()?.to_string();
            let summary = std::fs::read_to_string(&path)
                .ok()
                .and_then(|c| first_summary_line(&c))
                .unwrap_or_default();
            Some(SkillInfo { name, summary })
        })
        .collect();
    skills.sort_by(|a, b| a.name.cmp(&b.name));
    skills
}

/// First non-empty line, with a leading markdown heading marker stripped.
fn first_summary_line(content: &str) -> Option<String> {
    content
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(|l| l.trim_start_matches('#').trim().to_string())
}

fn build_description(skills: &[SkillInfo]) -> String {
    if skills.is_empty() {
        return "Load a named skill document into context. \
                No skills are currently available."
            .to_string();
    }
    let list: String = skills
        .iter()
        .map(|s| format!("  <skill name=\"{}\">{}</skill>", s.name, s.summary))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Load the full content of a named skill document into the conversation. \
         Call this when the user's request matches one of the skills below.\n\n\
         <available_skills>\n{list}\n</available_skills>"
    )
}

#[async_trait]
impl Tool for SkillTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "skill".into(),
            description: build_description(&self.available),
            parameters: json!({
                "type": "object",
                "properties": {
                    "name": {
                        "type": "string",
                        "description": "Name of the skill to load"
                    }
                },
                "required": ["name"]
            }),
            category: ToolCategory::Knowledge,
            icon: "🎓",
            show_output: false,
        }
    }

    fn read_only(&self) -> bool {
        true
    }

    fn brief(&self, input: &Map<String, Value>) -> Option<String> {
        input
            .get("name")
            .and_then(Value::as_str)
            .map(|n| format!("skill {n}"))
    }

    async fn execute(&self, part: &mut ToolPart, _ctx: &ToolContext) -> Result<(), WoloError> {
        let Some(name) = require_str(part, "name") else {
            return Ok(());
        };
        let Some(dir) = &self.skills_dir else {
            part.fail("no skills directory is configured");
            return Ok(());
        };
        // Skill names come from the model; keep them to simple stems so a
        // crafted name cannot traverse out of the skills directory.
        if name.contains('/') || name.contains("..") {
            part.fail(format!("invalid skill name '{name}'"));
            return Ok(());
        }
        let path = dir.join(format!("{name}.md"));
        debug!(skill = %name, path = %path.display(), "skill tool");
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => {
                part.set_meta("skill", json!(name));
                part.complete(content);
            }
            Err(_) => {
                let known: Vec<&str> = self.available.iter().map(|s| s.name.as_str()).collect();
                part.fail(format!(
                    "unknown skill '{name}'; available: {}",
                    if known.is_empty() {
                        "(none)".to_string()
                    } else {
                        known.join(", ")
                    }
                ));
            }
        }
        Ok(())
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
