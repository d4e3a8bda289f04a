// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::io::Write as _;

use wolo_config::ExecMode;
use wolo_error::WoloError;
use wolo_model::ToolPart;

use crate::tool::{require_str, Tool, ToolCategory, ToolContext, ToolSpec};

/// Ask the human driving the session.  Only advertised in coop and repl
/// modes — a solo run never sees this tool in its schema list.
pub struct QuestionTool;

#[async_trait]
impl Tool for QuestionTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "question".into(),
            description: "Ask the user a clarifying question and wait for their answer. \
                          Use sparingly, for decisions you cannot make from context."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "question": {
                        "type": "string",
                        "description": "The question to put to the user"
                    }
                },
                "required": ["question"]
            }),
            category: ToolCategory::Session,
            icon: "❓",
            show_output: true,
        }
    }

    fn read_only(&self) -> bool {
        true
    }

    fn available_in(&self, mode: ExecMode) -> bool {
        matches!(mode, ExecMode::Coop | ExecMode::Repl)
    }

    fn brief(&self, input: &Map<String, Value>) -> Option<String> {
        input
            .get("question")
            .and_then(Value::as_str)
            .map(|q| format!("asks: {q}"))
    }

    async fn execute(&self, part: &mut ToolPart, _ctx: &ToolContext) -> Result<(), WoloError> {
        let Some(question) = require_str(part, "question") else {
            return Ok(());
        };
        let answer = tokio::task::spawn_blocking(move || -> std::io::Result<String> {
            let mut err = std::io::stderr();
            writeln!(err, "\n[wolo asks] {question}")?;
            write!(err, "> ")?;
            err.flush()?;
            let mut line = String::new();
            std::io::stdin().read_line(&mut line)?;
            Ok(line.trim_end().to_string())
        })
        .await
        .map_err(|e| WoloError::tool(format!("question prompt task failed: {e}")))?;

        match answer {
            Ok(text) => part.complete(text),
            Err(e) => part.fail(format!("could not read answer: {e}")),
        }
        Ok(())
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
