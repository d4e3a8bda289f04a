// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::debug;

use wolo_error::WoloError;
use wolo_model::{Todo, TodoStatus, ToolPart};

use crate::tool::{Tool, ToolCategory, ToolContext, ToolSpec};

pub struct TodoWriteTool;

#[async_trait]
impl Tool for TodoWriteTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "todowrite".into(),
            description: "Replace the session's todo list. Each item needs id, content \
                          and status (pending | in_progress | completed | cancelled); \
                          activeForm optionally gives a present-continuous label. \
                          At most one item may be in_progress at a time. Calling this \
                          tool replaces the whole list, it does not merge."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "todos": {
                        "type": "array",
                        "description": "The complete new todo list",
                        "items": {
                            "type": "object",
                            "properties": {
                                "id": {"type": "string"},
                                "content": {"type": "string"},
                                "status": {
                                    "type": "string",
                                    "enum": ["pending", "in_progress", "completed", "cancelled"]
                                },
                                "activeForm": {"type": "string"}
                            },
                            "required": ["id", "content", "status"]
                        }
                    }
                },
                "required": ["todos"]
            }),
            category: ToolCategory::Session,
            icon: "☑️",
            show_output: false,
        }
    }

    fn brief(&self, input: &Map<String, Value>) -> Option<String> {
        input
            .get("todos")
            .and_then(Value::as_array)
            .map(|t| format!("todos ({} items)", t.len()))
    }

    async fn execute(&self, part: &mut ToolPart, ctx: &ToolContext) -> Result<(), WoloError> {
        let Some(raw) = part.input.get("todos").cloned() else {
            part.fail("missing required parameter 'todos'");
            return Ok(());
        };
        let todos: Vec<Todo> = match serde_json::from_value(raw) {
            Ok(t) => t,
            Err(e) => {
                part.fail(format!("malformed todos: {e}"));
                return Ok(());
            }
        };

        let in_progress = todos
            .iter()
            .filter(|t| t.status == TodoStatus::InProgress)
            .count();
        if in_progress > 1 {
            part.fail(format!(
                "{in_progress} items are in_progress; at most one is allowed"
            ));
            return Ok(());
        }

        debug!(session = %ctx.session_id, count = todos.len(), "todowrite tool");
        ctx.store.save_todos(&ctx.session_id, &todos)?;

        let done = todos
            .iter()
            .filter(|t| t.status == TodoStatus::Completed)
            .count();
        part.set_meta("count", json!(todos.len()));
        part.complete(format!(
            "Updated todo list: {} item(s), {done} completed",
            todos.len()
        ));
        Ok(())
    }
}

pub struct TodoReadTool;

#[async_trait]
impl Tool for TodoReadTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "todoread".into(),
            description: "Read the session's current todo list.".into(),
            parameters: json!({
                "type": "object",
                "properties": {},
                "required": []
            }),
            category: ToolCategory::Session,
            icon: "📋",
            show_output: false,
        }
    }

    fn read_only(&self) -> bool {
        true
    }

    async fn execute(&self, part: &mut ToolPart, ctx: &ToolContext) -> Result<(), WoloError> {
        let todos = ctx.store.load_todos(&ctx.session_id)?;
        if todos.is_empty() {
            part.complete("no todos");
            return Ok(());
        }
        let lines: Vec<String> = todos
            .iter()
            .map(|t| {
                let marker = match t.status {
                    TodoStatus::Pending => "[ ]",
                    TodoStatus::InProgress => "[>]",
                    TodoStatus::Completed => "[x]",
                    TodoStatus::Cancelled => "[-]",
                };
                format!("{marker} {}: {}", t.id, t.content)
            })
            .collect();
        part.set_meta("count", json!(todos.len()));
        part.complete(lines.join("\n"));
        Ok(())
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::test_context;
    use wolo_model::ToolStatus;

    fn write_part(args: Value) -> ToolPart {
        ToolPart::new(
            "tw1",
            "todowrite",
            args.as_object().cloned().unwrap_or_default(),
        )
    }

    #[tokio::test]
    async fn writes_and_reads_back() {
        let (_dir, ctx) = test_context();
        let mut part = write_part(json!({
            "todos": [
                {"id": "1", "content": "scan code", "status": "completed"},
                {"id": "2", "content": "fix bug", "status": "in_progress",
                 "activeForm": "Fixing bug"},
                {"id": "3", "content": "run tests", "status": "pending"}
            ]
        }));
        TodoWriteTool.execute(&mut part, &ctx).await.unwrap();
        assert_eq!(part.status, ToolStatus::Completed, "{}", part.output);
        assert!(part.output.contains("3 item(s), 1 completed"));

        let mut read = ToolPart::new("tr1", "todoread", Map::new());
        TodoReadTool.execute(&mut read, &ctx).await.unwrap();
        assert!(read.output.contains("[x] 1: scan code"));
        assert!(read.output.contains("[>] 2: fix bug"));
        assert!(read.output.contains("[ ] 3: run tests"));
    }

    #[tokio::test]
    async fn two_in_progress_items_are_rejected() {
        let (_dir, ctx) = test_context();
        let mut part = write_part(json!({
            "todos": [
                {"id": "1", "content": "a", "status": "in_progress"},
                {"id": "2", "content": "b", "status": "in_progress"}
            ]
        }));
        TodoWriteTool.execute(&mut part, &ctx).await.unwrap();
        assert_eq!(part.status, ToolStatus::Failed);
        assert!(part.output.contains("at most one"));
        // nothing was persisted
        assert!(ctx.store.load_todos(&ctx.session_id).unwrap().is_empty());
    }

    #[tokio::test]
    async fn write_replaces_the_whole_list() {
        let (_dir, ctx) = test_context();
        let mut p1 = write_part(json!({
            "todos": [
                {"id": "1", "content": "old", "status": "pending"},
                {"id": "2", "content": "older", "status": "pending"}
            ]
        }));
        TodoWriteTool.execute(&mut p1, &ctx).await.unwrap();
        let mut p2 = write_part(json!({
            "todos": [{"id": "9", "content": "new", "status": "pending"}]
        }));
        TodoWriteTool.execute(&mut p2, &ctx).await.unwrap();
        let todos = ctx.store.load_todos(&ctx.session_id).unwrap();
        assert_eq!(todos.len(), 1);
        assert_eq!(todos[0].id, "9");
    }

    #[tokio::test]
    async fn empty_list_reads_cleanly() {
        let (_dir, ctx) = test_context();
        let mut read = ToolPart::new("tr1", "todoread", Map::new());
        TodoReadTool.execute(&mut read, &ctx).await.unwrap();
        assert_eq!(read.output, "no todos");
    }

    #[tokio::test]
    async fn malformed_status_is_rejected() {
        let (_dir, ctx) = test_context();
        let mut part = write_part(json!({
            "todos": [{"id": "1", "content": "a", "status": "doing"}]
        }));
        TodoWriteTool.execute(&mut part, &ctx).await.unwrap();
        assert_eq!(part.status, ToolStatus::Failed);
        assert!(part.output.contains("malformed todos"));
    }
}
