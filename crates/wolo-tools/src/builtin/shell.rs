// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, warn};

use wolo_error::WoloError;
use wolo_model::ToolPart;

use crate::tool::{require_str, Tool, ToolCategory, ToolContext, ToolSpec};
use crate::truncate;

/// Default command timeout.
const DEFAULT_TIMEOUT_MS: u64 = 120_000;

/// Grace period between SIGTERM and SIGKILL when a command times out.
const KILL_GRACE: Duration = Duration::from_secs(2);

/// Shell command prefixes treated as read-only by the doom-loop guard.
/// Prefix matching is heuristic; refining the list does not change the
/// guard's behavior for mutating commands.
pub const SAFE_SHELL_PREFIXES: &[&str] = &[
    "ls", "cat", "echo", "pwd", "head", "tail", "wc", "git status", "git diff", "git log",
    "python3 -m py_compile",
];

/// True when `command` starts with one of the read-only prefixes.
pub fn is_safe_shell_command(command: &str) -> bool {
    let trimmed = command.trim_start();
    SAFE_SHELL_PREFIXES.iter().any(|p| {
        trimmed
            .strip_prefix(p)
            .map(|rest| rest.is_empty() || rest.starts_with([' ', '\t']))
            .unwrap_or(false)
    })
}

pub struct ShellTool;

#[async_trait]
impl Tool for ShellTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "shell".into(),
            description: "Execute a shell command and return combined stdout + stderr. \
                          Commands run from the session workdir with a 120 s default \
                          timeout (override with timeout_ms). Prefer the read, grep, \
                          glob and edit tools over cat/grep/find/sed."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "command": {
                        "type": "string",
                        "description": "Shell one-liner to execute"
                    },
                    "timeout_ms": {
                        "type": "integer",
                        "description": "Timeout in milliseconds (default 120000)"
                    }
                },
                "required": ["command"]
            }),
            category: ToolCategory::Process,
            icon: "💻",
            show_output: true,
        }
    }

    fn brief(&self, input: &Map<String, Value>) -> Option<String> {
        input
            .get("command")
            .and_then(Value::as_str)
            .map(|c| format!("$ {c}"))
    }

    async fn execute(&self, part: &mut ToolPart, ctx: &ToolContext) -> Result<(), WoloError> {
        let Some(command) = require_str(part, "command") else {
            return Ok(());
        };
        let timeout_ms = part
            .input
            .get("timeout_ms")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_TIMEOUT_MS);

        debug!(command = %command, timeout_ms, "shell tool");

        let mut child = match Command::new("sh")
            .arg("-c")
            .arg(&command)
            .current_dir(&ctx.workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(c) => c,
            Err(e) => {
                part.fail(format!("failed to spawn shell: {e}"));
                return Ok(());
            }
        };

        let mut stdout_pipe = child.stdout.take();
        let mut stderr_pipe = child.stderr.take();
        let reader = tokio::spawn(async move {
            let mut out = Vec::new();
            let mut err = Vec::new();
            if let Some(ref mut o) = stdout_pipe {
                let _ = o.read_to_end(&mut out).await;
            }
            if let Some(ref mut e) = stderr_pipe {
                let _ = e.read_to_end(&mut err).await;
            }
            (out, err)
        });

        let pid = child.id();
        let mut timed_out = false;
        let status = match tokio::time::timeout(Duration::from_millis(timeout_ms), child.wait())
            .await
        {
            Ok(Ok(status)) => Some(status),
            Ok(Err(e)) => {
                part.fail(format!("waiting on command failed: {e}"));
                return Ok(());
            }
            Err(_) => {
                timed_out = true;
                warn!(command = %command, timeout_ms, "shell command timed out; terminating");
                // Graceful first: SIGTERM, short grace, then SIGKILL.
                #[cfg(unix)]
                if let Some(pid) = pid {
                    unsafe {
                        libc::kill(pid as i32, libc::SIGTERM);
                    }
                }
                match tokio::time::timeout(KILL_GRACE, child.wait()).await {
                    Ok(Ok(status)) => Some(status),
                    _ => {
                        let _ = child.kill().await;
                        child.wait().await.ok()
                    }
                }
            }
        };

        let (stdout, stderr) = reader
            .await
            .unwrap_or_else(|_| (Vec::new(), Vec::new()));
        let mut combined = String::from_utf8_lossy(&stdout).into_owned();
        if !stderr.is_empty() {
            if !combined.is_empty() && !combined.ends_with('\n') {
                combined.push('\n');
            }
            combined.push_str(&String::from_utf8_lossy(&stderr));
        }

        let (output, trunc_meta) = truncate::apply_ceiling(&combined);
        for (k, v) in trunc_meta {
            part.set_meta(&k, v);
        }

        if timed_out {
            part.set_meta("error", json!("timeout"));
            part.set_meta("timeout_ms", json!(timeout_ms));
            part.fail(format!(
                "command timed out after {timeout_ms} ms\n{output}"
            ));
            return Ok(());
        }

        let code = status.and_then(|s| s.code()).unwrap_or(-1);
        part.set_meta("exit_code", json!(code));
        if code == 0 {
            part.complete(if output.is_empty() {
                "(no output)".to_string()
            } else {
                output
            });
        } else {
            part.fail(format!("exit status {code}\n{output}"));
        }
        Ok(())
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
