// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The single error taxonomy shared by every wolo crate.
//!
//! Five variants cover the whole system: configuration, tool execution,
//! session store, LLM transport, and path safety.  Each variant carries a
//! human-readable message, the owning session id when one is known, and a
//! free-form context map (`tool_name`, `path`, `model`, …).  Sub-kinds
//! (e.g. a session being `locked` vs `corrupted`) travel in the context map
//! under the `kind` key so the variant set stays closed.

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

/// Structured payload common to every [`WoloError`] variant.
#[derive(Debug, Clone, Default)]
pub struct ErrorInfo {
    pub message: String,
    pub session_id: Option<String>,
    pub context: BTreeMap<String, String>,
}

impl ErrorInfo {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            session_id: None,
            context: BTreeMap::new(),
        }
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(id) = &self.session_id {
            write!(f, " (session: {id})")?;
        }
        Ok(())
    }
}

/// Root error type.  Tool-layer failures that the model should see are NOT
/// errors — they are written into the failing `ToolPart` — so anything of
/// this type unwinding through the agent loop is structural.
#[derive(Debug, Clone, Error)]
pub enum WoloError {
    #[error("ConfigError: {0}")]
    Config(Box<ErrorInfo>),
    #[error("ToolError: {0}")]
    Tool(Box<ErrorInfo>),
    #[error("SessionError: {0}")]
    Session(Box<ErrorInfo>),
    #[error("LLMError: {0}")]
    Llm(Box<ErrorInfo>),
    #[error("PathSafetyError: {0}")]
    PathSafety(Box<ErrorInfo>),
}

/// Session error sub-kinds stored under `context["kind"]`.
pub mod session_kind {
    pub const NOT_FOUND: &str = "not_found";
    pub const LOCKED: &str = "locked";
    pub const CORRUPTED: &str = "corrupted";
    pub const CONCURRENT_WRITER: &str = "concurrent_writer";
    pub const ALREADY_RUNNING: &str = "already_running";
}

/// Path-safety error sub-kinds stored under `context["kind"]`.
pub mod path_kind {
    pub const DENIED_BY_USER: &str = "denied_by_user";
    pub const CANCELLED_BY_USER: &str = "cancelled_by_user";
}

impl WoloError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(Box::new(ErrorInfo::new(message)))
    }

    pub fn tool(message: impl Into<String>) -> Self {
        Self::Tool(Box::new(ErrorInfo::new(message)))
    }

    pub fn session(kind: &str, message: impl Into<String>) -> Self {
        let mut info = ErrorInfo::new(message);
        info.context.insert("kind".into(), kind.into());
        Self::Session(Box::new(info))
    }

    pub fn llm(message: impl Into<String>) -> Self {
        Self::Llm(Box::new(ErrorInfo::new(message)))
    }

    pub fn path_safety(kind: &str, message: impl Into<String>) -> Self {
        let mut info = ErrorInfo::new(message);
        info.context.insert("kind".into(), kind.into());
        Self::PathSafety(Box::new(info))
    }

    /// Wrap an I/O error from a tool execution path.  The raw
    /// [`std::io::ErrorKind`] is preserved in context as `error_type` so the
    /// model (and the audit trail) can distinguish `NotFound` from
    /// `PermissionDenied` without us leaking `std::io::Error` across the API.
    pub fn tool_io(op: &str, path: &str, err: &std::io::Error) -> Self {
        Self::tool(format!("{op} failed for {path}: {err}"))
            .with_context("error_type", format!("{:?}", err.kind()))
            .with_context("path", path)
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.info_mut().session_id = Some(session_id.into());
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.info_mut().context.insert(key.into(), value.into());
        self
    }

    pub fn info(&self) -> &ErrorInfo {
        match self {
            Self::Config(i) | Self::Tool(i) | Self::Session(i) | Self::Llm(i)
            | Self::PathSafety(i) => i,
        }
    }

    fn info_mut(&mut self) -> &mut ErrorInfo {
        match self {
            Self::Config(i) | Self::Tool(i) | Self::Session(i) | Self::Llm(i)
            | Self::PathSafety(i) => i,
        }
    }

    /// Sub-kind tag (`locked`, `denied_by_user`, …) when one was recorded.
    pub fn kind(&self) -> Option<&str> {
        self.info().context.get("kind").map(String::as_str)
    }

    /// Process exit code for this error when it unwinds out of `main`.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 4,
            Self::Session(_) => 3,
            Self::Llm(_) => 1,
            Self::Tool(_) => 1,
            Self::PathSafety(_) => {
                if self.kind() == Some(path_kind::CANCELLED_BY_USER) {
                    130
                } else {
                    1
                }
            }
        }
    }

    /// Single-line rendering for stderr, with a remediation hint for the
    /// kinds a user can act on directly.
    pub fn user_message(&self) -> String {
        let mut out = self.to_string();
        match self {
            Self::Config(_) => {
                out.push_str(
                    "\nhint: set WOLO_API_KEY or add an endpoint to ~/.config/wolo/config.yaml",
                );
            }
            Self::Session(_) if self.kind() == Some(session_kind::LOCKED) => {
                out.push_str("\nhint: another wolo process owns this session; wait or pick -s NEW");
            }
            Self::Session(_) if self.kind() == Some(session_kind::NOT_FOUND) => {
                out.push_str("\nhint: run `wolo session list` to see available sessions");
            }
            _ => {}
        }
        out
    }
}

pub type Result<T> = std::result::Result<T, WoloError>;

// ─── Unit tests ──────────────────────────────────────────────────────────────
