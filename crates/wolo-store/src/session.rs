// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! On-disk session store.
//!
//! Layout, one directory per session:
//!
//! ```text
//! <root>/sessions/<session_id>/
//!   session.json                metadata (owner pid, timestamps, title, …)
//!   messages/<msg_id>.json      one file per message, full parts tree
//!   todos.json                  current todo list
//!   compaction/records.json     index of compaction records
//!   compaction/<record_id>.json full record bodies (immutable)
//!   path_confirmations.json     user-confirmed write directories
//! ```
//!
//! Message files, todos, records, and confirmations are written eagerly
//! (they carry the recoverable state); the aggregate `session.json` goes
//! through the debounced [`crate::SessionSaver`].

use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use wolo_error::{session_kind, WoloError};
use wolo_model::{CompactionRecord, CompactionRecordSummary, Message, Todo};

use crate::fsio;
use crate::slug;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMeta {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_session_id: Option<String>,
    #[serde(default)]
    pub agent_type: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Owning process while a run is live; cleared on normal exit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_activity: Option<DateTime<Utc>>,
}

/// Row returned by `list_sessions`.
#[derive(Debug, Clone)]
pub struct SessionListEntry {
    pub id: String,
    pub title: String,
    pub agent_type: String,
    pub created_at: DateTime<Utc>,
    pub last_activity: Option<DateTime<Utc>>,
    pub locked: bool,
}

/// Persisted set of directories the user confirmed for writing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PathConfirmations {
    pub dirs: Vec<String>,
    /// Confirmations spent this session, counted against the per-session cap.
    pub count: u32,
    pub updated_at: Option<DateTime<Utc>>,
}

type ProcessMatcher = Box<dyn Fn(u32) -> bool + Send + Sync>;

/// Returns true when `pid` is alive and runs a wolo process.
///
/// Reads `/proc/<pid>/cmdline` where available; elsewhere falls back to a
/// bare liveness probe, which errs on the safe (locked) side.
fn pid_runs_wolo(pid: u32) -> bool {
    match std::fs::read(format!("/proc/{pid}/cmdline")) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).contains("wolo"),
        Err(_) => {
            #[cfg(unix)]
            {
                unsafe { libc::kill(pid as i32, 0) == 0 }
            }
            #[cfg(not(unix))]
            {
                false
            }
        }
    }
}

pub struct SessionStore {
    sessions_root: PathBuf,
    process_matcher: ProcessMatcher,
}

impl SessionStore {
    /// Open a store rooted at `data_dir` (sessions live in
    /// `<data_dir>/sessions`).
    pub fn open(data_dir: impl Into<PathBuf>) -> Result<Self, WoloError> {
        let sessions_root = data_dir.into().join("sessions");
        std::fs::create_dir_all(&sessions_root).map_err(|e| {
            WoloError::session(
                session_kind::CORRUPTED,
                format!("cannot create store root: {e}"),
            )
        })?;
        Ok(Self {
            sessions_root,
            process_matcher: Box::new(pid_runs_wolo),
        })
    }

    /// Replace the liveness probe used by the PID-ownership check.
    /// Tests use this to simulate live and stale owners deterministically.
    pub fn with_process_matcher(
        mut self,
        matcher: impl Fn(u32) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.process_matcher = Box::new(matcher);
        self
    }

    pub fn sessions_root(&self) -> &Path {
        &self.sessions_root
    }

    // ── Paths ────────────────────────────────────────────────────────────────

    pub fn session_dir(&self, id: &str) -> PathBuf {
        self.sessions_root.join(id)
    }

    fn meta_path(&self, id: &str) -> PathBuf {
        self.session_dir(id).join("session.json")
    }

    pub fn message_path(&self, id: &str, message_id: &str) -> PathBuf {
        self.session_dir(id)
            .join("messages")
            .join(format!("{message_id}.json"))
    }

    fn todos_path(&self, id: &str) -> PathBuf {
        self.session_dir(id).join("todos.json")
    }

    fn records_index_path(&self, id: &str) -> PathBuf {
        self.session_dir(id).join("compaction").join("records.json")
    }

    fn record_path(&self, id: &str, record_id: &str) -> PathBuf {
        self.session_dir(id)
            .join("compaction")
            .join(format!("{record_id}.json"))
    }

    fn confirmations_path(&self, id: &str) -> PathBuf {
        self.session_dir(id).join("path_confirmations.json")
    }

    fn map_io(&self, id: &str, what: &str, e: io::Error) -> WoloError {
        let kind = match e.kind() {
            io::ErrorKind::NotFound => session_kind::NOT_FOUND,
            io::ErrorKind::InvalidData => session_kind::CORRUPTED,
            _ => session_kind::CORRUPTED,
        };
        WoloError::session(kind, format!("{what}: {e}")).with_session(id)
    }

    // ── Session lifecycle ────────────────────────────────────────────────────

    /// Create a new session with a fresh slug id.  The parent, when given,
    /// must exist.
    pub fn create_session(
        &self,
        parent: Option<&str>,
        agent_type: &str,
        title: &str,
    ) -> Result<SessionMeta, WoloError> {
        if let Some(p) = parent {
            if !self.meta_path(p).is_file() {
                return Err(WoloError::session(
                    session_kind::NOT_FOUND,
                    format!("parent session '{p}' does not exist"),
                ));
            }
        }
        let taken = self.session_ids()?;
        let id = slug::generate(&taken);
        let now = Utc::now();
        let meta = SessionMeta {
            id: id.clone(),
            created_at: now,
            updated_at: now,
            parent_session_id: parent.map(str::to_string),
            agent_type: agent_type.to_string(),
            title: title.to_string(),
            tags: Vec::new(),
            pid: None,
            last_activity: Some(now),
        };
        self.save_meta(&meta)?;
        std::fs::create_dir_all(self.session_dir(&id).join("messages"))
            .map_err(|e| self.map_io(&id, "creating messages dir", e))?;
        info!(session = %id, "created session");
        Ok(meta)
    }

    /// Create a session under a caller-chosen id (the `-s NAME` flow).
    pub fn create_named_session(
        &self,
        id: &str,
        agent_type: &str,
        title: &str,
    ) -> Result<SessionMeta, WoloError> {
        if id.is_empty() || id.contains('/') || id.contains("..") {
            return Err(WoloError::session(
                session_kind::NOT_FOUND,
                format!("invalid session name '{id}'"),
            ));
        }
        if self.meta_path(id).exists() {
            return Err(WoloError::session(
                session_kind::CONCURRENT_WRITER,
                format!("session '{id}' already exists"),
            )
            .with_session(id));
        }
        let now = Utc::now();
        let meta = SessionMeta {
            id: id.to_string(),
            created_at: now,
            updated_at: now,
            parent_session_id: None,
            agent_type: agent_type.to_string(),
            title: title.to_string(),
            tags: Vec::new(),
            pid: None,
            last_activity: Some(now),
        };
        self.save_meta(&meta)?;
        std::fs::create_dir_all(self.session_dir(id).join("messages"))
            .map_err(|e| self.map_io(id, "creating messages dir", e))?;
        info!(session = %id, "created named session");
        Ok(meta)
    }

    pub fn load_meta(&self, id: &str) -> Result<SessionMeta, WoloError> {
        if !self.meta_path(id).exists() {
            return Err(
                WoloError::session(session_kind::NOT_FOUND, format!("no such session '{id}'"))
                    .with_session(id),
            );
        }
        fsio::read_json(&self.meta_path(id))
            .map_err(|e| self.map_io(id, "reading session.json", e))
    }

    pub fn save_meta(&self, meta: &SessionMeta) -> Result<(), WoloError> {
        fsio::write_json(&self.meta_path(&meta.id), meta)
            .map_err(|e| self.map_io(&meta.id, "writing session.json", e))
    }

    /// Take ownership of a session for this process.
    ///
    /// Fails with a `locked` session error when another live wolo process
    /// already holds it; a recorded owner that is no longer running is
    /// treated as stale and replaced.
    pub fn acquire(&self, id: &str) -> Result<SessionMeta, WoloError> {
        let mut meta = self.load_meta(id)?;
        let me = std::process::id();
        if let Some(owner) = meta.pid {
            if owner != me && (self.process_matcher)(owner) {
                return Err(WoloError::session(
                    session_kind::LOCKED,
                    format!("session is already running under pid {owner}"),
                )
                .with_session(id)
                .with_context("pid", owner.to_string()));
            }
            if owner != me {
                debug!(session = %id, stale_pid = owner, "clearing stale session owner");
            }
        }
        meta.pid = Some(me);
        meta.updated_at = Utc::now();
        self.save_meta(&meta)?;
        Ok(meta)
    }

    /// Clear PID ownership on normal exit.
    pub fn release(&self, id: &str) -> Result<(), WoloError> {
        let mut meta = self.load_meta(id)?;
        if meta.pid == Some(std::process::id()) {
            meta.pid = None;
            meta.updated_at = Utc::now();
            self.save_meta(&meta)?;
        }
        Ok(())
    }

    pub fn delete_session(&self, id: &str) -> Result<(), WoloError> {
        let dir = self.session_dir(id);
        if !dir.exists() {
            return Err(
                WoloError::session(session_kind::NOT_FOUND, format!("no such session '{id}'"))
                    .with_session(id),
            );
        }
        std::fs::remove_dir_all(&dir).map_err(|e| self.map_io(id, "deleting session", e))
    }

    fn session_ids(&self) -> Result<Vec<String>, WoloError> {
        let mut ids = Vec::new();
        let entries = std::fs::read_dir(&self.sessions_root)
            .map_err(|e| self.map_io("-", "listing sessions", e))?;
        for entry in entries.flatten() {
            if entry.path().is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    ids.push(name.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    pub fn list_sessions(&self) -> Result<Vec<SessionListEntry>, WoloError> {
        let mut out = Vec::new();
        for id in self.session_ids()? {
            let Ok(meta) = self.load_meta(&id) else {
                continue; // skip corrupt entries rather than failing the listing
            };
            let locked = meta
                .pid
                .map(|p| p != std::process::id() && (self.process_matcher)(p))
                .unwrap_or(false);
            out.push(SessionListEntry {
                id: meta.id,
                title: meta.title,
                agent_type: meta.agent_type,
                created_at: meta.created_at,
                last_activity: meta.last_activity,
                locked,
            });
        }
        out.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
        Ok(out)
    }

    /// Remove sessions whose last update is older than `days`.
    ///
    /// Whole sessions are pruned (metadata, messages, records together), so a
    /// compaction record can never be left pointing at deleted message files.
    pub fn clean(&self, days: i64) -> Result<usize, WoloError> {
        let cutoff = Utc::now() - Duration::days(days);
        let mut removed = 0usize;
        for id in self.session_ids()? {
            let Ok(meta) = self.load_meta(&id) else {
                continue;
            };
            if meta.updated_at < cutoff && meta.pid.is_none() {
                self.delete_session(&id)?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    // ── Messages ─────────────────────────────────────────────────────────────

    pub fn save_message(&self, session_id: &str, message: &Message) -> Result<(), WoloError> {
        fsio::write_json(&self.message_path(session_id, &message.id), message)
            .map_err(|e| self.map_io(session_id, "writing message", e))
    }

    pub fn load_message(&self, session_id: &str, message_id: &str) -> Result<Message, WoloError> {
        fsio::read_json(&self.message_path(session_id, message_id))
            .map_err(|e| self.map_io(session_id, "reading message", e))
    }

    /// All messages of a session in creation order (timestamp, then id as a
    /// tiebreak — ids are uuids, so the tiebreak is arbitrary but stable).
    pub fn load_messages(&self, session_id: &str) -> Result<Vec<Message>, WoloError> {
        let dir = self.session_dir(session_id).join("messages");
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut messages: Vec<Message> = Vec::new();
        let entries =
            std::fs::read_dir(&dir).map_err(|e| self.map_io(session_id, "listing messages", e))?;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let msg: Message = fsio::read_json(&path)
                .map_err(|e| self.map_io(session_id, "reading message", e))?;
            messages.push(msg);
        }
        messages.sort_by(|a, b| (a.timestamp, &a.id).cmp(&(b.timestamp, &b.id)));
        Ok(messages)
    }

    // ── Todos ────────────────────────────────────────────────────────────────

    pub fn save_todos(&self, session_id: &str, todos: &[Todo]) -> Result<(), WoloError> {
        fsio::write_json(&self.todos_path(session_id), &todos)
            .map_err(|e| self.map_io(session_id, "writing todos", e))
    }

    pub fn load_todos(&self, session_id: &str) -> Result<Vec<Todo>, WoloError> {
        let path = self.todos_path(session_id);
        if !path.exists() {
            return Ok(Vec::new());
        }
        fsio::read_json(&path).map_err(|e| self.map_io(session_id, "reading todos", e))
    }

    // ── Compaction records ───────────────────────────────────────────────────

    /// Append a record.  Records are immutable: the body file is written
    /// once and the index only ever grows.
    pub fn append_compaction_record(&self, record: &CompactionRecord) -> Result<(), WoloError> {
        let session_id = record.session_id.as_str();
        fsio::write_json(&self.record_path(session_id, &record.id), record)
            .map_err(|e| self.map_io(session_id, "writing compaction record", e))?;
        let mut index = self.list_compaction_records(session_id)?;
        index.push(CompactionRecordSummary::from(record));
        fsio::write_json(&self.records_index_path(session_id), &index)
            .map_err(|e| self.map_io(session_id, "writing compaction index", e))
    }

    pub fn list_compaction_records(
        &self,
        session_id: &str,
    ) -> Result<Vec<CompactionRecordSummary>, WoloError> {
        let path = self.records_index_path(session_id);
        if !path.exists() {
            return Ok(Vec::new());
        }
        fsio::read_json(&path).map_err(|e| self.map_io(session_id, "reading compaction index", e))
    }

    pub fn load_compaction_record(
        &self,
        session_id: &str,
        record_id: &str,
    ) -> Result<CompactionRecord, WoloError> {
        fsio::read_json(&self.record_path(session_id, record_id))
            .map_err(|e| self.map_io(session_id, "reading compaction record", e))
    }

    // ── Path confirmations ───────────────────────────────────────────────────

    pub fn save_confirmations(
        &self,
        session_id: &str,
        confirmations: &PathConfirmations,
    ) -> Result<(), WoloError> {
        fsio::write_json(&self.confirmations_path(session_id), confirmations)
            .map_err(|e| self.map_io(session_id, "writing path confirmations", e))
    }

    pub fn load_confirmations(&self, session_id: &str) -> Result<PathConfirmations, WoloError> {
        let path = self.confirmations_path(session_id);
        if !path.exists() {
            return Ok(PathConfirmations::default());
        }
        fsio::read_json(&path).map_err(|e| self.map_io(session_id, "reading path confirmations", e))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
