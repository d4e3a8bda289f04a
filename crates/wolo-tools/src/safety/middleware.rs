// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The path-guard middleware every write-capable tool goes through.
//!
//! Constructed once per agent loop (never a global) with the session's
//! whitelist, the active confirmation strategy, the per-session confirmation
//! cap, and the denial audit log.  Confirmed directories are persisted to
//! the session on every change and restored on resume.

use std::future::Future;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use wolo_error::{path_kind, WoloError};
use wolo_model::ToolPart;
use wolo_store::{PathConfirmations, SessionStore};

use crate::safety::confirm::{ConfirmDecision, ConfirmationStrategy};
use crate::safety::whitelist::{Operation, PathCheck, PathChecker, PathWhitelist};

/// Metadata keys set on refused tool parts.
pub const META_DENIED_BY_USER: &str = "path_denied_by_user";
pub const META_NOT_ALLOWED: &str = "path_not_allowed";

/// Outcome of an authorization check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authorization {
    Allowed,
    Denied {
        reason: String,
        /// Which refusal metadata key applies.
        metadata_key: &'static str,
    },
}

pub struct PathGuard {
    checker: Mutex<PathChecker>,
    strategy: Box<dyn ConfirmationStrategy>,
    store: Arc<SessionStore>,
    session_id: String,
    confirmation_count: Mutex<u32>,
    max_confirmations: u32,
    audit_log: Option<PathBuf>,
}

impl PathGuard {
    /// Build the guard and restore any directories confirmed in earlier runs
    /// of this session.
    pub fn new(
        mut whitelist: PathWhitelist,
        strategy: Box<dyn ConfirmationStrategy>,
        store: Arc<SessionStore>,
        session_id: impl Into<String>,
        max_confirmations: u32,
        audit_log: Option<PathBuf>,
    ) -> Result<Self, WoloError> {
        let session_id = session_id.into();
        let restored = store.load_confirmations(&session_id)?;
        for dir in &restored.dirs {
            whitelist.add_confirmed(Path::new(dir));
        }
        Ok(Self {
            checker: Mutex::new(PathChecker::new(whitelist)),
            strategy,
            store,
            session_id,
            confirmation_count: Mutex::new(restored.count),
            max_confirmations,
            audit_log,
        })
    }

    /// Check a write-class operation, consulting the confirmation strategy
    /// on a whitelist miss.  Does not touch the tool part — `multiedit`
    /// aggregates several authorizations into one part.
    ///
    /// A `Quit` answer cancels the whole session by propagating a
    /// `PathSafetyError` with kind `cancelled_by_user`.
    pub async fn authorize(&self, path: &Path, op: Operation) -> Result<Authorization, WoloError> {
        let check = self.checker.lock().unwrap().check(path, op);
        match check {
            PathCheck::Allowed => Ok(Authorization::Allowed),
            PathCheck::Denied { reason } => {
                self.audit("denied", path, op, &reason);
                Ok(Authorization::Denied {
                    reason,
                    metadata_key: META_NOT_ALLOWED,
                })
            }
            PathCheck::RequiresConfirmation => self.confirm(path, op).await,
        }
    }

    async fn confirm(&self, path: &Path, op: Operation) -> Result<Authorization, WoloError> {
        {
            let count = self.confirmation_count.lock().unwrap();
            if *count >= self.max_confirmations {
                let reason = format!(
                    "confirmation limit reached ({} per session); {} is outside allowed paths",
                    self.max_confirmations,
                    path.display()
                );
                drop(count);
                self.audit("cap_exhausted", path, op, &reason);
                return Ok(Authorization::Denied {
                    reason,
                    metadata_key: META_NOT_ALLOWED,
                });
            }
        }

        let decision = self.strategy.confirm(path, op).await?;
        {
            let mut count = self.confirmation_count.lock().unwrap();
            *count += 1;
        }

        match decision {
            ConfirmDecision::Yes => {
                self.persist_confirmations()?;
                // Re-check: a single yes approves exactly this operation and
                // must still pass the whitelist-or-confirmed gate next time.
                Ok(Authorization::Allowed)
            }
            ConfirmDecision::AlwaysDir => {
                let dir = path.parent().unwrap_or(path);
                info!(dir = %dir.display(), "user confirmed directory for this session");
                self.checker
                    .lock()
                    .unwrap()
                    .whitelist_mut()
                    .add_confirmed(dir);
                self.persist_confirmations()?;
                let recheck = self.checker.lock().unwrap().check(path, op);
                match recheck {
                    PathCheck::Allowed => Ok(Authorization::Allowed),
                    _ => Ok(Authorization::Denied {
                        reason: format!("{} still outside allowed paths", path.display()),
                        metadata_key: META_NOT_ALLOWED,
                    }),
                }
            }
            ConfirmDecision::No => {
                let reason = format!("user denied {} to {}", op.as_str(), path.display());
                warn!(path = %path.display(), op = op.as_str(), "write denied by user");
                self.persist_confirmations()?;
                self.audit("denied_by_user", path, op, &reason);
                Ok(Authorization::Denied {
                    reason,
                    metadata_key: META_DENIED_BY_USER,
                })
            }
            ConfirmDecision::Quit => {
                let reason = format!(
                    "user cancelled the session at {} confirmation",
                    op.as_str()
                );
                self.audit("cancelled_by_user", path, op, &reason);
                Err(
                    WoloError::path_safety(path_kind::CANCELLED_BY_USER, reason)
                        .with_session(self.session_id.clone())
                        .with_context("path", path.display().to_string()),
                )
            }
        }
    }

    /// The universal wrapper for single-path write tools: check, confirm if
    /// needed, run the operation, and shape the part's final state.
    ///
    /// `f` performs the actual file work and returns `Ok((output, metadata))`
    /// or `Err(message)` for an expected tool-level failure.
    pub async fn execute_with_path_check<F, Fut>(
        &self,
        part: &mut ToolPart,
        path: &Path,
        op: Operation,
        f: F,
    ) -> Result<(), WoloError>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<(String, Map<String, Value>), String>> + Send,
    {
        match self.authorize(path, op).await? {
            Authorization::Denied {
                reason,
                metadata_key,
            } => {
                deny_part(part, &reason, metadata_key);
                Ok(())
            }
            Authorization::Allowed => {
                match f().await {
                    Ok((output, metadata)) => {
                        for (k, v) in metadata {
                            part.set_meta(&k, v);
                        }
                        part.complete(output);
                    }
                    Err(message) => part.fail(message),
                }
                Ok(())
            }
        }
    }

    /// Count of confirmations spent so far (restored + this run).
    pub fn confirmations_used(&self) -> u32 {
        *self.confirmation_count.lock().unwrap()
    }

    fn persist_confirmations(&self) -> Result<(), WoloError> {
        let dirs: Vec<String> = {
            let checker = self.checker.lock().unwrap();
            checker
                .whitelist()
                .confirmed_dirs()
                .iter()
                .map(|p| p.display().to_string())
                .collect()
        };
        let count = *self.confirmation_count.lock().unwrap();
        self.store.save_confirmations(
            &self.session_id,
            &PathConfirmations {
                dirs,
                count,
                updated_at: Some(Utc::now()),
            },
        )
    }

    /// Append-only denial audit trail.
    fn audit(&self, event: &str, path: &Path, op: Operation, reason: &str) {
        let Some(log_path) = &self.audit_log else {
            return;
        };
        let line = format!(
            "{}\t{}\t{}\t{}\t{}\t{}\n",
            Utc::now().to_rfc3339(),
            self.session_id,
            event,
            op.as_str(),
            path.display(),
            reason
        );
        let result = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)
            .and_then(|mut f| f.write_all(line.as_bytes()));
        if let Err(e) = result {
            warn!(path = %log_path.display(), "failed to append audit log: {e}");
        }
    }
}

/// Mark a part as refused by the path guard.
pub fn deny_part(part: &mut ToolPart, reason: &str, metadata_key: &'static str) {
    part.set_meta(metadata_key, json!(true));
    part.set_meta("error", json!(metadata_key));
    part.fail(format!("Path safety: {reason}"));
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
