// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::debug;

use wolo_error::WoloError;

use crate::{SessionMeta, SessionStore};

/// Debounced writer for the aggregate session metadata.
///
/// `save()` coalesces the frequent per-event calls from the agent loop into
/// at most one `session.json` write per interval (500 ms by default);
/// `flush()` forces an immediate write and is called on error, interrupt,
/// and normal exit.  Per-message files and the other recoverable state are
/// written eagerly elsewhere — only this aggregate is debounced.
pub struct SessionSaver {
    store: Arc<SessionStore>,
    min_interval: Duration,
    last_write: Option<Instant>,
    dirty: bool,
}

impl SessionSaver {
    pub fn new(store: Arc<SessionStore>) -> Self {
        Self::with_interval(store, Duration::from_millis(500))
    }

    pub fn with_interval(store: Arc<SessionStore>, min_interval: Duration) -> Self {
        Self {
            store,
            min_interval,
            last_write: None,
            dirty: false,
        }
    }

    /// Record activity and write `session.json` unless a write happened
    /// within the debounce interval.
    pub fn save(&mut self, meta: &mut SessionMeta) -> Result<(), WoloError> {
        meta.updated_at = Utc::now();
        meta.last_activity = Some(meta.updated_at);
        let due = match self.last_write {
            None => true,
            Some(t) => t.elapsed() >= self.min_interval,
        };
        if !due {
            self.dirty = true;
            return Ok(());
        }
        self.write(meta)
    }

    /// Unconditional write, regardless of the debounce window.
    pub fn flush(&mut self, meta: &mut SessionMeta) -> Result<(), WoloError> {
        meta.updated_at = Utc::now();
        meta.last_activity = Some(meta.updated_at);
        self.write(meta)
    }

    /// True when a `save()` was swallowed by the debounce window and no
    /// flush has happened since.
    pub fn has_pending(&self) -> bool {
        self.dirty
    }

    fn write(&mut self, meta: &SessionMeta) -> Result<(), WoloError> {
        debug!(session = %meta.id, "persisting session metadata");
        self.store.save_meta(meta)?;
        self.last_write = Some(Instant::now());
        self.dirty = false;
        Ok(())
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
