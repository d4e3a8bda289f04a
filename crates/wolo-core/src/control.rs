// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Control flags for one agent loop, updatable from signal handlers and
/// other tasks.  Cloning shares the underlying flags.
#[derive(Debug, Clone, Default)]
pub struct ControlManager {
    inner: Arc<Flags>,
}

#[derive(Debug, Default)]
struct Flags {
    paused: AtomicBool,
    stopped: AtomicBool,
    cancelled: AtomicBool,
}

impl ControlManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pause(&self) {
        self.inner.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.inner.paused.store(false, Ordering::SeqCst);
    }

    /// Stop after the current step completes.
    pub fn stop(&self) {
        self.inner.stopped.store(true, Ordering::SeqCst);
    }

    /// Abort as soon as possible, closing any in-flight model stream.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.inner.paused.load(Ordering::SeqCst)
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Block cooperatively while paused.  Cancellation breaks the wait.
    pub async fn wait_if_paused(&self) {
        while self.is_paused() && !self.is_cancelled() {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_start_clear() {
        let c = ControlManager::new();
        assert!(!c.is_paused());
        assert!(!c.is_stopped());
        assert!(!c.is_cancelled());
    }

    #[test]
    fn clones_share_state() {
        let a = ControlManager::new();
        let b = a.clone();
        b.cancel();
        assert!(a.is_cancelled());
    }

    #[test]
    fn pause_and_resume_toggle() {
        let c = ControlManager::new();
        c.pause();
        assert!(c.is_paused());
        c.resume();
        assert!(!c.is_paused());
    }

    #[tokio::test]
    async fn cancel_breaks_a_paused_wait() {
        let c = ControlManager::new();
        c.pause();
        let waiter = c.clone();
        let handle = tokio::spawn(async move { waiter.wait_if_paused().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!handle.is_finished());
        c.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("wait did not break on cancel")
            .unwrap();
    }
}
