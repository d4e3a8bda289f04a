// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Per-loop state that must never leak between concurrent agent loops.
//!
//! Each loop owns one [`TaskState`].  A sub-agent spawned from a loop starts
//! from `snapshot()` — it inherits the parent's current values, and nothing
//! it does flows back.  Accessors return copies, mutation is by explicit
//! method, and no global or thread-local storage exists anywhere.

use std::collections::VecDeque;

use sha2::{Digest, Sha256};

use wolo_model::{Todo, TokenUsage};

/// Default doom-loop threshold: identical consecutive calls before tripping.
pub const DOOM_LOOP_THRESHOLD: usize = 5;

/// One observed mutating tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DoomEntry {
    pub tool_name: String,
    pub input_hash: String,
    pub context_hash: String,
}

impl DoomEntry {
    pub fn new(tool_name: &str, serialized_input: &str, context: &str) -> Self {
        Self {
            tool_name: tool_name.to_string(),
            input_hash: sha256_hex(serialized_input),
            context_hash: sha256_hex(context),
        }
    }
}

fn sha256_hex(data: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data.as_bytes());
    hex::encode(hasher.finalize())
}

/// Bounded ring of recent mutating tool calls.  Trips when the ring is full
/// and every entry is identical.
#[derive(Debug, Clone)]
pub struct DoomLoopHistory {
    ring: VecDeque<DoomEntry>,
    capacity: usize,
}

impl Default for DoomLoopHistory {
    fn default() -> Self {
        Self::with_capacity(DOOM_LOOP_THRESHOLD)
    }
}

impl DoomLoopHistory {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            ring: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Consult-then-push.  Returns true — WITHOUT recording — when the ring
    /// already holds `capacity` entries identical to this one: the call must
    /// not be dispatched.  Otherwise the entry is recorded and execution may
    /// proceed, so the threshold-th identical call still runs and the next
    /// one trips the guard.
    pub fn record(&mut self, entry: DoomEntry) -> bool {
        if self.ring.len() == self.capacity && self.ring.iter().all(|e| e == &entry) {
            return true;
        }
        if self.ring.len() == self.capacity {
            self.ring.pop_front();
        }
        self.ring.push_back(entry);
        false
    }

    pub fn entries(&self) -> Vec<DoomEntry> {
        self.ring.iter().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.ring.clear();
    }
}

/// All task-local state for one agent loop.
#[derive(Debug, Clone, Default)]
pub struct TaskState {
    usage: TokenUsage,
    doom: DoomLoopHistory,
    todos: Vec<Todo>,
}

impl TaskState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cumulative token usage (defensive copy).
    pub fn usage(&self) -> TokenUsage {
        self.usage
    }

    pub fn add_usage(&mut self, usage: TokenUsage) {
        self.usage.add(usage);
    }

    /// Record a mutating tool call in the doom ring.
    pub fn record_tool_call(&mut self, entry: DoomEntry) -> bool {
        self.doom.record(entry)
    }

    pub fn doom_history(&self) -> Vec<DoomEntry> {
        self.doom.entries()
    }

    /// Cached session todos (defensive copy).
    pub fn todos(&self) -> Vec<Todo> {
        self.todos.clone()
    }

    pub fn set_todos(&mut self, todos: Vec<Todo>) {
        self.todos = todos;
    }

    /// Value a spawned child loop starts from.  Mutations on the child do
    /// not escape back to the parent.
    pub fn snapshot(&self) -> TaskState {
        self.clone()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
