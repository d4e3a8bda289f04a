// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
mod agent;
pub mod compact;
mod control;
pub mod input;
pub mod prompts;
mod taskstate;

pub use agent::{AgentEvent, AgentLoop, LoopOutcome, DEFAULT_MAX_STEPS};
pub use compact::{
    should_compact, CompactionContext, CompactionDecision, CompactionPipeline, CompactionResult,
    CompactionStrategy, PolicyResult, PolicyStatus, SummaryStrategy, ToolPruningStrategy,
};
pub use control::ControlManager;
pub use taskstate::{DoomEntry, DoomLoopHistory, TaskState, DOOM_LOOP_THRESHOLD};
