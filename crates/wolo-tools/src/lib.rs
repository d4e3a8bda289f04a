// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
pub mod builtin;
mod filetime;
mod registry;
pub mod safety;
mod tool;
pub mod truncate;

pub use builtin::{is_safe_shell_command, SAFE_SHELL_PREFIXES};
pub use filetime::FileTimeTracker;
pub use registry::ToolRegistry;
pub use safety::{
    AutoAllow, AutoDeny, CliConfirmation, ConfirmDecision, ConfirmationStrategy, Operation,
    PathCheck, PathChecker, PathGuard, PathWhitelist,
};
pub use tool::{require_str, Tool, ToolCategory, ToolContext, ToolSpec};
