// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
pub mod edit;
pub mod glob;
pub mod grep;
pub mod memory;
pub mod multiedit;
pub mod question;
pub mod read;
pub mod shell;
pub mod skill;
pub mod todo;
pub mod webfetch;
pub mod write;

pub use edit::EditTool;
pub use glob::GlobTool;
pub use grep::GrepTool;
pub use memory::MemoryTool;
pub use multiedit::MultiEditTool;
pub use question::QuestionTool;
pub use read::ReadTool;
pub use shell::{is_safe_shell_command, ShellTool, SAFE_SHELL_PREFIXES};
pub use skill::{SkillInfo, SkillTool};
pub use todo::{TodoReadTool, TodoWriteTool};
pub use webfetch::WebFetchTool;
pub use write::WriteTool;
