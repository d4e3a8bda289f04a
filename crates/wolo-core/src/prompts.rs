// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! System prompt templates for the built-in agent types.

const BASE_TEMPLATE: &str = "You are {agent_name}, an AI coding agent working in a terminal. \
You operate on the user's files through tools. Rules:\n\
- Prefer the read/edit/grep/glob tools over shell equivalents.\n\
- Read a file before editing it; keep edits minimal and precise.\n\
- Use todowrite to track multi-step work and keep exactly one item in progress.\n\
- When the task is done, summarise what changed and stop calling tools.\n\
\n\
Working directory: {workdir}";

const CODER_APPENDIX: &str = "\n\nYou specialise in writing and refactoring code. \
Match the conventions of the surrounding codebase and run the project's tests \
through the shell tool when they exist.";

const REVIEWER_APPENDIX: &str = "\n\nYou specialise in reviewing changes. \
Do not modify files; read, search, and report findings ordered by severity, \
with file and line references.";

/// Display name substituted into the template's placeholder.
pub fn agent_display_name(agent_type: &str) -> &str {
    match agent_type {
        "coder" => "Wolo Coder",
        "reviewer" => "Wolo Reviewer",
        _ => "Wolo",
    }
}

/// Build the system prompt for an agent type.  Unknown types fall back to
/// the default template so a typo degrades gracefully.
pub fn system_prompt(agent_type: &str, workdir: &str) -> String {
    let mut prompt = BASE_TEMPLATE
        .replace("{agent_name}", agent_display_name(agent_type))
        .replace("{workdir}", workdir);
    match agent_type {
        "coder" => prompt.push_str(CODER_APPENDIX),
        "reviewer" => prompt.push_str(REVIEWER_APPENDIX),
        _ => {}
    }
    prompt
}

/// The agent types the CLI accepts for `-a/--agent`.
pub const AGENT_TYPES: &[&str] = &["default", "coder", "reviewer"];

// ─── Unit tests ──────────────────────────────────────────────────────────────
