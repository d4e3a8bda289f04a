// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Execute a coding task with an AI agent, with pausable, resumable,
/// crash-safe sessions.
#[derive(Parser, Debug)]
#[command(name = "wolo", version, about, disable_help_subcommand = true)]
pub struct Cli {
    /// The task to perform.  May be combined with piped stdin, which is then
    /// treated as context.
    pub prompt: Option<String>,

    /// Continue (or create) a named session
    #[arg(short = 's', long = "session", conflicts_with = "resume")]
    pub session: Option<String>,

    /// Resume an existing session by id (requires a prompt)
    #[arg(short = 'r', long = "resume")]
    pub resume: Option<String>,

    /// List sessions and exit
    #[arg(short = 'l', long = "list")]
    pub list: bool,

    /// Watch a session's messages as they are written
    #[arg(short = 'w', long = "watch")]
    pub watch: Option<String>,

    /// Agent type (default | coder | reviewer)
    #[arg(short = 'a', long = "agent", default_value = "default")]
    pub agent: String,

    /// Model override for this run
    #[arg(short = 'm', long = "model")]
    pub model: Option<String>,

    /// Maximum agent steps before giving up
    #[arg(short = 'n', long = "max-steps", default_value_t = 100)]
    pub max_steps: u64,

    /// Named endpoint from the config file
    #[arg(short = 'e', long = "endpoint")]
    pub endpoint: Option<String>,

    /// Log filter (error | warn | info | debug | trace)
    #[arg(short = 'L', long = "log-level", default_value = "warn")]
    pub log_level: String,

    /// Additional directory where file-writing tools may operate
    /// without confirmation (repeatable)
    #[arg(short = 'P', long = "allow-path")]
    pub allow_path: Vec<PathBuf>,

    /// Working directory for the run
    #[arg(short = 'C', long = "workdir")]
    pub workdir: Option<PathBuf>,

    /// API key (prefer the WOLO_API_KEY environment variable)
    #[arg(long = "api-key", hide = true)]
    pub api_key: Option<String>,

    /// Autonomous mode: the agent never asks questions (default)
    #[arg(long, conflicts_with = "coop")]
    pub solo: bool,

    /// Cooperative mode: the agent may ask the user questions
    #[arg(long)]
    pub coop: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Continuous conversation mode
    Chat,
    /// Alias of `chat`
    Repl,
    /// Session management
    Session {
        #[command(subcommand)]
        command: SessionCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum SessionCommands {
    /// List all sessions
    List,
    /// Show a session's metadata and conversation
    Show { id: String },
    /// Resume a session with a new prompt
    Resume { id: String, prompt: String },
    /// Watch a session's messages as they are written
    Watch { id: String },
    /// Delete a session
    Delete { id: String },
    /// Remove sessions older than N days
    Clean {
        #[arg(long, default_value_t = 30)]
        days: i64,
    },
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn bare_prompt_parses() {
        let cli = Cli::parse_from(["wolo", "fix the tests"]);
        assert_eq!(cli.prompt.as_deref(), Some("fix the tests"));
        assert!(!cli.coop);
        assert_eq!(cli.max_steps, 100);
        assert_eq!(cli.agent, "default");
    }

    #[test]
    fn session_and_resume_are_mutually_exclusive() {
        let err = Cli::try_parse_from(["wolo", "-s", "a", "-r", "b", "task"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArgumentConflict);
    }

    #[test]
    fn solo_and_coop_are_mutually_exclusive() {
        let err = Cli::try_parse_from(["wolo", "--solo", "--coop", "task"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArgumentConflict);
    }

    #[test]
    fn allow_path_is_repeatable() {
        let cli = Cli::parse_from(["wolo", "-P", "/a", "-P", "/b", "task"]);
        assert_eq!(cli.allow_path.len(), 2);
    }

    #[test]
    fn short_flags_map_to_the_documented_options() {
        let cli = Cli::parse_from([
            "wolo", "-s", "fox", "-a", "coder", "-m", "gpt-x", "-n", "7", "-e", "local", "-L",
            "debug", "-C", "/srv", "task",
        ]);
        assert_eq!(cli.session.as_deref(), Some("fox"));
        assert_eq!(cli.agent, "coder");
        assert_eq!(cli.model.as_deref(), Some("gpt-x"));
        assert_eq!(cli.max_steps, 7);
        assert_eq!(cli.endpoint.as_deref(), Some("local"));
        assert_eq!(cli.log_level, "debug");
        assert_eq!(cli.workdir.as_deref(), Some(std::path::Path::new("/srv")));
    }

    #[test]
    fn session_subcommands_parse() {
        let cli = Cli::parse_from(["wolo", "session", "clean", "--days", "7"]);
        match cli.command {
            Some(Commands::Session {
                command: SessionCommands::Clean { days },
            }) => assert_eq!(days, 7),
            other => panic!("unexpected command: {other:?}"),
        }

        let cli = Cli::parse_from(["wolo", "session", "resume", "brave-fox", "continue"]);
        match cli.command {
            Some(Commands::Session {
                command: SessionCommands::Resume { id, prompt },
            }) => {
                assert_eq!(id, "brave-fox");
                assert_eq!(prompt, "continue");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
