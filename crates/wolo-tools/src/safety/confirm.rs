// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::io::Write;
use std::path::Path;

use async_trait::async_trait;

use wolo_error::WoloError;

use crate::safety::whitelist::Operation;

/// What the user answered to a path confirmation prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmDecision {
    /// Allow this one operation.
    Yes,
    /// Deny this operation; the session continues.
    No,
    /// Allow and add the target's parent directory to the session-confirmed
    /// set so the rest of the run does not ask again.
    AlwaysDir,
    /// Cancel the whole session.
    Quit,
}

/// Pluggable confirmation channel consulted when a write-class operation
/// misses the whitelist.
#[async_trait]
pub trait ConfirmationStrategy: Send + Sync {
    async fn confirm(&self, path: &Path, op: Operation) -> Result<ConfirmDecision, WoloError>;
}

/// Interactive prompt on the controlling terminal (`Y/n/a/q`).
///
/// Falls back to deny when stdin is not a TTY, so piped and CI invocations
/// never hang on a prompt.
pub struct CliConfirmation;

#[async_trait]
impl ConfirmationStrategy for CliConfirmation {
    async fn confirm(&self, path: &Path, op: Operation) -> Result<ConfirmDecision, WoloError> {
        if !stdin_is_tty() {
            return Ok(ConfirmDecision::No);
        }
        let prompt = format!(
            "wolo wants to {} {} (outside allowed paths).\n\
             Allow? [Y]es / [n]o / [a]lways for this directory / [q]uit session: ",
            op.as_str(),
            path.display()
        );
        let answer = tokio::task::spawn_blocking(move || -> std::io::Result<String> {
            let mut err = std::io::stderr();
            err.write_all(prompt.as_bytes())?;
            err.flush()?;
            let mut line = String::new();
            std::io::stdin().read_line(&mut line)?;
            Ok(line)
        })
        .await
        .map_err(|e| WoloError::tool(format!("confirmation prompt task failed: {e}")))?
        .map_err(|e| WoloError::tool(format!("confirmation prompt failed: {e}")))?;

        Ok(parse_answer(&answer))
    }
}

fn stdin_is_tty() -> bool {
    #[cfg(unix)]
    {
        unsafe { libc::isatty(libc::STDIN_FILENO) == 1 }
    }
    #[cfg(not(unix))]
    {
        false
    }
}

fn parse_answer(answer: &str) -> ConfirmDecision {
    match answer.trim().to_lowercase().as_str() {
        "" | "y" | "yes" => ConfirmDecision::Yes,
        "a" | "always" => ConfirmDecision::AlwaysDir,
        "q" | "quit" => ConfirmDecision::Quit,
        _ => ConfirmDecision::No,
    }
}

/// Deny everything.  Used in non-interactive environments (solo mode on a
/// non-TTY) where asking is impossible.
pub struct AutoDeny;

#[async_trait]
impl ConfirmationStrategy for AutoDeny {
    async fn confirm(&self, _path: &Path, _op: Operation) -> Result<ConfirmDecision, WoloError> {
        Ok(ConfirmDecision::No)
    }
}

/// Allow everything.  Tests only.
pub struct AutoAllow;

#[async_trait]
impl ConfirmationStrategy for AutoAllow {
    async fn confirm(&self, _path: &Path, _op: Operation) -> Result<ConfirmDecision, WoloError> {
        Ok(ConfirmDecision::Yes)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
