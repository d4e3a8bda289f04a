// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};

/// Serde default helper — returns `true`.
///
/// `#[serde(default)]` on a `bool` always falls back to `bool::default()`
/// (i.e. `false`), so fields that should be on unless explicitly disabled
/// need a named function.
fn default_true() -> bool {
    true
}

/// How the agent interacts with the human driving it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExecMode {
    /// Fully autonomous: the `question` tool is withheld from the model and
    /// path confirmations auto-deny on a non-TTY.
    #[default]
    Solo,
    /// Cooperative: the model may ask the user questions mid-task.
    Coop,
    /// As Coop, but the loop reads another user line after each answer
    /// instead of terminating.
    Repl,
}

impl std::fmt::Display for ExecMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecMode::Solo => write!(f, "solo"),
            ExecMode::Coop => write!(f, "coop"),
            ExecMode::Repl => write!(f, "repl"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Named LLM endpoints.  Select with `-e NAME`; the first entry is used
    /// when `default_endpoint` is unset.
    #[serde(default)]
    pub endpoints: Vec<EndpointConfig>,
    #[serde(default)]
    pub default_endpoint: Option<String>,
    /// Request reasoning traces from the model and keep them on the
    /// assistant messages.
    #[serde(default)]
    pub enable_think: bool,
    #[serde(default)]
    pub compaction: CompactionConfig,
    #[serde(default)]
    pub path_safety: PathSafetyConfig,
    /// Directory holding skill documents served by the `skill` tool.
    #[serde(default)]
    pub skills_dir: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub name: String,
    /// Model identifier forwarded to the provider API
    pub model: String,
    /// Chat-completions API base, e.g. `https://api.openai.com/v1`
    pub api_base: String,
    /// Explicit API key; prefer the environment so secrets stay out of
    /// version-controlled files.  Loading a key from here logs a warning.
    pub api_key: Option<String>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Context window used for the compaction budget.  Falls back to
    /// `max_tokens` when unset.
    pub context_window: Option<u32>,
}

fn default_overflow_threshold() -> f32 {
    0.9
}
fn default_check_interval_steps() -> u64 {
    3
}
fn default_reserved_tokens() -> usize {
    2000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompactionConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// When true the overflow ratio gates compaction; when false every
    /// eligible step compacts unconditionally.
    #[serde(default = "default_true")]
    pub auto_compact: bool,
    /// `current_tokens / limit` ratio at which compaction triggers.
    #[serde(default = "default_overflow_threshold")]
    pub overflow_threshold: f32,
    /// Decision is only evaluated every N agent steps.
    #[serde(default = "default_check_interval_steps")]
    pub check_interval_steps: u64,
    /// Subtracted from the model window before computing the limit, leaving
    /// room for the next completion.
    #[serde(default = "default_reserved_tokens")]
    pub reserved_tokens: usize,
    #[serde(default)]
    pub pruning: PruningConfig,
    #[serde(default)]
    pub summary: SummaryConfig,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            auto_compact: true,
            overflow_threshold: default_overflow_threshold(),
            check_interval_steps: default_check_interval_steps(),
            reserved_tokens: default_reserved_tokens(),
            pruning: PruningConfig::default(),
            summary: SummaryConfig::default(),
        }
    }
}

fn default_protect_recent_turns() -> usize {
    2
}
fn default_protect_token_threshold() -> usize {
    40_000
}
fn default_minimum_prune_tokens() -> usize {
    20_000
}
fn default_replacement_text() -> String {
    "[Output pruned to save context space]".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PruningConfig {
    /// Number of trailing user↔assistant turns whose tool outputs are never
    /// pruned.
    #[serde(default = "default_protect_recent_turns")]
    pub protect_recent_turns: usize,
    /// Additionally protect the most recent N tokens worth of tool outputs.
    #[serde(default = "default_protect_token_threshold")]
    pub protect_token_threshold: usize,
    /// Pruning only runs when the estimated saving reaches this many tokens.
    #[serde(default = "default_minimum_prune_tokens")]
    pub minimum_prune_tokens: usize,
    #[serde(default = "default_replacement_text")]
    pub replacement_text: String,
    /// Tool names whose outputs are never pruned.
    #[serde(default)]
    pub protected_tools: Vec<String>,
}

impl Default for PruningConfig {
    fn default() -> Self {
        Self {
            protect_recent_turns: default_protect_recent_turns(),
            protect_token_threshold: default_protect_token_threshold(),
            minimum_prune_tokens: default_minimum_prune_tokens(),
            replacement_text: default_replacement_text(),
            protected_tools: Vec::new(),
        }
    }
}

fn default_recent_exchanges() -> usize {
    6
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryConfig {
    /// Trailing user↔assistant exchanges kept verbatim; everything older is
    /// folded into the LLM summary.
    #[serde(default = "default_recent_exchanges")]
    pub recent_exchanges_to_keep: usize,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            recent_exchanges_to_keep: default_recent_exchanges(),
        }
    }
}

fn default_max_confirmations() -> u32 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathSafetyConfig {
    /// Directory trees where file-writing tools may operate without asking.
    #[serde(default)]
    pub allowed_write_paths: Vec<String>,
    /// Ceiling on interactive confirmations within one session.
    #[serde(default = "default_max_confirmations")]
    pub max_confirmations_per_session: u32,
    /// Append every denial to the audit log.
    #[serde(default)]
    pub audit_denied: bool,
    #[serde(default)]
    pub audit_log_file: Option<String>,
}

impl Default for PathSafetyConfig {
    fn default() -> Self {
        Self {
            allowed_write_paths: Vec::new(),
            max_confirmations_per_session: default_max_confirmations(),
            audit_denied: false,
            audit_log_file: None,
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
