// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which compaction policy produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompactionPolicy {
    ToolPruning,
    Summary,
}

impl std::fmt::Display for CompactionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompactionPolicy::ToolPruning => write!(f, "tool_pruning"),
            CompactionPolicy::Summary => write!(f, "summary"),
        }
    }
}

/// Immutable audit record of one applied compaction.
///
/// The referenced message bodies stay in the store untouched; the record is
/// what makes the rewrite recoverable.  Frozen after write — the store only
/// ever appends these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompactionRecord {
    pub id: String,
    pub session_id: String,
    pub policy: CompactionPolicy,
    pub created_at: DateTime<Utc>,
    pub original_tokens: usize,
    pub result_tokens: usize,
    pub original_message_count: usize,
    pub result_message_count: usize,
    /// Ids of the messages this compaction rewrote or folded away.
    pub compacted_message_ids: Vec<String>,
    /// Ids of the messages kept verbatim.
    pub preserved_message_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary_message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary_text: Option<String>,
    /// Snapshot of the compaction config in effect, including the base used
    /// for the token limit, so the decision can be audited later.
    pub config_snapshot: serde_json::Value,
}

impl CompactionRecord {
    pub fn new(session_id: impl Into<String>, policy: CompactionPolicy) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.into(),
            policy,
            created_at: Utc::now(),
            original_tokens: 0,
            result_tokens: 0,
            original_message_count: 0,
            result_message_count: 0,
            compacted_message_ids: Vec::new(),
            preserved_message_ids: Vec::new(),
            summary_message_id: None,
            summary_text: None,
            config_snapshot: serde_json::Value::Null,
        }
    }
}

/// Lightweight index row for `compaction/records.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompactionRecordSummary {
    pub id: String,
    pub policy: CompactionPolicy,
    pub created_at: DateTime<Utc>,
    pub original_tokens: usize,
    pub result_tokens: usize,
}

impl From<&CompactionRecord> for CompactionRecordSummary {
    fn from(r: &CompactionRecord) -> Self {
        Self {
            id: r.id.clone(),
            policy: r.policy,
            created_at: r.created_at,
            original_tokens: r.original_tokens,
            result_tokens: r.result_tokens,
        }
    }
}
