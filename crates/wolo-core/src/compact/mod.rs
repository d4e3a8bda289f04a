// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! History compaction: a priority-ordered strategy pipeline that shrinks the
//! message window sent to the model while leaving the on-disk messages
//! untouched.  Every applied strategy emits an immutable
//! [`CompactionRecord`] so the rewrite stays auditable and recoverable.

pub mod estimate;
mod prune;
mod summary;

use async_trait::async_trait;
use tracing::{debug, warn};

use wolo_config::CompactionConfig;
use wolo_model::{CompactionPolicy, CompactionRecord, Message};

pub use prune::ToolPruningStrategy;
pub use summary::SummaryStrategy;

/// Everything a strategy may look at.
pub struct CompactionContext<'a> {
    pub session_id: &'a str,
    /// Immutable view of the current window.
    pub messages: &'a [Message],
    pub token_count: usize,
    pub token_limit: usize,
    pub model: &'a str,
    pub config: &'a CompactionConfig,
}

/// Outcome of the trigger check.
#[derive(Debug, Clone)]
pub struct CompactionDecision {
    pub should_compact: bool,
    pub reason: String,
    pub token_count: usize,
    pub token_limit: usize,
    pub ratio: f32,
}

/// Evaluate the compaction trigger for the current step.
///
/// Fires when compaction is enabled, the step lands on the check interval,
/// and (under `auto_compact`) the window fills at least
/// `overflow_threshold` of the limit.
pub fn should_compact(
    config: &CompactionConfig,
    token_count: usize,
    token_limit: usize,
    step: u64,
) -> CompactionDecision {
    let ratio = if token_limit == 0 {
        0.0
    } else {
        token_count as f32 / token_limit as f32
    };
    let mut decision = CompactionDecision {
        should_compact: false,
        reason: String::new(),
        token_count,
        token_limit,
        ratio,
    };

    if !config.enabled {
        decision.reason = "compaction disabled".into();
        return decision;
    }
    if config.check_interval_steps > 0 && step % config.check_interval_steps != 0 {
        decision.reason = format!(
            "step {step} not on check interval ({})",
            config.check_interval_steps
        );
        return decision;
    }
    if config.auto_compact && ratio < config.overflow_threshold {
        decision.reason = format!(
            "window at {:.0}% of limit, below threshold {:.0}%",
            ratio * 100.0,
            config.overflow_threshold * 100.0
        );
        return decision;
    }

    decision.should_compact = true;
    decision.reason = format!(
        "window at {token_count}/{token_limit} tokens ({:.0}%)",
        ratio * 100.0
    );
    decision
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyStatus {
    Applied,
    Skipped,
    Failed,
}

/// What one strategy did.
pub struct PolicyResult {
    pub status: PolicyStatus,
    /// Replacement window when applied.
    pub messages: Option<Vec<Message>>,
    pub record: Option<CompactionRecord>,
    pub error: Option<String>,
}

impl PolicyResult {
    pub fn skipped() -> Self {
        Self {
            status: PolicyStatus::Skipped,
            messages: None,
            record: None,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: PolicyStatus::Failed,
            messages: None,
            record: None,
            error: Some(error.into()),
        }
    }

    pub fn applied(messages: Vec<Message>, record: CompactionRecord) -> Self {
        Self {
            status: PolicyStatus::Applied,
            messages: Some(messages),
            record: Some(record),
            error: None,
        }
    }
}

/// A pluggable compaction policy.  Higher priority runs first.
#[async_trait]
pub trait CompactionStrategy: Send + Sync {
    fn name(&self) -> &str;
    fn policy_type(&self) -> CompactionPolicy;
    fn priority(&self) -> i32;
    fn should_apply(&self, ctx: &CompactionContext<'_>) -> bool;
    fn estimate_savings(&self, ctx: &CompactionContext<'_>) -> usize;
    async fn apply(&self, ctx: &CompactionContext<'_>) -> PolicyResult;
}

/// Result of a full pipeline run.
pub struct CompactionResult {
    pub messages: Vec<Message>,
    pub records: Vec<CompactionRecord>,
    pub tokens_before: usize,
    pub tokens_after: usize,
    pub reached_limit: bool,
}

/// Runs strategies in priority order until the window fits.
pub struct CompactionPipeline {
    strategies: Vec<Box<dyn CompactionStrategy>>,
}

impl CompactionPipeline {
    /// Strategies run in escalation order: lowest priority number first.
    /// Cheap remediation (tool pruning, 50) gets a chance before the
    /// expensive model-backed summary (100) is brought in.
    pub fn new(mut strategies: Vec<Box<dyn CompactionStrategy>>) -> Self {
        strategies.sort_by_key(|s| s.priority());
        Self { strategies }
    }

    /// Apply strategies in escalation order, recomputing the token count
    /// after each applied one; stop once the window is within the limit.
    ///
    /// A strategy that fails is logged and skipped; the session proceeds
    /// with whatever the earlier strategies produced.
    pub async fn run(
        &self,
        session_id: &str,
        messages: Vec<Message>,
        token_limit: usize,
        model: &str,
        config: &CompactionConfig,
    ) -> CompactionResult {
        let tokens_before = estimate::estimate_messages(&messages);
        let mut current = messages;
        let mut current_tokens = tokens_before;
        let mut records: Vec<CompactionRecord> = Vec::new();

        for strategy in &self.strategies {
            if current_tokens <= token_limit {
                break;
            }
            let ctx = CompactionContext {
                session_id,
                messages: &current,
                token_count: current_tokens,
                token_limit,
                model,
                config,
            };
            if !strategy.should_apply(&ctx) {
                debug!(strategy = strategy.name(), "strategy not applicable");
                continue;
            }
            let result = strategy.apply(&ctx).await;
            match result.status {
                PolicyStatus::Applied => {
                    if let Some(new_messages) = result.messages {
                        current = new_messages;
                        current_tokens = estimate::estimate_messages(&current);
                    }
                    if let Some(record) = result.record {
                        debug!(
                            strategy = strategy.name(),
                            tokens = current_tokens,
                            "compaction strategy applied"
                        );
                        records.push(record);
                    }
                }
                PolicyStatus::Skipped => {
                    debug!(strategy = strategy.name(), "strategy skipped");
                }
                PolicyStatus::Failed => {
                    warn!(
                        strategy = strategy.name(),
                        error = result.error.as_deref().unwrap_or("unknown"),
                        "compaction strategy failed; continuing with the next one"
                    );
                }
            }
        }

        if records.is_empty() {
            warn!(
                tokens = current_tokens,
                limit = token_limit,
                "no compaction strategy applied; proceeding with the original window"
            );
        }

        CompactionResult {
            reached_limit: current_tokens <= token_limit,
            tokens_before,
            tokens_after: current_tokens,
            messages: current,
            records,
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> CompactionConfig {
        CompactionConfig::default()
    }

    // ── should_compact ───────────────────────────────────────────────────────

    #[test]
    fn fires_on_interval_step_over_threshold() {
        let d = should_compact(&cfg(), 9500, 10_000, 3);
        assert!(d.should_compact, "{}", d.reason);
        assert!(d.ratio > 0.9);
    }

    #[test]
    fn below_threshold_does_not_fire() {
        let d = should_compact(&cfg(), 1000, 10_000, 3);
        assert!(!d.should_compact);
        assert!(d.reason.contains("below threshold"));
    }

    #[test]
    fn off_interval_step_does_not_fire() {
        let d = should_compact(&cfg(), 9999, 10_000, 4);
        assert!(!d.should_compact);
        assert!(d.reason.contains("not on check interval"));
    }

    #[test]
    fn disabled_never_fires() {
        let mut c = cfg();
        c.enabled = false;
        assert!(!should_compact(&c, 99_999, 10, 3).should_compact);
    }

    #[test]
    fn auto_compact_off_fires_on_every_interval_step() {
        let mut c = cfg();
        c.auto_compact = false;
        assert!(should_compact(&c, 1, 10_000, 3).should_compact);
        assert!(!should_compact(&c, 1, 10_000, 4).should_compact);
    }

    #[test]
    fn zero_limit_is_safe() {
        let d = should_compact(&cfg(), 100, 0, 3);
        assert_eq!(d.ratio, 0.0);
    }

    // ── pipeline ordering ────────────────────────────────────────────────────

    struct Tagger {
        name: &'static str,
        priority: i32,
        applies: bool,
    }

    #[async_trait]
    impl CompactionStrategy for Tagger {
        fn name(&self) -> &str {
            self.name
        }
        fn policy_type(&self) -> CompactionPolicy {
            CompactionPolicy::ToolPruning
        }
        fn priority(&self) -> i32 {
            self.priority
        }
        fn should_apply(&self, _ctx: &CompactionContext<'_>) -> bool {
            self.applies
        }
        fn estimate_savings(&self, _ctx: &CompactionContext<'_>) -> usize {
            0
        }
        async fn apply(&self, ctx: &CompactionContext<'_>) -> PolicyResult {
            // Drop the oldest message and tag the record with our name.
            let mut record = CompactionRecord::new(ctx.session_id, self.policy_type());
            record.summary_text = Some(self.name.to_string());
            let messages: Vec<Message> = ctx.messages.iter().skip(1).cloned().collect();
            PolicyResult::applied(messages, record)
        }
    }

    fn window(n: usize) -> Vec<Message> {
        (0..n)
            .map(|i| Message::user(format!("message number {i} with some padding text")))
            .collect()
    }

    #[tokio::test]
    async fn cheaper_policy_runs_before_the_expensive_one() {
        let pipeline = CompactionPipeline::new(vec![
            Box::new(Tagger {
                name: "summary",
                priority: 100,
                applies: true,
            }),
            Box::new(Tagger {
                name: "pruning",
                priority: 50,
                applies: true,
            }),
        ]);
        // limit 0 forces both strategies to run
        let result = pipeline.run("s", window(5), 0, "m", &cfg()).await;
        assert_eq!(result.records.len(), 2);
        assert_eq!(result.records[0].summary_text.as_deref(), Some("pruning"));
        assert_eq!(result.records[1].summary_text.as_deref(), Some("summary"));
    }

    #[tokio::test]
    async fn stops_once_window_fits() {
        let pipeline = CompactionPipeline::new(vec![
            Box::new(Tagger {
                name: "high",
                priority: 100,
                applies: true,
            }),
            Box::new(Tagger {
                name: "low",
                priority: 50,
                applies: true,
            }),
        ]);
        // generous limit: the first application already fits
        let result = pipeline.run("s", window(5), 1_000_000, "m", &cfg()).await;
        assert!(result.reached_limit);
        assert!(result.records.is_empty(), "no strategy should run at all");
    }

    #[tokio::test]
    async fn failing_strategy_does_not_abort_the_pipeline() {
        struct Failing;
        #[async_trait]
        impl CompactionStrategy for Failing {
            fn name(&self) -> &str {
                "failing"
            }
            fn policy_type(&self) -> CompactionPolicy {
                CompactionPolicy::Summary
            }
            fn priority(&self) -> i32 {
                100
            }
            fn should_apply(&self, _: &CompactionContext<'_>) -> bool {
                true
            }
            fn estimate_savings(&self, _: &CompactionContext<'_>) -> usize {
                0
            }
            async fn apply(&self, _: &CompactionContext<'_>) -> PolicyResult {
                PolicyResult::failed("model unavailable")
            }
        }
        let pipeline = CompactionPipeline::new(vec![
            Box::new(Failing),
            Box::new(Tagger {
                name: "low",
                priority: 50,
                applies: true,
            }),
        ]);
        let result = pipeline.run("s", window(5), 0, "m", &cfg()).await;
        assert_eq!(result.records.len(), 1);
        assert_eq!(result.records[0].summary_text.as_deref(), Some("low"));
    }

    #[tokio::test]
    async fn no_applicable_strategy_returns_original_window() {
        let pipeline = CompactionPipeline::new(vec![Box::new(Tagger {
            name: "never",
            priority: 100,
            applies: false,
        })]);
        let original = window(4);
        let result = pipeline.run("s", original.clone(), 0, "m", &cfg()).await;
        assert!(!result.reached_limit);
        assert_eq!(result.messages.len(), original.len());
        assert!(result.records.is_empty());
    }
}
