// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The agent loop: a step-bounded, cancellable driver for one session.
//!
//! Each step streams one model turn into a growing assistant message,
//! executes the requested tools sequentially under the doom-loop guard and
//! path-safety middleware, and persists every transition.  The compaction
//! engine may rewrite the in-memory window between steps; the on-disk
//! messages are never rewritten.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use wolo_config::{Config, ExecMode};
use wolo_error::WoloError;
use wolo_model::{
    ChatProvider, ChatRequest, FinishReason, Message, StreamEvent, TokenUsage, ToolCallAssembler,
    ToolPart,
};
use wolo_store::{SessionMeta, SessionSaver, SessionStore};
use wolo_tools::{is_safe_shell_command, ToolContext, ToolRegistry};

use crate::compact::{
    self, estimate, CompactionPipeline, SummaryStrategy, ToolPruningStrategy,
};
use crate::control::ControlManager;
use crate::prompts;
use crate::taskstate::{DoomEntry, TaskState};

/// Default step budget per run.
pub const DEFAULT_MAX_STEPS: u64 = 100;

/// Fallback context window when the endpoint declares nothing.
const FALLBACK_CONTEXT_WINDOW: usize = 128_000;

/// Events streamed to the UI while the loop runs.
#[derive(Debug, Clone)]
pub enum AgentEvent {
    TextDelta(String),
    ReasoningDelta(String),
    ToolStarted { name: String, brief: Option<String> },
    ToolFinished { name: String, ok: bool, output: String },
    Compacted { tokens_before: usize, tokens_after: usize, records: usize },
    Usage(TokenUsage),
    TurnComplete,
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopOutcome {
    /// The model finished without further tool calls.
    Completed,
    /// The step budget ran out.
    StepBudgetExhausted,
    /// The doom-loop guard tripped.
    DoomLoop,
    /// Stopped or cancelled by the user.
    Stopped,
}

impl LoopOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            LoopOutcome::Completed => 0,
            LoopOutcome::StepBudgetExhausted => 2,
            LoopOutcome::DoomLoop => 1,
            LoopOutcome::Stopped => 130,
        }
    }
}

enum TurnResult {
    Cancelled,
    Finished { had_tool_calls: bool },
}

enum ToolPhase {
    Continue,
    DoomLoop,
    Interrupted,
}

pub struct AgentLoop {
    meta: SessionMeta,
    store: Arc<SessionStore>,
    saver: SessionSaver,
    registry: Arc<ToolRegistry>,
    client: Arc<dyn ChatProvider>,
    config: Arc<Config>,
    tool_ctx: ToolContext,
    mode: ExecMode,
    max_steps: u64,
    control: ControlManager,
    state: TaskState,
    events: mpsc::Sender<AgentEvent>,
    pipeline: CompactionPipeline,
    messages: Vec<Message>,
    /// Prompt size the provider reported for the last turn; preferred over
    /// the heuristic for the compaction decision.
    last_prompt_tokens: Option<u64>,
}

impl AgentLoop {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        meta: SessionMeta,
        store: Arc<SessionStore>,
        client: Arc<dyn ChatProvider>,
        registry: Arc<ToolRegistry>,
        config: Arc<Config>,
        tool_ctx: ToolContext,
        mode: ExecMode,
        max_steps: u64,
        control: ControlManager,
        events: mpsc::Sender<AgentEvent>,
    ) -> Self {
        let pipeline = CompactionPipeline::new(vec![
            Box::new(ToolPruningStrategy),
            Box::new(SummaryStrategy::new(Arc::clone(&client))),
        ]);
        let saver = SessionSaver::new(Arc::clone(&store));
        Self {
            meta,
            store,
            saver,
            registry,
            client,
            config,
            tool_ctx,
            mode,
            max_steps,
            control,
            state: TaskState::new(),
            events,
            pipeline,
            messages: Vec::new(),
            last_prompt_tokens: None,
        }
    }

    pub fn state(&self) -> &TaskState {
        &self.state
    }

    pub fn session_id(&self) -> &str {
        &self.meta.id
    }

    /// Run the loop: append the initial user message (when given) and step
    /// until the model stops, the budget runs out, a doom loop trips, or the
    /// user interrupts.  Always flushes the session on the way out.
    pub async fn run(&mut self, initial_user: Option<String>) -> Result<LoopOutcome, WoloError> {
        let result = self.run_inner(initial_user).await;
        // Unconditional flush on both the success and the unwind path.
        if let Err(e) = self.saver.flush(&mut self.meta) {
            warn!(session = %self.meta.id, "flush on exit failed: {e}");
        }
        result
    }

    async fn run_inner(&mut self, initial_user: Option<String>) -> Result<LoopOutcome, WoloError> {
        self.messages = self.store.load_messages(&self.meta.id)?;
        self.state.set_todos(self.store.load_todos(&self.meta.id)?);

        if let Some(text) = initial_user {
            let message = Message::user(text);
            self.store.save_message(&self.meta.id, &message)?;
            self.messages.push(message);
            self.saver.save(&mut self.meta)?;
        }

        let mut step: u64 = 0;
        loop {
            step += 1;
            if step > self.max_steps {
                warn!(session = %self.meta.id, max_steps = self.max_steps, "step budget exhausted");
                return Ok(LoopOutcome::StepBudgetExhausted);
            }
            self.control.wait_if_paused().await;
            if self.control.is_cancelled() || self.control.is_stopped() {
                return Ok(LoopOutcome::Stopped);
            }

            // Preflight: the compaction engine may rewrite the window used
            // for this call.  Never on the first step of a run.
            if step > 1 {
                self.maybe_compact(step).await?;
            }

            debug!(session = %self.meta.id, step, "starting model turn");
            match self.stream_turn().await? {
                TurnResult::Cancelled => return Ok(LoopOutcome::Stopped),
                TurnResult::Finished {
                    had_tool_calls: false,
                } => {
                    let _ = self.events.send(AgentEvent::TurnComplete).await;
                    return Ok(LoopOutcome::Completed);
                }
                TurnResult::Finished {
                    had_tool_calls: true,
                } => match self.run_tool_phase().await? {
                    ToolPhase::Continue => continue,
                    ToolPhase::DoomLoop => return Ok(LoopOutcome::DoomLoop),
                    ToolPhase::Interrupted => return Ok(LoopOutcome::Stopped),
                },
            }
        }
    }

    // ── Streaming ────────────────────────────────────────────────────────────

    async fn stream_turn(&mut self) -> Result<TurnResult, WoloError> {
        let request = ChatRequest {
            messages: self.messages.clone(),
            tools: self.registry.schemas_for_mode(self.mode),
            system_prompt: prompts::system_prompt(
                &self.meta.agent_type,
                &self.tool_ctx.workdir.display().to_string(),
            ),
            enable_think: self.config.enable_think,
        };
        let mut stream = self.client.complete(request).await?;

        let mut assistant = Message::assistant_streaming();
        let mut assembler = ToolCallAssembler::new();
        let mut finish = FinishReason::None;

        while let Some(event) = stream.next().await {
            if self.control.is_cancelled() {
                // Close the upstream connection and keep what we have.
                drop(stream);
                assistant.finish(FinishReason::Error);
                if assistant.is_sendable() {
                    self.store.save_message(&self.meta.id, &assistant)?;
                    self.messages.push(assistant);
                }
                return Ok(TurnResult::Cancelled);
            }
            let event = match event {
                Ok(e) => e,
                Err(e) => {
                    self.commit_partial(assistant)?;
                    return Err(e);
                }
            };
            match event {
                StreamEvent::TextDelta(delta) => {
                    assistant.push_text_delta(&delta);
                    let _ = self.events.send(AgentEvent::TextDelta(delta)).await;
                    self.saver.save(&mut self.meta)?;
                }
                StreamEvent::ReasoningDelta(delta) => {
                    assistant.push_reasoning_delta(&delta);
                    let _ = self.events.send(AgentEvent::ReasoningDelta(delta)).await;
                    self.saver.save(&mut self.meta)?;
                }
                StreamEvent::ToolCallDelta {
                    index,
                    id,
                    name,
                    arguments,
                } => {
                    assembler.push(index, &id, &name, &arguments);
                    self.saver.save(&mut self.meta)?;
                }
                StreamEvent::Usage(usage) => {
                    self.state.add_usage(usage);
                    self.last_prompt_tokens = Some(usage.prompt_tokens);
                    let _ = self.events.send(AgentEvent::Usage(usage)).await;
                }
                StreamEvent::Finish(reason) => finish = reason,
                StreamEvent::Done => break,
            }
        }

        let calls = match assembler.finish() {
            Ok(c) => c,
            Err(e) => {
                self.commit_partial(assistant)?;
                return Err(e);
            }
        };
        for call in calls {
            assistant.add_tool_part(ToolPart::new(call.id, call.name, call.input));
        }

        let had_tool_calls = assistant.has_tool_calls();
        assistant.finish(if had_tool_calls {
            FinishReason::ToolCalls
        } else if finish == FinishReason::None {
            FinishReason::Stop
        } else {
            finish
        });

        if assistant.is_sendable() {
            self.store.save_message(&self.meta.id, &assistant)?;
            self.messages.push(assistant);
            self.saver.save(&mut self.meta)?;
        }
        Ok(TurnResult::Finished { had_tool_calls })
    }

    /// Persist a partially streamed assistant message before unwinding.
    fn commit_partial(&mut self, mut assistant: Message) -> Result<(), WoloError> {
        if assistant.is_sendable() {
            assistant.finish(FinishReason::Error);
            self.store.save_message(&self.meta.id, &assistant)?;
            self.messages.push(assistant);
        }
        Ok(())
    }

    // ── Tool phase ───────────────────────────────────────────────────────────

    async fn run_tool_phase(&mut self) -> Result<ToolPhase, WoloError> {
        let message_index = self.messages.len() - 1;
        let part_ids: Vec<String> = self.messages[message_index]
            .tool_parts()
            .map(|p| p.id.clone())
            .collect();

        for part_id in part_ids {
            self.control.wait_if_paused().await;
            if self.control.is_cancelled() || self.control.is_stopped() {
                self.save_current(message_index)?;
                return Ok(ToolPhase::Interrupted);
            }

            let (name, input_json, shell_command, brief_input) = {
                let part = self.part(message_index, &part_id);
                (
                    part.name.clone(),
                    part.input_json(),
                    part.input
                        .get("command")
                        .and_then(serde_json::Value::as_str)
                        .map(str::to_string),
                    part.input.clone(),
                )
            };

            let Some(tool) = self.registry.get(&name) else {
                self.part_mut(message_index, &part_id)
                    .fail(format!("unknown tool '{name}'"));
                self.save_current(message_index)?;
                continue;
            };

            // Doom-loop guard: read-only tools and allowlisted shell
            // commands are exempt.
            let exempt = tool.read_only()
                || (name == "shell"
                    && shell_command
                        .as_deref()
                        .map(is_safe_shell_command)
                        .unwrap_or(false));
            if !exempt {
                let entry = DoomEntry::new(&name, &input_json, &self.meta.id);
                if self.state.record_tool_call(entry) {
                    warn!(session = %self.meta.id, tool = %name, "doom loop detected");
                    self.part_mut(message_index, &part_id).fail(format!(
                        "Doom loop detected: '{name}' was called repeatedly with identical \
                         input. Stopping this run — change the approach before retrying."
                    ));
                    self.save_current(message_index)?;
                    self.saver.flush(&mut self.meta)?;
                    return Ok(ToolPhase::DoomLoop);
                }
            }

            self.part_mut(message_index, &part_id).begin();
            self.save_current(message_index)?;
            let _ = self
                .events
                .send(AgentEvent::ToolStarted {
                    name: name.clone(),
                    brief: tool.brief(&brief_input),
                })
                .await;

            // Execute against a detached copy of the part, then write the
            // result back.  Expected failures land in the part; only
            // structural errors unwind (a user cancellation during a path
            // confirmation propagates and ends the session).
            let mut scratch = self.part(message_index, &part_id).clone();
            let exec_result = tool.execute(&mut scratch, &self.tool_ctx).await;
            *self.part_mut(message_index, &part_id) = scratch;

            if let Err(e) = exec_result {
                match &e {
                    WoloError::Tool(_) => {
                        let part = self.part_mut(message_index, &part_id);
                        if !part.is_finished() {
                            part.fail(e.to_string());
                        }
                    }
                    _ => {
                        self.save_current(message_index)?;
                        self.saver.flush(&mut self.meta)?;
                        return Err(e);
                    }
                }
            }

            self.save_current(message_index)?;
            self.saver.save(&mut self.meta)?;
            {
                let part = self.part(message_index, &part_id);
                let _ = self
                    .events
                    .send(AgentEvent::ToolFinished {
                        name: name.clone(),
                        ok: part.status == wolo_model::ToolStatus::Completed,
                        output: part.output.clone(),
                    })
                    .await;
            }

            // Keep the task-local todo cache in sync after todo mutations.
            if name == "todowrite" {
                self.state.set_todos(self.store.load_todos(&self.meta.id)?);
            }
        }
        Ok(ToolPhase::Continue)
    }

    fn part(&self, message_index: usize, part_id: &str) -> &ToolPart {
        self.messages[message_index]
            .tool_parts()
            .find(|p| p.id == part_id)
            .expect("tool part ids are stable within a message")
    }

    fn part_mut(&mut self, message_index: usize, part_id: &str) -> &mut ToolPart {
        self.messages[message_index]
            .tool_parts_mut()
            .find(|p| p.id == part_id)
            .expect("tool part ids are stable within a message")
    }

    fn save_current(&self, message_index: usize) -> Result<(), WoloError> {
        self.store
            .save_message(&self.meta.id, &self.messages[message_index])
    }

    // ── Compaction ───────────────────────────────────────────────────────────

    async fn maybe_compact(&mut self, step: u64) -> Result<(), WoloError> {
        let window = self
            .client
            .context_window()
            .or_else(|| self.client.max_tokens())
            .map(|w| w as usize)
            .unwrap_or(FALLBACK_CONTEXT_WINDOW);
        let limit = window.saturating_sub(self.config.compaction.reserved_tokens);
        let tokens = estimate::estimate_window(&self.messages, self.last_prompt_tokens);

        let decision = compact::should_compact(&self.config.compaction, tokens, limit, step);
        if !decision.should_compact {
            return Ok(());
        }
        info!(
            session = %self.meta.id,
            tokens, limit, step,
            reason = %decision.reason,
            "compacting message window"
        );

        let result = self
            .pipeline
            .run(
                &self.meta.id,
                self.messages.clone(),
                limit,
                self.client.model_name(),
                &self.config.compaction,
            )
            .await;

        for record in &result.records {
            self.store.append_compaction_record(record)?;
            // A summary record introduces a synthetic message that must
            // exist on disk for the record's reference to resolve.
            if let Some(summary_id) = &record.summary_message_id {
                if let Some(summary) = result.messages.iter().find(|m| &m.id == summary_id) {
                    self.store.save_message(&self.meta.id, summary)?;
                }
            }
        }

        if !result.records.is_empty() {
            let _ = self
                .events
                .send(AgentEvent::Compacted {
                    tokens_before: result.tokens_before,
                    tokens_after: result.tokens_after,
                    records: result.records.len(),
                })
                .await;
            // The reported prompt size described the old window.
            self.last_prompt_tokens = None;
            self.messages = result.messages;
        }
        Ok(())
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
