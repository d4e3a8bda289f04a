// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
mod client;
mod message;
pub mod mock;
mod provider;
mod record;
pub mod wire;

pub use client::ChatClient;
pub use message::{
    FinishReason, Message, Part, Role, TextPart, Todo, TodoStatus, TokenUsage, ToolPart,
    ToolStatus,
};
pub use provider::{
    AssembledToolCall, ChatProvider, ChatRequest, EventStream, StreamEvent, ToolCallAssembler,
    ToolSchema,
};
pub use record::{CompactionPolicy, CompactionRecord, CompactionRecordSummary};
