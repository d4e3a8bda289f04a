// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! End-to-end scenarios driving the agent loop against scripted model
//! responses, with the real session store, tool registry, and path guard.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde_json::json;
use tokio::sync::mpsc;

use wolo_config::{Config, ExecMode};
use wolo_core::{AgentEvent, AgentLoop, ControlManager, LoopOutcome, DEFAULT_MAX_STEPS};
use wolo_model::mock::ScriptedClient;
use wolo_model::{ChatProvider, Message, Role, StreamEvent, ToolStatus};
use wolo_store::{PathConfirmations, SessionMeta, SessionStore};
use wolo_tools::{
    AutoAllow, AutoDeny, ConfirmationStrategy, FileTimeTracker, PathGuard, PathWhitelist,
    ToolContext, ToolRegistry,
};

struct Fixture {
    _dir: tempfile::TempDir,
    store: Arc<SessionStore>,
    meta: SessionMeta,
    workdir: PathBuf,
    config: Arc<Config>,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let workdir = dir.path().join("work");
    std::fs::create_dir_all(&workdir).unwrap();
    let store = Arc::new(SessionStore::open(dir.path().join("data")).unwrap());
    let meta = store.create_session(None, "default", "integration").unwrap();
    Fixture {
        _dir: dir,
        store,
        meta,
        workdir,
        config: Arc::new(Config::default()),
    }
}

fn build_agent(
    fx: &Fixture,
    client: Arc<dyn ChatProvider>,
    mode: ExecMode,
    strategy: Box<dyn ConfirmationStrategy>,
) -> (AgentLoop, mpsc::Receiver<AgentEvent>) {
    let whitelist = PathWhitelist::new(&fx.workdir, &[], &[]);
    let guard = Arc::new(
        PathGuard::new(
            whitelist,
            strategy,
            Arc::clone(&fx.store),
            fx.meta.id.clone(),
            10,
            None,
        )
        .unwrap(),
    );
    let tool_ctx = ToolContext {
        session_id: fx.meta.id.clone(),
        workdir: fx.workdir.clone(),
        config: Arc::clone(&fx.config),
        store: Arc::clone(&fx.store),
        file_times: Arc::new(Mutex::new(FileTimeTracker::new())),
        guard,
    };
    let registry = Arc::new(ToolRegistry::builtin(
        &fx.config,
        fx.workdir.join("memory.md"),
    ));
    let (tx, rx) = mpsc::channel(256);
    let agent = AgentLoop::new(
        fx.meta.clone(),
        Arc::clone(&fx.store),
        client,
        registry,
        Arc::clone(&fx.config),
        tool_ctx,
        mode,
        DEFAULT_MAX_STEPS,
        ControlManager::new(),
        tx,
    );
    (agent, rx)
}

// ── S1: create a file, read it back ──────────────────────────────────────────

#[tokio::test]
async fn file_creation_and_read_back() {
    let fx = fixture();
    let client = Arc::new(ScriptedClient::new(vec![
        ScriptedClient::tool_turn(
            "c1",
            "write",
            &json!({"file_path": "hello.txt", "content": "hi"}),
        ),
        ScriptedClient::tool_turn("c2", "read", &json!({"file_path": "hello.txt"})),
        ScriptedClient::text_turn("hello.txt contains: hi"),
    ]));
    let (mut agent, _rx) = build_agent(&fx, client, ExecMode::Solo, Box::new(AutoAllow));
    let outcome = agent
        .run(Some("create ./hello.txt with content hi then read it back".into()))
        .await
        .unwrap();
    assert_eq!(outcome, LoopOutcome::Completed);

    // the file exists with the right body
    assert_eq!(
        std::fs::read_to_string(fx.workdir.join("hello.txt")).unwrap(),
        "hi"
    );
    // the read tool observed the content and the final answer references it
    let messages = fx.store.load_messages(&fx.meta.id).unwrap();
    let read_part = messages[2].tool_parts().next().unwrap();
    assert!(read_part.output.contains("    1| hi"));
    assert!(messages.last().unwrap().text().contains("hi"));
}

// ── S2: path confirmation denial ─────────────────────────────────────────────

#[tokio::test]
async fn denied_write_outside_whitelist_leaves_no_file() {
    let fx = fixture();
    let client = Arc::new(ScriptedClient::new(vec![
        ScriptedClient::tool_turn(
            "c1",
            "write",
            &json!({"file_path": "/not-allowed/x.txt", "content": "nope"}),
        ),
        ScriptedClient::text_turn("the write was denied, stopping"),
    ]));
    let (mut agent, _rx) = build_agent(&fx, client, ExecMode::Solo, Box::new(AutoDeny));
    let outcome = agent.run(Some("write outside".into())).await.unwrap();

    // the agent continues one turn and halts normally
    assert_eq!(outcome, LoopOutcome::Completed);
    assert_eq!(outcome.exit_code(), 0);
    assert!(!std::path::Path::new("/not-allowed/x.txt").exists());

    let messages = fx.store.load_messages(&fx.meta.id).unwrap();
    let part = messages[1].tool_parts().next().unwrap();
    assert_eq!(part.status, ToolStatus::Failed);
    assert_eq!(part.metadata["path_denied_by_user"], json!(true));
}

// ── S3: dual-input prompt template lands in the first user message ──────────

#[tokio::test]
async fn dual_input_template_is_the_first_user_message() {
    let fx = fixture();
    let composed =
        wolo_core::input::compose_prompt(Some("context line"), Some("task line")).unwrap();
    let client = Arc::new(ScriptedClient::new(vec![ScriptedClient::text_turn("ok")]));
    let (mut agent, _rx) = build_agent(&fx, client, ExecMode::Solo, Box::new(AutoAllow));
    agent.run(Some(composed)).await.unwrap();

    let messages = fx.store.load_messages(&fx.meta.id).unwrap();
    assert_eq!(messages[0].role, Role::User);
    assert_eq!(
        messages[0].text(),
        "## Context (from stdin)\n\ncontext line\n\n---\n\n## Task\n\ntask line"
    );
}

// ── S5 / P1: concurrent writer rejection ─────────────────────────────────────

#[tokio::test]
async fn second_process_cannot_enter_a_held_session() {
    let dir = tempfile::tempdir().unwrap();
    // process A: acquires and (per its own matcher) stays alive
    let store_a = Arc::new(
        SessionStore::open(dir.path())
            .unwrap()
            .with_process_matcher(|_| true),
    );
    let meta = store_a.create_session(None, "default", "shared").unwrap();
    let mut held = store_a.load_meta(&meta.id).unwrap();
    held.pid = Some(424242); // the "other process"
    store_a.save_meta(&held).unwrap();

    // process B: sees the owner as alive and must be rejected
    let store_b = SessionStore::open(dir.path())
        .unwrap()
        .with_process_matcher(|_| true);
    let err = store_b.acquire(&meta.id).unwrap_err();
    assert_eq!(err.exit_code(), 3);
    assert_eq!(err.kind(), Some("locked"));
    assert!(err.to_string().contains("424242"), "{err}");

    // A's state is untouched
    assert_eq!(store_a.load_meta(&meta.id).unwrap().pid, Some(424242));
}

// ── P6: task-local isolation across concurrent loops ─────────────────────────

#[tokio::test]
async fn concurrent_loops_do_not_share_counters() {
    let fx_a = fixture();
    let fx_b = fixture();

    // A runs one turn (20 tokens); B runs a tool turn + text (15 + 20).
    let client_a = Arc::new(ScriptedClient::new(vec![ScriptedClient::text_turn("a")]));
    let client_b = Arc::new(ScriptedClient::new(vec![
        ScriptedClient::tool_turn("c1", "todoread", &json!({})),
        ScriptedClient::text_turn("b"),
    ]));
    let (mut agent_a, _rx_a) = build_agent(&fx_a, client_a, ExecMode::Solo, Box::new(AutoAllow));
    let (mut agent_b, _rx_b) = build_agent(&fx_b, client_b, ExecMode::Solo, Box::new(AutoAllow));

    let (ra, rb) = tokio::join!(agent_a.run(Some("a".into())), agent_b.run(Some("b".into())));
    assert_eq!(ra.unwrap(), LoopOutcome::Completed);
    assert_eq!(rb.unwrap(), LoopOutcome::Completed);

    assert_eq!(agent_a.state().usage().total_tokens, 20);
    assert_eq!(agent_b.state().usage().total_tokens, 35);
    // B made a tool call; A's doom history must not contain it
    assert!(agent_a.state().doom_history().is_empty());
}

// ── P7: confirmed directories survive a store round trip ─────────────────────

#[tokio::test]
async fn confirmed_directories_round_trip_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let session_id;
    {
        let store = SessionStore::open(dir.path()).unwrap();
        let meta = store.create_session(None, "default", "").unwrap();
        session_id = meta.id.clone();
        store
            .save_confirmations(
                &session_id,
                &PathConfirmations {
                    dirs: vec!["/opt/proj".into(), "/srv/data".into()],
                    count: 3,
                    updated_at: Some(chrono_now()),
                },
            )
            .unwrap();
    }
    let store = SessionStore::open(dir.path()).unwrap();
    let restored = store.load_confirmations(&session_id).unwrap();
    assert_eq!(restored.dirs, vec!["/opt/proj", "/srv/data"]);
    assert_eq!(restored.count, 3);
}

fn chrono_now() -> chrono::DateTime<chrono::Utc> {
    chrono::Utc::now()
}

// ── P8: question tool visibility follows the mode ────────────────────────────

#[tokio::test]
async fn solo_requests_do_not_advertise_the_question_tool() {
    for (mode, expect_question) in [
        (ExecMode::Solo, false),
        (ExecMode::Coop, true),
        (ExecMode::Repl, true),
    ] {
        let fx = fixture();
        let client = Arc::new(ScriptedClient::new(vec![ScriptedClient::text_turn("ok")]));
        let requests = Arc::clone(&client.requests);
        let (mut agent, _rx) = build_agent(
            &fx,
            client as Arc<dyn ChatProvider>,
            mode,
            Box::new(AutoAllow),
        );
        agent.run(Some("hello".into())).await.unwrap();

        let requests = requests.lock().unwrap();
        let names: Vec<&str> = requests[0].tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(
            names.contains(&"question"),
            expect_question,
            "mode {mode}: tools advertised were {names:?}"
        );
        // the write-class tools are always present
        assert!(names.contains(&"write"));
        assert!(names.contains(&"multiedit"));
    }
}

// ── P9: assistant messages sent upstream are well-formed ─────────────────────

#[tokio::test]
async fn empty_assistant_turns_are_not_replayed_upstream() {
    let fx = fixture();
    let client = Arc::new(ScriptedClient::new(vec![
        // first turn produces nothing at all
        vec![
            StreamEvent::Finish(wolo_model::FinishReason::Stop),
            StreamEvent::Done,
        ],
    ]));
    let requests = Arc::clone(&client.requests);
    let (mut agent, _rx) =
        build_agent(&fx, client as Arc<dyn ChatProvider>, ExecMode::Solo, Box::new(AutoAllow));
    agent.run(Some("first".into())).await.unwrap();
    drop(agent);

    // run a second loop over the same session; the replayed history must
    // not contain an empty assistant message
    let client2 = Arc::new(ScriptedClient::new(vec![ScriptedClient::text_turn("ok")]));
    let requests2 = Arc::clone(&client2.requests);
    let (mut agent2, _rx2) = build_agent(
        &fx,
        client2 as Arc<dyn ChatProvider>,
        ExecMode::Solo,
        Box::new(AutoAllow),
    );
    agent2.run(Some("second".into())).await.unwrap();

    assert_eq!(requests.lock().unwrap().len(), 1);
    let replay = &requests2.lock().unwrap()[0].messages;
    for m in replay.iter().filter(|m| m.role == Role::Assistant) {
        assert!(m.is_sendable(), "unsendable assistant message replayed");
    }
}

// ── Round trips ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn message_with_tool_parts_survives_store_round_trip() {
    let fx = fixture();
    let mut m = Message::assistant_streaming();
    m.push_text_delta("let me check");
    let mut input = serde_json::Map::new();
    input.insert("pattern".into(), json!("fn main"));
    let mut part = wolo_model::ToolPart::new("c1", "grep", input);
    part.complete("src/main.rs:1: fn main()");
    part.set_meta("match_count", json!(1));
    m.add_tool_part(part);
    m.finish(wolo_model::FinishReason::ToolCalls);

    fx.store.save_message(&fx.meta.id, &m).unwrap();
    let back = fx.store.load_message(&fx.meta.id, &m.id).unwrap();
    assert_eq!(back.id, m.id);
    assert_eq!(back.parts, m.parts);
    assert_eq!(back.finish_reason, m.finish_reason);
}

// ── S6 shape at the CLI contract level: doom loop file stays at 5 writes ─────

#[tokio::test]
async fn doom_loop_stops_the_sixth_identical_write() {
    let fx = fixture();
    let args = json!({"file_path": "x.txt", "content": "a"});
    let scripts: Vec<_> = (0..6)
        .map(|i| ScriptedClient::tool_turn(&format!("c{i}"), "write", &args))
        .collect();
    let client = Arc::new(ScriptedClient::new(scripts));
    let (mut agent, _rx) = build_agent(&fx, client, ExecMode::Solo, Box::new(AutoAllow));
    let outcome = agent.run(Some("keep writing".into())).await.unwrap();
    assert_eq!(outcome, LoopOutcome::DoomLoop);

    let messages = fx.store.load_messages(&fx.meta.id).unwrap();
    let failed: Vec<_> = messages
        .iter()
        .flat_map(|m| m.tool_parts())
        .filter(|p| p.status == ToolStatus::Failed)
        .collect();
    assert_eq!(failed.len(), 1);
    assert!(failed[0].output.to_lowercase().contains("doom loop"));
    // five writes executed, the sixth did not
    let completed = messages
        .iter()
        .flat_map(|m| m.tool_parts())
        .filter(|p| p.status == ToolStatus::Completed)
        .count();
    assert_eq!(completed, 5);
}
