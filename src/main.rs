// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod cli;

use std::collections::HashSet;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use clap::{CommandFactory, Parser};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use cli::{Cli, Commands, SessionCommands};
use wolo_config::{data_dir, resolve_endpoint, EndpointOverrides, ExecMode};
use wolo_core::input::compose_prompt;
use wolo_core::{AgentEvent, AgentLoop, ControlManager, LoopOutcome};
use wolo_error::WoloError;
use wolo_model::ChatClient;
use wolo_store::{SessionMeta, SessionStore};
use wolo_tools::{
    CliConfirmation, FileTimeTracker, PathGuard, PathWhitelist, ToolContext, ToolRegistry,
};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(&cli.log_level);
    let code = match dispatch(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}", e.user_message());
            e.exit_code()
        }
    };
    std::process::exit(code);
}

/// Tracing goes to stderr so it never interleaves with the streamed
/// assistant text on stdout.
fn init_logging(level: &str) {
    let filter = EnvFilter::try_new(level)
        .or_else(|_| EnvFilter::try_new("warn"))
        .expect("static fallback filter is valid");
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(filter)
        .init();
}

async fn dispatch(mut cli: Cli) -> Result<i32, WoloError> {
    let store = Arc::new(SessionStore::open(data_dir())?);

    let repl = match cli.command.take() {
        Some(Commands::Session { command }) => match command {
            // the subcommand form of `-r ID "prompt"` — same code path
            SessionCommands::Resume { id, prompt } => {
                cli.resume = Some(id);
                cli.prompt = Some(prompt);
                false
            }
            other => return session_command(&store, &other).await,
        },
        Some(Commands::Chat) | Some(Commands::Repl) => true,
        None => false,
    };
    if cli.list {
        return session_command(&store, &SessionCommands::List).await;
    }
    if let Some(id) = cli.watch.clone() {
        return watch_session(&store, &id).await;
    }
    run_task(cli, store, repl).await
}

// ── Session subcommands ──────────────────────────────────────────────────────

async fn session_command(
    store: &Arc<SessionStore>,
    command: &SessionCommands,
) -> Result<i32, WoloError> {
    match command {
        SessionCommands::List => {
            let sessions = store.list_sessions()?;
            if sessions.is_empty() {
                println!("no sessions");
                return Ok(0);
            }
            for s in sessions {
                let activity = s
                    .last_activity
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| "-".into());
                let lock = if s.locked { " [running]" } else { "" };
                println!(
                    "{:<24} {:<10} {activity}{lock}  {}",
                    s.id, s.agent_type, s.title
                );
            }
            Ok(0)
        }
        SessionCommands::Show { id } => {
            let meta = store.load_meta(id)?;
            println!("session:  {}", meta.id);
            println!("agent:    {}", meta.agent_type);
            println!("title:    {}", meta.title);
            println!("created:  {}", meta.created_at.to_rfc3339());
            println!("updated:  {}", meta.updated_at.to_rfc3339());
            if let Some(parent) = &meta.parent_session_id {
                println!("parent:   {parent}");
            }
            println!();
            for m in store.load_messages(id)? {
                print_message(&m);
            }
            Ok(0)
        }
        SessionCommands::Resume { .. } => unreachable!("resume is routed through run_task"),
        SessionCommands::Watch { id } => watch_session(store, id).await,
        SessionCommands::Delete { id } => {
            store.delete_session(id)?;
            println!("deleted {id}");
            Ok(0)
        }
        SessionCommands::Clean { days } => {
            let removed = store.clean(*days)?;
            println!("removed {removed} session(s) older than {days} days");
            Ok(0)
        }
    }
}

fn print_message(m: &wolo_model::Message) {
    let role = match m.role {
        wolo_model::Role::User => "user",
        wolo_model::Role::Assistant => "assistant",
        wolo_model::Role::System => "system",
    };
    let text = m.text();
    if !text.is_empty() {
        println!("[{role}] {text}");
    }
    for t in m.tool_parts() {
        println!(
            "  [tool {} -> {:?}] {}",
            t.name,
            t.status,
            first_line(&t.output)
        );
    }
}

fn first_line(s: &str) -> &str {
    s.lines().next().unwrap_or("")
}

/// Poll the session's message directory and print messages as they appear.
async fn watch_session(store: &Arc<SessionStore>, id: &str) -> Result<i32, WoloError> {
    store.load_meta(id)?;
    let mut seen: HashSet<String> = HashSet::new();
    eprintln!("watching session {id} (ctrl-c to stop)");
    loop {
        for m in store.load_messages(id)? {
            if seen.insert(m.id.clone()) {
                print_message(&m);
            }
        }
        tokio::select! {
            _ = tokio::time::sleep(std::time::Duration::from_secs(1)) => {}
            _ = tokio::signal::ctrl_c() => return Ok(0),
        }
    }
}

// ── Task execution ───────────────────────────────────────────────────────────

async fn run_task(cli: Cli, store: Arc<SessionStore>, repl: bool) -> Result<i32, WoloError> {
    let workdir = match &cli.workdir {
        Some(dir) => dir
            .canonicalize()
            .map_err(|e| WoloError::config(format!("bad workdir {}: {e}", dir.display())))?,
        None => std::env::current_dir()
            .map_err(|e| WoloError::config(format!("cannot determine workdir: {e}")))?,
    };

    // Piped stdin becomes context; in repl mode stdin stays interactive.
    let piped = if !repl && !stdin_is_tty() {
        let mut buf = String::new();
        let _ = std::io::stdin().read_to_string(&mut buf);
        Some(buf)
    } else {
        None
    };
    let prompt = compose_prompt(piped.as_deref(), cli.prompt.as_deref());

    if prompt.is_none() && !repl {
        let _ = Cli::command().print_help();
        println!();
        return Ok(0);
    }
    if cli.resume.is_some() && prompt.is_none() {
        return Err(WoloError::config("resuming a session requires a prompt"));
    }

    let mut config = wolo_config::load(None)?;
    if let Ok(v) = std::env::var(wolo_config::env_keys::THINK) {
        config.enable_think = matches!(v.as_str(), "1" | "true" | "yes");
    }
    let config = Arc::new(config);
    let endpoint = resolve_endpoint(
        &config,
        &EndpointOverrides {
            endpoint: cli.endpoint.clone(),
            model: cli.model.clone(),
            api_key: cli.api_key.clone(),
        },
    )?;

    // Session selection: resume by id, reuse-or-create by name, or fresh.
    let title = prompt
        .as_deref()
        .unwrap_or("")
        .chars()
        .take(60)
        .collect::<String>();
    let meta = if let Some(id) = &cli.resume {
        store.acquire(id)?
    } else if let Some(name) = &cli.session {
        match store.load_meta(name) {
            Ok(_) => store.acquire(name)?,
            Err(e) if e.kind() == Some("not_found") => {
                store.create_named_session(name, &cli.agent, &title)?;
                store.acquire(name)?
            }
            Err(e) => return Err(e),
        }
    } else {
        let created = store.create_session(None, &cli.agent, &title)?;
        store.acquire(&created.id)?
    };
    eprintln!("session: {}", meta.id);

    let mode = if repl {
        ExecMode::Repl
    } else if cli.coop {
        ExecMode::Coop
    } else {
        ExecMode::Solo
    };

    let session_id = meta.id.clone();
    let result = run_agent(&cli, &store, &config, &endpoint, meta, mode, &workdir, prompt, repl)
        .await;
    let _ = store.release(&session_id);

    let (outcome, terminated) = result?;
    if terminated {
        return Ok(131);
    }
    Ok(outcome.exit_code())
}

#[allow(clippy::too_many_arguments)]
async fn run_agent(
    cli: &Cli,
    store: &Arc<SessionStore>,
    config: &Arc<wolo_config::Config>,
    endpoint: &wolo_config::ResolvedEndpoint,
    meta: SessionMeta,
    mode: ExecMode,
    workdir: &PathBuf,
    prompt: Option<String>,
    repl: bool,
) -> Result<(LoopOutcome, bool), WoloError> {
    let session_id = meta.id.clone();

    let config_paths: Vec<PathBuf> = config
        .path_safety
        .allowed_write_paths
        .iter()
        .map(|p| PathBuf::from(shellexpand::tilde(p).into_owned()))
        .collect();
    let whitelist = PathWhitelist::new(workdir, &cli.allow_path, &config_paths);
    let audit_log = if config.path_safety.audit_denied {
        config
            .path_safety
            .audit_log_file
            .as_ref()
            .map(PathBuf::from)
            .or_else(|| Some(data_dir().join("denied.log")))
    } else {
        None
    };
    let guard = Arc::new(PathGuard::new(
        whitelist,
        Box::new(CliConfirmation),
        Arc::clone(store),
        session_id.clone(),
        config.path_safety.max_confirmations_per_session,
        audit_log,
    )?);

    let tool_ctx = ToolContext {
        session_id: session_id.clone(),
        workdir: workdir.clone(),
        config: Arc::clone(config),
        store: Arc::clone(store),
        file_times: Arc::new(Mutex::new(FileTimeTracker::new())),
        guard,
    };
    let registry = Arc::new(ToolRegistry::builtin(config, data_dir().join("memory.md")));
    let client = Arc::new(ChatClient::new(endpoint));

    // Signals: SIGINT cancels and exits 130; SIGTERM cancels and exits 131.
    let control = ControlManager::new();
    let terminated = Arc::new(AtomicBool::new(false));
    {
        let control = control.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\ninterrupted; finishing up");
                control.cancel();
            }
        });
    }
    #[cfg(unix)]
    {
        let control = control.clone();
        let terminated = Arc::clone(&terminated);
        tokio::spawn(async move {
            let mut sig = match tokio::signal::unix::signal(
                tokio::signal::unix::SignalKind::terminate(),
            ) {
                Ok(s) => s,
                Err(_) => return,
            };
            if sig.recv().await.is_some() {
                terminated.store(true, Ordering::SeqCst);
                control.cancel();
            }
        });
    }

    let (events_tx, mut events_rx) = tokio::sync::mpsc::channel::<AgentEvent>(256);
    let printer = tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            match event {
                AgentEvent::TextDelta(d) => {
                    print!("{d}");
                    let _ = std::io::stdout().flush();
                }
                AgentEvent::TurnComplete => println!(),
                AgentEvent::ToolStarted { name, brief } => {
                    eprintln!("→ {}", brief.unwrap_or(name));
                }
                AgentEvent::ToolFinished { name, ok, output } => {
                    if !ok {
                        eprintln!("✗ {name}: {}", output.lines().next().unwrap_or(""));
                    }
                }
                AgentEvent::Compacted {
                    tokens_before,
                    tokens_after,
                    records,
                } => {
                    eprintln!(
                        "[context compacted: {tokens_before} -> {tokens_after} tokens, \
                         {records} record(s)]"
                    );
                }
                AgentEvent::ReasoningDelta(_) | AgentEvent::Usage(_) => {}
            }
        }
    });

    let mut agent = AgentLoop::new(
        meta,
        Arc::clone(store),
        client,
        registry,
        Arc::clone(config),
        tool_ctx,
        mode,
        cli.max_steps,
        control.clone(),
        events_tx,
    );

    let mut outcome = agent.run(prompt).await?;

    // Repl: keep reading user lines until they quit or the loop stops.
    if repl {
        while outcome == LoopOutcome::Completed && !control.is_cancelled() {
            let Some(line) = read_user_line().await else {
                break;
            };
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            if trimmed == "exit" || trimmed == "quit" {
                break;
            }
            outcome = agent.run(Some(trimmed.to_string())).await?;
        }
    }

    drop(agent);
    let _ = printer.await;
    Ok((outcome, terminated.load(Ordering::SeqCst)))
}

/// Read one line from interactive stdin; `None` on EOF.
async fn read_user_line() -> Option<String> {
    tokio::task::spawn_blocking(|| {
        let mut err = std::io::stderr();
        let _ = write!(err, "\n> ");
        let _ = err.flush();
        let mut line = String::new();
        match std::io::stdin().read_line(&mut line) {
            Ok(0) => None,
            Ok(_) => Some(line),
            Err(_) => None,
        }
    })
    .await
    .ok()
    .flatten()
}

fn stdin_is_tty() -> bool {
    #[cfg(unix)]
    {
        unsafe { libc::isatty(libc::STDIN_FILENO) == 1 }
    }
    #[cfg(not(unix))]
    {
        true
    }
}
