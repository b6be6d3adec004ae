//! `pdm session` – line-oriented access to every controller operation.
//!
//! Each stdin line is parsed like a command line (`start <url> -p <id>`,
//! `status <id>`, `list`, ...) and answered with one JSON line on stdout.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pdm_core::config::PdmConfig;
use pdm_core::{DownloadController, TaskEvent};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;

use super::GetArgs;

#[derive(Debug, Parser)]
#[command(name = "session", no_binary_name = true)]
pub struct SessionLine {
    #[command(subcommand)]
    pub command: SessionCommand,
}

#[derive(Debug, Subcommand)]
pub enum SessionCommand {
    /// Start a download; prints its task id.
    Start(GetArgs),
    /// Print one task.
    Status { task_id: String },
    Pause { task_id: String },
    Resume { task_id: String },
    Cancel { task_id: String },
    /// Print all tasks, oldest first.
    List {
        #[arg(long, short)]
        project: Option<String>,
    },
    /// Forget finished tasks.
    Cleanup,
    /// Pause everything and exit.
    Quit,
}

/// Runs one command against `controller`. `Quit` is handled by the caller.
pub fn execute(controller: &DownloadController, command: SessionCommand) -> Value {
    match command {
        SessionCommand::Start(args) => match controller.start(args.into_request()) {
            Ok(task_id) => json!({ "task_id": task_id }),
            Err(e) => json!({ "error": e.to_string() }),
        },
        SessionCommand::Status { task_id } => match controller.get_progress(&task_id) {
            Some(task) => json!(task),
            None => json!({ "error": format!("unknown task {task_id}") }),
        },
        SessionCommand::Pause { task_id } => json!({ "ok": controller.pause(&task_id) }),
        SessionCommand::Resume { task_id } => json!({ "ok": controller.resume(&task_id) }),
        SessionCommand::Cancel { task_id } => json!({ "ok": controller.cancel(&task_id) }),
        SessionCommand::List { project } => json!(controller.list(project.as_deref())),
        SessionCommand::Cleanup => json!({ "removed": controller.cleanup() }),
        SessionCommand::Quit => json!({ "ok": true }),
    }
}

fn event_json(event: &TaskEvent) -> Value {
    match event {
        TaskEvent::StatusChanged(t) => json!({ "event": "status", "task": t }),
        TaskEvent::Progress(t) => json!({ "event": "progress", "task": t }),
        TaskEvent::Removed { task_id } => json!({ "event": "removed", "task_id": task_id }),
    }
}

pub async fn run_session(cfg: PdmConfig, watch: bool) -> Result<()> {
    let controller = DownloadController::new(cfg);

    let watcher = watch.then(|| {
        let mut events = controller.subscribe();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => println!("{}", event_json(&event)),
                    Err(RecvError::Lagged(n)) => {
                        tracing::debug!(skipped = n, "session events lagged")
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("reading stdin")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let command = match SessionLine::try_parse_from(line.split_whitespace()) {
            Ok(parsed) => parsed.command,
            Err(e) => {
                println!("{}", json!({ "error": e.to_string().trim() }));
                continue;
            }
        };
        if matches!(command, SessionCommand::Quit) {
            break;
        }
        println!("{}", execute(&controller, command));
    }

    if let Some(handle) = watcher {
        handle.abort();
    }
    let stopper = controller.clone();
    tokio::task::spawn_blocking(move || stopper.shutdown())
        .await
        .context("shutdown task panicked")?;
    Ok(())
}
