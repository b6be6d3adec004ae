//! `pdm get` – download one URL and print progress until it settles.

use anyhow::{bail, Context, Result};
use clap::Args;
use pdm_core::config::PdmConfig;
use pdm_core::{DownloadController, DownloadTask, StartRequest, TaskEvent, TaskStatus};
use std::io::Write;
use tokio::sync::broadcast::error::RecvError;

#[derive(Debug, Args)]
pub struct GetArgs {
    /// HTTP, HTTPS or FTP URL to download.
    pub url: String,

    /// Project that owns the file.
    #[arg(long, short)]
    pub project: String,

    /// Directory inside the project.
    #[arg(long, default_value = "/")]
    pub dest: String,

    /// File name to save as (default: from the server or URL).
    #[arg(long)]
    pub name: Option<String>,

    /// Use a single connection even when the server supports ranges.
    #[arg(long)]
    pub sequential: bool,

    /// Reuse a task id, e.g. to continue an interrupted parallel download.
    #[arg(long, value_name = "ID")]
    pub task_id: Option<String>,
}

impl GetArgs {
    pub fn into_request(self) -> StartRequest {
        StartRequest {
            project_id: self.project,
            url: self.url,
            filename: self.name,
            destination_path: self.dest,
            concurrent: !self.sequential,
            task_id: self.task_id,
        }
    }
}

pub async fn run_get(cfg: PdmConfig, args: GetArgs) -> Result<()> {
    let controller = DownloadController::new(cfg);
    let mut events = controller.subscribe();
    let task_id = controller.start(args.into_request())?;
    println!("task {task_id}");

    let settled = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break None,
            event = events.recv() => match event {
                Ok(TaskEvent::Progress(t)) if t.task_id == task_id => print_progress(&t),
                Ok(TaskEvent::StatusChanged(t)) if t.task_id == task_id && t.status.is_terminal() => {
                    break Some(t);
                }
                Ok(_) => {}
                Err(RecvError::Lagged(n)) => {
                    tracing::debug!(skipped = n, "progress events lagged");
                    if let Some(t) = controller.get_progress(&task_id) {
                        if t.status.is_terminal() {
                            break Some(t);
                        }
                    }
                }
                Err(RecvError::Closed) => break controller.get_progress(&task_id),
            },
        }
    };

    let stopper = controller.clone();
    tokio::task::spawn_blocking(move || stopper.shutdown())
        .await
        .context("shutdown task panicked")?;
    println!();

    match settled {
        Some(t) if t.status == TaskStatus::Completed => {
            let path = t
                .file_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default();
            println!("saved {} bytes to {}", t.downloaded_size, path);
            Ok(())
        }
        Some(t) if t.status == TaskStatus::Error => {
            bail!("{}", t.error_message.unwrap_or_else(|| "download failed".into()))
        }
        _ => {
            let done = controller
                .get_progress(&task_id)
                .map(|t| t.downloaded_size)
                .unwrap_or(0);
            println!(
                "interrupted after {done} bytes; run again with --task-id {task_id} to continue"
            );
            Ok(())
        }
    }
}

fn print_progress(t: &DownloadTask) {
    let done_mib = t.downloaded_size as f64 / 1_048_576.0;
    let total_mib = t.total_size as f64 / 1_048_576.0;
    let rate_mib = t.speed_bytes_per_sec / 1_048_576.0;
    let eta = t
        .time_remaining_sec
        .map(|s| format!("{:.0}s", s))
        .unwrap_or_else(|| "?".to_string());
    print!(
        "\r  {:.1} / {:.1} MiB ({:.1}%)  {:.2} MiB/s  ETA {}  ",
        done_mib, total_mib, t.progress_percent, rate_mib, eta
    );
    let _ = std::io::stdout().flush();
}
