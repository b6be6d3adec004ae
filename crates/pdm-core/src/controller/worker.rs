//! Body of a task's worker thread: probe, destination, mode, transfer.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;

use super::handle::{TaskHandle, TransferMode};
use crate::chunking::{available_cpus, chunk_dir, part_path, plan_chunks};
use crate::config::PdmConfig;
use crate::control::{ControlSignal, ControlToken};
use crate::error::EngineError;
use crate::probe::{self, ProbeInfo};
use crate::project::ProjectPathResolver;
use crate::task::TaskStatus;
use crate::transfer::{
    run_parallel, stream_download, ParallelJob, ProgressFn, StreamRequest, TransferOutcome,
};
use crate::url_model::{derive_filename, parse_download_url, Transport};

/// What every worker needs from the controller.
#[derive(Clone)]
pub(crate) struct WorkerContext {
    pub(crate) config: Arc<PdmConfig>,
    pub(crate) resolver: Arc<dyn ProjectPathResolver>,
}

/// `<destination_path>/<name>` as a project-relative path.
pub(crate) fn join_rel(destination_path: &str, name: &str) -> String {
    format!("{}/{}", destination_path.trim_end_matches('/'), name)
}

/// Removes the destination, its `.part` file and the task's chunk directory.
pub(crate) fn remove_partial_files(path: &Path, task_id: &str) {
    for file in [path.to_path_buf(), part_path(path)] {
        if let Err(e) = fs::remove_file(&file) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(task_id, path = %file.display(), "could not remove: {}", e);
            }
        }
    }
    let _ = fs::remove_dir_all(chunk_dir(path, task_id));
}

/// Runs one transfer attempt of a task to a settled state.
///
/// `predecessor` is the task's previous worker; it is joined first so that
/// at most one worker touches the task's files at a time.
pub(crate) fn run_task(
    ctx: WorkerContext,
    handle: TaskHandle,
    token: ControlToken,
    predecessor: Option<JoinHandle<()>>,
) {
    if let Some(previous) = predecessor {
        let _ = previous.join();
    }
    let task_id = handle.snapshot().task_id;
    match drive(&ctx, &handle, &token) {
        Ok(outcome) => finish(&handle, &token, outcome),
        Err(e) => finish(&handle, &token, TransferOutcome::Failed(e)),
    }
    tracing::debug!(task_id = %task_id, status = %handle.status(), "worker exiting");
}

fn drive(
    ctx: &WorkerContext,
    handle: &TaskHandle,
    token: &ControlToken,
) -> Result<TransferOutcome, EngineError> {
    let task = handle.snapshot();
    let (url, transport) = parse_download_url(&task.url)?;

    let info = match handle.with_state(|st| st.probe.clone()) {
        Some(info) => info,
        None => {
            let info = probe::probe(url.as_str(), ctx.config.probe_timeout());
            handle.set_probe(info.clone());
            info
        }
    };
    if let Some(signal) = token.signal() {
        return Ok(TransferOutcome::from_signal(signal));
    }

    let path = match task.file_path.clone() {
        Some(path) => path,
        None => resolve_destination(ctx, handle, &info)?,
    };

    let mode = match handle.with_state(|st| st.mode.clone()) {
        Some(mode) => mode,
        None => {
            let on_disk = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
            let mode = choose_mode(ctx, &info, transport, task.concurrent, on_disk);
            if on_disk > 0 {
                tracing::info!(task_id = %task.task_id, bytes = on_disk, "resuming from existing file");
                handle.seed_downloaded(on_disk);
            }
            handle.with_state(|st| st.mode = Some(mode.clone()));
            mode
        }
    };

    let task = handle.snapshot();
    if task.total_size > 0 && task.downloaded_size >= task.total_size && mode == TransferMode::Single {
        tracing::info!(task_id = %task.task_id, "destination already complete");
        return Ok(TransferOutcome::Completed {
            bytes: task.downloaded_size,
        });
    }

    if let Some(signal) = token.signal() {
        return Ok(TransferOutcome::from_signal(signal));
    }
    if !handle.transition(TaskStatus::Downloading) {
        return Ok(TransferOutcome::Cancelled);
    }
    handle.restart_sampling();

    let config = &ctx.config;
    let policy = config.retry_policy();
    let outcome = match &mode {
        TransferMode::Parallel(plan) => {
            let job = ParallelJob {
                url: url.as_str(),
                task_id: &task.task_id,
                dest: &path,
                plan,
                total: task.total_size,
                policy,
                stall_timeout: config.chunk_timeout(),
                poll_interval: config.poll_interval(),
            };
            run_parallel(&job, token, &|downloaded, total| {
                handle.record_progress(downloaded, total)
            })
        }
        TransferMode::Single => {
            let connect_timeout = match transport {
                Transport::Ftp => config.ftp_connect_timeout(),
                Transport::Http => config.probe_timeout(),
            };
            let req = StreamRequest {
                url: &url,
                transport,
                path: &path,
                offset: task.downloaded_size,
                total: task.total_size,
                buffer_size: config.stream_buffer_bytes,
                stall_timeout: config.chunk_timeout(),
                connect_timeout,
            };
            let reporter = handle.clone();
            let progress: ProgressFn =
                Arc::new(move |downloaded, total| reporter.record_progress(downloaded, total));
            stream_download(&req, token, &policy, progress)
        }
    };
    Ok(outcome)
}

fn resolve_destination(
    ctx: &WorkerContext,
    handle: &TaskHandle,
    info: &ProbeInfo,
) -> Result<PathBuf, EngineError> {
    let task = handle.snapshot();
    let name = match task.filename {
        Some(name) => name,
        None => derive_filename(&task.url, info.filename.as_deref()),
    };
    let path = ctx
        .resolver
        .resolve(&task.project_id, &join_rel(&task.destination_path, &name))?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    tracing::debug!(task_id = %task.task_id, path = %path.display(), "destination resolved");
    handle.set_destination(name, path.clone());
    Ok(path)
}

fn choose_mode(
    ctx: &WorkerContext,
    info: &ProbeInfo,
    transport: Transport,
    concurrent: bool,
    on_disk: u64,
) -> TransferMode {
    if on_disk > 0 || !concurrent || !info.allows_parallel(transport) {
        return TransferMode::Single;
    }
    let plan = plan_chunks(
        info.content_length,
        ctx.config.default_concurrency,
        ctx.config.min_chunk_bytes,
        available_cpus(),
    );
    if plan.chunks.is_empty() {
        TransferMode::Single
    } else {
        TransferMode::Parallel(plan)
    }
}

fn finish(handle: &TaskHandle, token: &ControlToken, outcome: TransferOutcome) {
    let task = handle.snapshot();
    // A stop request wins over whatever error the interrupted transfer saw,
    // and a cancel wins over a transfer that finished after it was requested.
    let outcome = match (outcome, token.signal()) {
        (TransferOutcome::Failed(_), Some(signal)) => TransferOutcome::from_signal(signal),
        (TransferOutcome::Completed { .. }, Some(ControlSignal::Cancel)) => {
            TransferOutcome::Cancelled
        }
        (outcome, _) => outcome,
    };
    match outcome {
        TransferOutcome::Completed { bytes } => {
            if handle.complete(bytes) {
                tracing::info!(task_id = %task.task_id, bytes, "download completed");
            }
        }
        TransferOutcome::Paused => {
            if handle.settle(TaskStatus::Paused) {
                tracing::info!(
                    task_id = %task.task_id,
                    bytes = task.downloaded_size,
                    "download paused"
                );
            }
        }
        TransferOutcome::Cancelled => {
            handle.settle(TaskStatus::Cancelled);
            if let Some(path) = &task.file_path {
                remove_partial_files(path, &task.task_id);
            }
            tracing::info!(task_id = %task.task_id, "download cancelled");
        }
        TransferOutcome::Failed(e) => {
            tracing::error!(task_id = %task.task_id, "download failed: {}", e);
            handle.fail(e.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::ProjectRoot;

    fn ctx(root: &Path) -> WorkerContext {
        WorkerContext {
            config: Arc::new(PdmConfig::default()),
            resolver: Arc::new(ProjectRoot::new(root)),
        }
    }

    #[test]
    fn join_rel_handles_slashes() {
        assert_eq!(join_rel("/", "a.bin"), "/a.bin");
        assert_eq!(join_rel("/raw/", "a.bin"), "/raw/a.bin");
        assert_eq!(join_rel("raw", "a.bin"), "raw/a.bin");
        assert_eq!(join_rel("", "a.bin"), "/a.bin");
    }

    #[test]
    fn mode_follows_probe_and_request() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = ctx(tmp.path());
        let ranged = ProbeInfo {
            supports_resume: true,
            content_length: 10 * 1024 * 1024,
            ..ProbeInfo::default()
        };
        assert!(matches!(
            choose_mode(&ctx, &ranged, Transport::Http, true, 0),
            TransferMode::Parallel(_)
        ));
        assert_eq!(
            choose_mode(&ctx, &ranged, Transport::Http, false, 0),
            TransferMode::Single
        );
        assert_eq!(
            choose_mode(&ctx, &ranged, Transport::Ftp, true, 0),
            TransferMode::Single
        );
        assert_eq!(
            choose_mode(&ctx, &ranged, Transport::Http, true, 4096),
            TransferMode::Single
        );
        assert_eq!(
            choose_mode(&ctx, &ProbeInfo::degraded(), Transport::Http, true, 0),
            TransferMode::Single
        );
    }

    fn downloading_handle(dest: &Path) -> TaskHandle {
        let (tx, _) = tokio::sync::broadcast::channel(16);
        let task = crate::task::DownloadTask::new(
            "t1".into(),
            "https://example.com/a.bin".into(),
            "p1".into(),
            "/".into(),
            None,
            true,
        );
        let handle = TaskHandle::new(task, std::time::Duration::ZERO, tx);
        handle.set_destination("a.bin".into(), dest.to_path_buf());
        handle.transition(TaskStatus::Downloading);
        handle
    }

    #[test]
    fn cancel_during_merge_removes_the_merged_file() {
        let tmp = tempfile::tempdir().unwrap();
        let dest = tmp.path().join("a.bin");
        let handle = downloading_handle(&dest);
        let token = ControlToken::new();

        // Controller side of cancel, before the merge renames into place.
        token.request(ControlSignal::Cancel);
        handle.transition(TaskStatus::Cancelled);
        remove_partial_files(&dest, "t1");

        fs::write(&dest, b"hello world!").unwrap();
        finish(&handle, &token, TransferOutcome::Completed { bytes: 12 });

        assert_eq!(handle.status(), TaskStatus::Cancelled);
        assert!(!dest.exists());
    }

    #[test]
    fn pause_after_completion_keeps_the_file() {
        let tmp = tempfile::tempdir().unwrap();
        let dest = tmp.path().join("a.bin");
        let handle = downloading_handle(&dest);
        let token = ControlToken::new();
        token.request(ControlSignal::Pause);

        fs::write(&dest, b"hello world!").unwrap();
        finish(&handle, &token, TransferOutcome::Completed { bytes: 12 });

        assert_eq!(handle.status(), TaskStatus::Completed);
        assert!(dest.exists());
    }

    #[test]
    fn partial_files_are_removed() {
        let tmp = tempfile::tempdir().unwrap();
        let dest = tmp.path().join("a.bin");
        fs::write(&dest, b"abc").unwrap();
        fs::write(part_path(&dest), b"abc").unwrap();
        let dir = chunk_dir(&dest, "t1");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("chunk_0"), b"a").unwrap();

        remove_partial_files(&dest, "t1");
        assert!(!dest.exists());
        assert!(!part_path(&dest).exists());
        assert!(!dir.exists());
    }
}
