//! Parallel supervisor: a bounded pool of chunk workers, file-size polling
//! for progress, and the merge once every chunk is on disk.

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use super::chunk::{fetch_chunk, ChunkOutcome, ChunkRequest};
use super::TransferOutcome;
use crate::chunking::{chunk_dir, chunk_path, merge_chunks, ChunkPlan, ChunkRange};
use crate::control::{ControlSignal, ControlToken};
use crate::error::EngineError;
use crate::retry::{RetryPolicy, TransferError};

/// A planned parallel download.
#[derive(Debug, Clone, Copy)]
pub struct ParallelJob<'a> {
    pub url: &'a str,
    pub task_id: &'a str,
    pub dest: &'a Path,
    pub plan: &'a ChunkPlan,
    pub total: u64,
    pub policy: RetryPolicy,
    pub stall_timeout: Duration,
    /// Progress/polling tick.
    pub poll_interval: Duration,
}

/// Runs every incomplete chunk of `job.plan` on a pool of `plan.workers`
/// threads and merges the result into `job.dest`.
///
/// `progress` is called each tick with the summed chunk-file sizes. A failed
/// chunk stops the remaining workers; a signal on `token` stops them too and
/// wins over chunk failures. Chunk files survive pause and failure so a later
/// run continues where this one stopped.
pub fn run_parallel(
    job: &ParallelJob<'_>,
    token: &ControlToken,
    progress: &dyn Fn(u64, u64),
) -> TransferOutcome {
    let dir = chunk_dir(job.dest, job.task_id);
    if let Err(e) = fs::create_dir_all(&dir) {
        return TransferOutcome::Failed(EngineError::Io(e));
    }
    let paths: Vec<PathBuf> = job.plan.chunks.iter().map(|c| chunk_path(&dir, c.index)).collect();

    let pending: VecDeque<ChunkRange> = job
        .plan
        .chunks
        .iter()
        .zip(&paths)
        .filter(|(chunk, path)| file_len(path) != chunk.len())
        .map(|(chunk, _)| *chunk)
        .collect();
    tracing::info!(
        task_id = job.task_id,
        chunks = job.plan.chunks.len(),
        pending = pending.len(),
        workers = job.plan.workers,
        "starting parallel transfer"
    );

    let failures = run_pool(job, &dir, pending, token, progress, &paths);
    progress(on_disk(&paths), job.total);

    if let Some(signal) = token.signal() {
        return TransferOutcome::from_signal(signal);
    }
    if !failures.is_empty() {
        let summary = failures
            .iter()
            .map(|(index, e)| format!("chunk {index}: {e}"))
            .collect::<Vec<_>>()
            .join("; ");
        return TransferOutcome::Failed(EngineError::ChunkFetchFailed(summary));
    }

    match merge_chunks(&paths, job.dest, Some(job.total), token) {
        Ok(bytes) => {
            let _ = fs::remove_dir_all(&dir);
            TransferOutcome::Completed { bytes }
        }
        Err(e) => TransferOutcome::Failed(e),
    }
}

/// Runs the pool until the queue is drained or stopped. Returns failed chunks.
fn run_pool(
    job: &ParallelJob<'_>,
    dir: &Path,
    pending: VecDeque<ChunkRange>,
    token: &ControlToken,
    progress: &dyn Fn(u64, u64),
    paths: &[PathBuf],
) -> Vec<(usize, TransferError)> {
    let mut failures = Vec::new();
    if pending.is_empty() {
        return failures;
    }

    let pool_token = token.child();
    let workers = job.plan.workers.clamp(1, pending.len());
    let work = Arc::new(Mutex::new(pending));
    let (tx, rx) = mpsc::channel::<(usize, ChunkOutcome)>();

    let mut handles = Vec::with_capacity(workers);
    for n in 0..workers {
        let work = Arc::clone(&work);
        let tx = tx.clone();
        let pool_token = pool_token.clone();
        let url = job.url.to_string();
        let dir = dir.to_path_buf();
        let policy = job.policy;
        let stall_timeout = job.stall_timeout;
        let spawned = thread::Builder::new()
            .name(format!("pdm-chunk-{n}"))
            .spawn(move || loop {
                if pool_token.signal().is_some() {
                    break;
                }
                let next = work
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .pop_front();
                let Some(chunk) = next else { break };
                let path = chunk_path(&dir, chunk.index);
                let req = ChunkRequest {
                    url: &url,
                    chunk,
                    path: &path,
                    stall_timeout,
                };
                let outcome = fetch_chunk(&req, &pool_token, &policy);
                if tx.send((chunk.index, outcome)).is_err() {
                    break;
                }
            });
        match spawned {
            Ok(handle) => handles.push(handle),
            Err(e) => {
                tracing::warn!(task_id = job.task_id, "could not spawn chunk worker: {}", e);
                break;
            }
        }
    }
    drop(tx);

    if handles.is_empty() {
        failures.push((
            0,
            TransferError::Storage(std::io::Error::new(
                std::io::ErrorKind::Other,
                "no chunk worker could be started",
            )),
        ));
        return failures;
    }

    loop {
        match rx.recv_timeout(job.poll_interval) {
            Ok((index, ChunkOutcome::Done)) => {
                tracing::debug!(task_id = job.task_id, chunk = index, "chunk done");
            }
            Ok((index, ChunkOutcome::Failed(e))) => {
                tracing::warn!(task_id = job.task_id, chunk = index, "chunk failed: {}", e);
                failures.push((index, e));
                pool_token.request(ControlSignal::Cancel);
            }
            Ok((_, ChunkOutcome::Interrupted(_))) | Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
        progress(on_disk(paths), job.total);
    }

    for handle in handles {
        if handle.join().is_err() {
            failures.push((
                usize::MAX,
                TransferError::Protocol("chunk worker panicked".to_string()),
            ));
        }
    }
    failures
}

fn file_len(path: &Path) -> u64 {
    fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

fn on_disk(paths: &[PathBuf]) -> u64 {
    paths.iter().map(|p| file_len(p)).sum()
}
