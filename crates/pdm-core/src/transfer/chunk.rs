//! Chunk worker: one inclusive byte range into its own file.

use curl::easy::Easy2;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::Path;
use std::time::Duration;

use super::sink::BodySink;
use super::USER_AGENT;
use crate::chunking::ChunkRange;
use crate::control::{ControlSignal, ControlToken};
use crate::retry::{run_with_retry, RetryPolicy, TransferError};

#[derive(Debug)]
pub enum ChunkOutcome {
    Done,
    Interrupted(ControlSignal),
    Failed(TransferError),
}

/// Everything needed to fetch one chunk.
#[derive(Debug, Clone, Copy)]
pub struct ChunkRequest<'a> {
    pub url: &'a str,
    pub chunk: ChunkRange,
    pub path: &'a Path,
    /// Abort when no byte arrives for this long; also the connect timeout.
    pub stall_timeout: Duration,
}

/// Fetches `req.chunk` into `req.path`, retrying transient failures.
///
/// Bytes already in the file (from an interrupted attempt or a paused run)
/// are kept and the request continues after them; a complete file is not
/// fetched again.
pub fn fetch_chunk(req: &ChunkRequest<'_>, token: &ControlToken, policy: &RetryPolicy) -> ChunkOutcome {
    let result = run_with_retry(policy, token, |attempt| {
        if attempt > 1 {
            tracing::debug!(chunk = req.chunk.index, attempt, "retrying chunk");
        }
        fetch_once(req, token)
    });
    match result {
        Ok(()) => ChunkOutcome::Done,
        Err(TransferError::Interrupted(signal)) => ChunkOutcome::Interrupted(signal),
        Err(e) => ChunkOutcome::Failed(e),
    }
}

fn fetch_once(req: &ChunkRequest<'_>, token: &ControlToken) -> Result<(), TransferError> {
    if let Some(signal) = token.signal() {
        return Err(TransferError::Interrupted(signal));
    }
    let len = req.chunk.len();
    let (file, have) = open_chunk_file(req.path, len).map_err(TransferError::Storage)?;
    if have == len {
        return Ok(());
    }
    let wanted = len - have;

    let sink = BodySink::new(file, token.clone(), have)
        .with_limit(wanted)
        .expecting_partial(req.chunk.start + have > 0);
    let mut easy = Easy2::new(sink);
    easy.url(req.url)?;
    easy.follow_location(true)?;
    easy.useragent(USER_AGENT)?;
    easy.connect_timeout(req.stall_timeout)?;
    easy.low_speed_limit(1)?;
    easy.low_speed_time(req.stall_timeout)?;
    easy.progress(true)?;
    easy.range(&req.chunk.range_from(have))?;

    if let Err(e) = easy.perform() {
        return Err(match easy.get_mut().take_error(e) {
            TransferError::ResumeRejected => {
                TransferError::Protocol("server ignored the range request".to_string())
            }
            other => other,
        });
    }

    let code = easy.response_code()?;
    if code != 200 && code != 206 {
        return Err(TransferError::Http(code));
    }
    let received = easy.get_ref().written();
    if received != wanted {
        return Err(TransferError::PartialTransfer {
            expected: wanted,
            received,
        });
    }
    Ok(())
}

/// Opens the chunk file for appending and returns the bytes already in it.
/// A file longer than the chunk is from a different plan and is truncated.
fn open_chunk_file(path: &Path, len: u64) -> io::Result<(File, u64)> {
    let have = match fs::metadata(path) {
        Ok(m) => m.len(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => 0,
        Err(e) => return Err(e),
    };
    if have > len {
        return Ok((File::create(path)?, 0));
    }
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    Ok((file, have))
}
