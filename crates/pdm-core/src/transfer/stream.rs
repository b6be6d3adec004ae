//! Single-stream transfer for HTTP(S) and FTP with resume by offset.
//!
//! HTTP resumes with `Range: bytes=<offset>-`; FTP with REST (curl's resume
//! offset). When the server will not continue from the offset the file is
//! truncated and the transfer restarts from zero, once.

use curl::easy::Easy2;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::Path;
use std::time::Duration;

use super::sink::BodySink;
use super::{ProgressFn, TransferOutcome, USER_AGENT};
use crate::control::ControlToken;
use crate::retry::{run_with_retry, RetryPolicy, TransferError};
use crate::url_model::{FtpLogin, Transport};

/// A single-stream download into `path`.
#[derive(Debug, Clone, Copy)]
pub struct StreamRequest<'a> {
    pub url: &'a url::Url,
    pub transport: Transport,
    pub path: &'a Path,
    /// Resume offset: bytes of `path` already downloaded.
    pub offset: u64,
    /// Expected size, 0 if unknown.
    pub total: u64,
    pub buffer_size: usize,
    /// Abort when no byte arrives for this long.
    pub stall_timeout: Duration,
    pub connect_timeout: Duration,
}

pub fn stream_download(
    req: &StreamRequest<'_>,
    token: &ControlToken,
    policy: &RetryPolicy,
    progress: ProgressFn,
) -> TransferOutcome {
    let mut offset = req.offset;
    let mut restarted = false;
    loop {
        let result = run_with_retry(policy, token, |attempt| {
            let from = if attempt == 1 { offset } else { on_disk(req.path) };
            stream_once(req, from, token, progress.clone())
        });
        match result {
            Ok(bytes) => return TransferOutcome::Completed { bytes },
            Err(TransferError::ResumeRejected) if !restarted => {
                tracing::warn!(
                    url = %req.url,
                    offset,
                    "server refused to resume, restarting from zero"
                );
                restarted = true;
                offset = 0;
                progress(0, req.total);
            }
            Err(TransferError::Interrupted(signal)) => return TransferOutcome::from_signal(signal),
            Err(e) => return TransferOutcome::Failed(e.into()),
        }
    }
}

fn stream_once(
    req: &StreamRequest<'_>,
    offset: u64,
    token: &ControlToken,
    progress: ProgressFn,
) -> Result<u64, TransferError> {
    if let Some(signal) = token.signal() {
        return Err(TransferError::Interrupted(signal));
    }
    let (file, offset) = open_at(req.path, offset).map_err(TransferError::Storage)?;
    tracing::debug!(url = %req.url, offset, "single-stream request");

    let sink = BodySink::new(file, token.clone(), offset)
        .expecting_partial(req.transport == Transport::Http && offset > 0)
        .reporting(progress, req.total);
    let mut easy = Easy2::new(sink);
    easy.url(req.url.as_str())?;
    easy.useragent(USER_AGENT)?;
    easy.buffer_size(req.buffer_size.max(1024))?;
    easy.connect_timeout(req.connect_timeout)?;
    easy.low_speed_limit(1)?;
    easy.low_speed_time(req.stall_timeout)?;
    easy.progress(true)?;
    match req.transport {
        Transport::Http => {
            easy.follow_location(true)?;
            if offset > 0 {
                easy.range(&format!("{offset}-"))?;
            }
        }
        Transport::Ftp => {
            let login = FtpLogin::from_url(req.url);
            easy.username(&login.username)?;
            easy.password(&login.password)?;
            if offset > 0 {
                easy.resume_from(offset)?;
            }
        }
    }

    if let Err(e) = easy.perform() {
        let err = if refuses_resume(&e) {
            TransferError::ResumeRejected
        } else {
            easy.get_mut().take_error(e)
        };
        return Err(at_offset(err, offset));
    }

    let written = easy.get_ref().written();
    if req.transport == Transport::Http {
        let code = easy.response_code()?;
        match code {
            206 => {}
            200 if offset > 0 => return Err(TransferError::ResumeRejected),
            200 => {}
            416 if offset > 0 => return Err(TransferError::ResumeRejected),
            other => return Err(TransferError::Http(other)),
        }
        if let Some(expected) = easy.get_ref().content_length() {
            if written < expected {
                return Err(TransferError::PartialTransfer {
                    expected,
                    received: written,
                });
            }
        }
    }

    let done = offset + written;
    if req.total > 0 && done < req.total {
        return Err(TransferError::PartialTransfer {
            expected: req.total - offset,
            received: written,
        });
    }
    Ok(done)
}

/// curl's code for an FTP server answering REST with an error.
const FTP_COULDNT_USE_REST: u32 = 31;

/// Whether curl gave up because the server would not continue from the
/// requested offset.
fn refuses_resume(e: &curl::Error) -> bool {
    e.code() == FTP_COULDNT_USE_REST || e.is_bad_download_resume() || e.is_range_error()
}

/// A refused resume only triggers the restart when there was an offset to
/// refuse; at offset 0 it is a plain protocol failure.
fn at_offset(err: TransferError, offset: u64) -> TransferError {
    match err {
        TransferError::Http(416) | TransferError::ResumeRejected if offset > 0 => {
            TransferError::ResumeRejected
        }
        TransferError::ResumeRejected => {
            TransferError::Protocol("server rejected transfer from offset 0".to_string())
        }
        other => other,
    }
}

/// Opens `path` for appending at `offset`: bytes past the offset are cut, and
/// an offset beyond the file falls back to the file's length.
fn open_at(path: &Path, offset: u64) -> io::Result<(File, u64)> {
    if offset == 0 {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        return Ok((file, 0));
    }
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let len = file.metadata()?.len();
    let offset = offset.min(len);
    if len > offset {
        file.set_len(offset)?;
    }
    Ok((file, offset))
}

fn on_disk(path: &Path) -> u64 {
    fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}
