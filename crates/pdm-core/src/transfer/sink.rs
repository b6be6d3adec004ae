//! curl `Handler` that streams a response body into a file.
//!
//! Every write and every progress tick checks the control token; a signal,
//! a local write failure, an unwanted status or a body overrun makes the
//! callback refuse the data, curl aborts, and `take_error` turns the abort
//! into the matching `TransferError`.

use curl::easy::{Handler, WriteError};
use std::fs::File;
use std::io::Write;

use super::ProgressFn;
use crate::control::{ControlSignal, ControlToken, Flow};
use crate::retry::TransferError;

pub(super) struct BodySink {
    file: File,
    token: ControlToken,
    /// Bytes already on disk before this request.
    base: u64,
    /// Most bytes this response may deliver.
    limit: Option<u64>,
    /// A ranged request with a non-zero start; a 200 means the range was ignored.
    expect_partial: bool,
    known_total: u64,
    progress: Option<ProgressFn>,

    written: u64,
    status: Option<u32>,
    content_length: Option<u64>,
    stopped: Option<ControlSignal>,
    storage_error: Option<std::io::Error>,
    rejected_status: Option<u32>,
    resume_ignored: bool,
    overrun: bool,
}

impl BodySink {
    pub(super) fn new(file: File, token: ControlToken, base: u64) -> Self {
        Self {
            file,
            token,
            base,
            limit: None,
            expect_partial: false,
            known_total: 0,
            progress: None,
            written: 0,
            status: None,
            content_length: None,
            stopped: None,
            storage_error: None,
            rejected_status: None,
            resume_ignored: false,
            overrun: false,
        }
    }

    pub(super) fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub(super) fn expecting_partial(mut self, expect: bool) -> Self {
        self.expect_partial = expect;
        self
    }

    pub(super) fn reporting(mut self, progress: ProgressFn, known_total: u64) -> Self {
        self.progress = Some(progress);
        self.known_total = known_total;
        self
    }

    pub(super) fn written(&self) -> u64 {
        self.written
    }

    pub(super) fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    /// Total size as far as this response tells: the caller's known size, else
    /// Content-Length (offset by the resume base on a 206).
    pub(super) fn total(&self) -> u64 {
        if self.known_total > 0 {
            return self.known_total;
        }
        match (self.status, self.content_length) {
            (Some(206), Some(len)) => self.base + len,
            (_, Some(len)) => len,
            _ => 0,
        }
    }

    /// Maps a failed `perform` to the reason the sink recorded, if any.
    pub(super) fn take_error(&mut self, e: curl::Error) -> TransferError {
        if let Some(signal) = self.stopped.take() {
            return TransferError::Interrupted(signal);
        }
        if let Some(io) = self.storage_error.take() {
            return TransferError::Storage(io);
        }
        if let Some(code) = self.rejected_status.take() {
            return TransferError::Http(code);
        }
        if self.resume_ignored {
            return TransferError::ResumeRejected;
        }
        if self.overrun {
            return TransferError::Protocol(
                "response body is longer than the requested range".to_string(),
            );
        }
        TransferError::Curl(e)
    }

    fn check_status(&mut self) -> bool {
        match self.status {
            None | Some(206) => true,
            Some(200) if self.expect_partial => {
                self.resume_ignored = true;
                false
            }
            Some(200) => true,
            Some(code) => {
                self.rejected_status = Some(code);
                false
            }
        }
    }
}

impl Handler for BodySink {
    fn header(&mut self, data: &[u8]) -> bool {
        let line = String::from_utf8_lossy(data);
        let line = line.trim();
        if line.starts_with("HTTP/") {
            self.status = line
                .split_whitespace()
                .nth(1)
                .and_then(|code| code.parse().ok());
            self.content_length = None;
        } else if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("content-length") {
                self.content_length = value.trim().parse().ok();
            }
        }
        true
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, WriteError> {
        if let Flow::Stop(signal) = self.token.checkpoint() {
            self.stopped = Some(signal);
            return Ok(0);
        }
        if !self.check_status() {
            return Ok(0);
        }
        let incoming = data.len() as u64;
        if let Some(limit) = self.limit {
            if self.written + incoming > limit {
                self.overrun = true;
                return Ok(0);
            }
        }
        if let Err(e) = self.file.write_all(data) {
            self.storage_error = Some(e);
            return Ok(0);
        }
        self.written += incoming;
        if let Some(progress) = &self.progress {
            progress(self.base + self.written, self.total());
        }
        Ok(data.len())
    }

    fn progress(&mut self, _dltotal: f64, _dlnow: f64, _ultotal: f64, _ulnow: f64) -> bool {
        match self.token.checkpoint() {
            Flow::Continue => true,
            Flow::Stop(signal) => {
                self.stopped = Some(signal);
                false
            }
        }
    }
}
