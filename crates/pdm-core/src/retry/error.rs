//! Transport-level error for one transfer attempt.

use crate::control::ControlSignal;
use std::fmt;

/// Error returned by a single fetch attempt (chunk or stream).
/// Kept separate from `EngineError` so the retry loop can classify it before
/// it is escalated to task level.
#[derive(Debug)]
pub enum TransferError {
    /// Curl reported an error (timeout, connection, etc.).
    Curl(curl::Error),
    /// Response status was not 200 or 206.
    Http(u32),
    /// Transfer completed but fewer bytes arrived than the range length
    /// (e.g. server closed early). Retried.
    PartialTransfer { expected: u64, received: u64 },
    /// Local file write failed (disk full, permission denied). Not retried.
    Storage(std::io::Error),
    /// Server answered with something we cannot use (body overruns the range,
    /// missing length). Not retried.
    Protocol(String),
    /// Server refused to continue from the requested offset.
    ResumeRejected,
    /// A control signal stopped the transfer. Never retried.
    Interrupted(ControlSignal),
}

impl fmt::Display for TransferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferError::Curl(e) => write!(f, "{}", e),
            TransferError::Http(code) => write!(f, "HTTP error: {}", code),
            TransferError::PartialTransfer { expected, received } => {
                write!(f, "partial transfer: expected {} bytes, got {}", expected, received)
            }
            TransferError::Storage(e) => write!(f, "storage: {}", e),
            TransferError::Protocol(msg) => write!(f, "protocol error: {}", msg),
            TransferError::ResumeRejected => write!(f, "server rejected resume offset"),
            TransferError::Interrupted(signal) => write!(f, "interrupted by {:?}", signal),
        }
    }
}

impl std::error::Error for TransferError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TransferError::Curl(e) => Some(e),
            TransferError::Storage(e) => Some(e),
            _ => None,
        }
    }
}

impl From<curl::Error> for TransferError {
    fn from(e: curl::Error) -> Self {
        TransferError::Curl(e)
    }
}
