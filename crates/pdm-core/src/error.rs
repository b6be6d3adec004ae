//! Task-level error taxonomy.
//!
//! Pause and cancel are not errors; they travel as
//! `transfer::TransferOutcome::{Paused, Cancelled}`.

use std::io;
use thiserror::Error;

use crate::project::PathError;
use crate::retry::TransferError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unsupported URL scheme '{0}', use http, https or ftp")]
    UnsupportedScheme(String),

    #[error("invalid URL {0}")]
    InvalidUrl(String),

    #[error(transparent)]
    PathRejected(#[from] PathError),

    #[error("task {0} already exists")]
    DuplicateTask(String),

    /// Probe failed; the engine continues in single-stream mode with an
    /// unknown size.
    #[error("probe degraded: {0}")]
    ProbeDegraded(String),

    #[error("some chunks failed to download: {0}")]
    ChunkFetchFailed(String),

    #[error("chunk merge failed: {0}")]
    MergeFailed(#[source] io::Error),

    /// Malformed or unexpected server response.
    #[error("{0}")]
    Protocol(String),

    #[error("{0}")]
    Transfer(TransferError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl From<TransferError> for EngineError {
    fn from(e: TransferError) -> Self {
        match e {
            TransferError::Http(code) => EngineError::Protocol(format!("HTTP error: {code}")),
            TransferError::Protocol(msg) => EngineError::Protocol(msg),
            TransferError::Storage(io) => EngineError::Io(io),
            other => EngineError::Transfer(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_maps_to_protocol_message() {
        let e = EngineError::from(TransferError::Http(404));
        assert_eq!(e.to_string(), "HTTP error: 404");
    }

    #[test]
    fn merge_and_chunk_failures_read_differently() {
        let merge = EngineError::MergeFailed(io::Error::new(io::ErrorKind::NotFound, "chunk_3"));
        let fetch = EngineError::ChunkFetchFailed("chunk 3: HTTP error: 500".into());
        assert!(merge.to_string().starts_with("chunk merge failed"));
        assert!(fetch.to_string().starts_with("some chunks failed to download"));
    }
}
