//! Byte-moving paths: ranged chunk fetches, the parallel supervisor and the
//! single-stream (HTTP or FTP) transfer. All of them block the calling
//! thread and report control signals as typed outcomes.

mod chunk;
mod parallel;
mod sink;
mod stream;

use std::sync::Arc;

use crate::control::ControlSignal;
use crate::error::EngineError;

pub use chunk::{fetch_chunk, ChunkOutcome, ChunkRequest};
pub use parallel::{run_parallel, ParallelJob};
pub use stream::{stream_download, StreamRequest};

/// Browser-like agent string; some mirrors refuse ranged requests from
/// unknown clients.
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Receives `(downloaded, total)` after every write; total 0 means unknown.
pub type ProgressFn = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// How a transfer run ended.
#[derive(Debug)]
pub enum TransferOutcome {
    Completed { bytes: u64 },
    Paused,
    Cancelled,
    Failed(EngineError),
}

impl TransferOutcome {
    pub fn from_signal(signal: ControlSignal) -> Self {
        match signal {
            ControlSignal::Pause => TransferOutcome::Paused,
            ControlSignal::Cancel => TransferOutcome::Cancelled,
        }
    }
}
