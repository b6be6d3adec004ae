//! Cooperative pause/cancel signalling for running transfers.
//!
//! Every task run owns a `ControlToken`. The controller raises a signal on it;
//! transfer code checks the token on every body write, in curl's progress
//! callback (roughly once per second even on an idle socket) and between
//! backoff sleep slices, then stops with a typed outcome.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const SIGNAL_NONE: u8 = 0;
const SIGNAL_PAUSE: u8 = 1;
const SIGNAL_CANCEL: u8 = 2;

/// Longest uninterrupted stretch of `ControlToken::sleep`.
const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// A stop request raised by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    /// Stop, keep bytes on disk, allow resume.
    Pause,
    /// Stop for good; the caller removes partial files.
    Cancel,
}

/// Decision taken at a read checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop(ControlSignal),
}

/// Shared stop flag for one task run. Cancel dominates pause: once cancel is
/// requested the token never reports pause again.
#[derive(Debug, Clone, Default)]
pub struct ControlToken {
    state: Arc<AtomicU8>,
    parent: Option<Box<ControlToken>>,
}

impl ControlToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a token that stops when either it or `self` is signalled.
    /// Signals raised on the child do not reach the parent.
    pub fn child(&self) -> Self {
        Self {
            state: Arc::new(AtomicU8::new(SIGNAL_NONE)),
            parent: Some(Box::new(self.clone())),
        }
    }

    pub fn request(&self, signal: ControlSignal) {
        let value = match signal {
            ControlSignal::Pause => SIGNAL_PAUSE,
            ControlSignal::Cancel => SIGNAL_CANCEL,
        };
        self.state.fetch_max(value, Ordering::SeqCst);
    }

    /// Current signal, including any inherited from the parent token.
    pub fn signal(&self) -> Option<ControlSignal> {
        let own = decode(self.state.load(Ordering::SeqCst));
        let inherited = self.parent.as_ref().and_then(|p| p.signal());
        match (own, inherited) {
            (Some(ControlSignal::Cancel), _) | (_, Some(ControlSignal::Cancel)) => {
                Some(ControlSignal::Cancel)
            }
            (own, inherited) => own.or(inherited),
        }
    }

    pub fn checkpoint(&self) -> Flow {
        match self.signal() {
            Some(signal) => Flow::Stop(signal),
            None => Flow::Continue,
        }
    }

    /// Sleeps for `duration` unless a signal arrives first, in which case the
    /// signal is returned within one slice.
    pub fn sleep(&self, duration: Duration) -> Option<ControlSignal> {
        let deadline = Instant::now() + duration;
        loop {
            if let Some(signal) = self.signal() {
                return Some(signal);
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            std::thread::sleep((deadline - now).min(SLEEP_SLICE));
        }
    }
}

fn decode(value: u8) -> Option<ControlSignal> {
    match value {
        SIGNAL_PAUSE => Some(ControlSignal::Pause),
        SIGNAL_CANCEL => Some(ControlSignal::Cancel),
        _ => None,
    }
}
