//! Shared, lock-protected state of one task.
//!
//! The controller and the task's worker thread both hold a `TaskHandle`.
//! Every method takes the lock for a field update or a snapshot only; no I/O
//! happens while it is held.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

use crate::chunking::ChunkPlan;
use crate::probe::ProbeInfo;
use crate::progress::ProgressTracker;
use crate::task::{DownloadTask, TaskEvent, TaskStatus};

/// Transfer path chosen on the first run and reused on resume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TransferMode {
    Parallel(ChunkPlan),
    Single,
}

pub(crate) struct TaskState {
    pub(crate) task: DownloadTask,
    pub(crate) probe: Option<ProbeInfo>,
    pub(crate) mode: Option<TransferMode>,
    tracker: ProgressTracker,
}

#[derive(Clone)]
pub(crate) struct TaskHandle {
    state: Arc<Mutex<TaskState>>,
    events: broadcast::Sender<TaskEvent>,
}

impl TaskHandle {
    pub(crate) fn new(
        task: DownloadTask,
        sample_interval: Duration,
        events: broadcast::Sender<TaskEvent>,
    ) -> Self {
        let state = TaskState {
            tracker: ProgressTracker::new(sample_interval, task.downloaded_size),
            task,
            probe: None,
            mode: None,
        };
        Self {
            state: Arc::new(Mutex::new(state)),
            events,
        }
    }

    fn lock(&self) -> MutexGuard<'_, TaskState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, event: TaskEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }

    pub(crate) fn snapshot(&self) -> DownloadTask {
        self.lock().task.clone()
    }

    pub(crate) fn status(&self) -> TaskStatus {
        self.lock().task.status
    }

    pub(crate) fn with_state<R>(&self, f: impl FnOnce(&mut TaskState) -> R) -> R {
        f(&mut self.lock())
    }

    /// Moves to `next` if allowed and announces it.
    pub(crate) fn transition(&self, next: TaskStatus) -> bool {
        let snapshot = {
            let mut st = self.lock();
            if st.task.status == next {
                return true;
            }
            if !st.task.transition(next) {
                tracing::debug!(
                    task_id = %st.task.task_id,
                    from = %st.task.status,
                    to = %next,
                    "ignored status change"
                );
                return false;
            }
            st.task.clone()
        };
        self.publish(TaskEvent::StatusChanged(snapshot));
        true
    }

    /// Settles a finished run into `next`, stepping through `downloading`
    /// first when the run never left `preparing`.
    pub(crate) fn settle(&self, next: TaskStatus) -> bool {
        if self.status() == TaskStatus::Preparing && next != TaskStatus::Cancelled {
            self.transition(TaskStatus::Downloading);
        }
        self.transition(next)
    }

    pub(crate) fn set_probe(&self, probe: ProbeInfo) {
        let mut st = self.lock();
        let downloaded = st.task.downloaded_size;
        st.task.set_sizes(downloaded, probe.content_length);
        st.probe = Some(probe);
    }

    pub(crate) fn set_destination(&self, filename: String, path: PathBuf) {
        let mut st = self.lock();
        st.task.filename = Some(filename);
        st.task.file_path = Some(path);
    }

    /// Seeds the resume offset from bytes already on disk.
    pub(crate) fn seed_downloaded(&self, bytes: u64) {
        let mut st = self.lock();
        let total = st.task.total_size;
        st.task.set_sizes(bytes, total);
        st.tracker.rebase(Instant::now(), bytes);
    }

    /// Restarts throughput measurement at the current size (new run).
    pub(crate) fn restart_sampling(&self) {
        let mut st = self.lock();
        let downloaded = st.task.downloaded_size;
        st.tracker.rebase(Instant::now(), downloaded);
    }

    /// Records bytes on disk. Ignored unless the task is downloading, so a
    /// worker that has not yet seen a pause or cancel cannot move counters.
    pub(crate) fn record_progress(&self, downloaded: u64, total: u64) {
        let snapshot = {
            let mut st = self.lock();
            if st.task.status != TaskStatus::Downloading {
                return;
            }
            let total = if total > 0 { total } else { st.task.total_size };
            st.task.set_sizes(downloaded, total);
            let now = Instant::now();
            let (downloaded, total) = (st.task.downloaded_size, st.task.total_size);
            match st.tracker.sample(now, downloaded, total) {
                Some(throughput) => {
                    st.task.apply_throughput(throughput);
                    st.task.clone()
                }
                None => return,
            }
        };
        self.publish(TaskEvent::Progress(snapshot));
    }

    pub(crate) fn complete(&self, bytes: u64) -> bool {
        if self.status() == TaskStatus::Preparing {
            self.transition(TaskStatus::Downloading);
        }
        let snapshot = {
            let mut st = self.lock();
            if st.task.status != TaskStatus::Downloading {
                return false;
            }
            let total = st.task.total_size;
            st.task.set_sizes(bytes, total);
            if !st.task.mark_completed() {
                return false;
            }
            st.task.clone()
        };
        self.publish(TaskEvent::StatusChanged(snapshot));
        true
    }

    pub(crate) fn fail(&self, message: String) -> bool {
        if self.status() == TaskStatus::Preparing {
            self.transition(TaskStatus::Downloading);
        }
        let snapshot = {
            let mut st = self.lock();
            if !st.task.mark_failed(message) {
                return false;
            }
            st.task.clone()
        };
        self.publish(TaskEvent::StatusChanged(snapshot));
        true
    }
}
