//! Download task data model and state machine.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::progress::{self, Throughput};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Preparing,
    Downloading,
    Paused,
    Completed,
    Error,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Error | TaskStatus::Cancelled
        )
    }

    /// Edges of the task state machine. Completed and error are only reached
    /// from downloading; cancel is allowed from every live state.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Preparing, Downloading)
                | (Preparing, Cancelled)
                | (Downloading, Paused)
                | (Downloading, Completed)
                | (Downloading, Error)
                | (Downloading, Cancelled)
                | (Paused, Downloading)
                | (Paused, Cancelled)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Preparing => "preparing",
            TaskStatus::Downloading => "downloading",
            TaskStatus::Paused => "paused",
            TaskStatus::Completed => "completed",
            TaskStatus::Error => "error",
            TaskStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of one task as exposed to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadTask {
    pub task_id: String,
    pub url: String,
    pub project_id: String,
    /// Logical directory inside the project, as given by the caller.
    pub destination_path: String,
    /// Final file name; None until the probe has run when the caller gave none.
    pub filename: Option<String>,
    pub file_path: Option<PathBuf>,
    /// Parallel chunks requested.
    pub concurrent: bool,
    pub status: TaskStatus,
    pub downloaded_size: u64,
    /// 0 when unknown.
    pub total_size: u64,
    pub progress_percent: f64,
    pub speed_bytes_per_sec: f64,
    pub time_remaining_sec: Option<f64>,
    pub error_message: Option<String>,
    /// Unix seconds.
    pub started_at: u64,
}

impl DownloadTask {
    pub(crate) fn new(
        task_id: String,
        url: String,
        project_id: String,
        destination_path: String,
        filename: Option<String>,
        concurrent: bool,
    ) -> Self {
        let started_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self {
            task_id,
            url,
            project_id,
            destination_path,
            filename,
            file_path: None,
            concurrent,
            status: TaskStatus::Preparing,
            downloaded_size: 0,
            total_size: 0,
            progress_percent: 0.0,
            speed_bytes_per_sec: 0.0,
            time_remaining_sec: None,
            error_message: None,
            started_at,
        }
    }

    /// Applies `next` if the state machine allows it.
    pub(crate) fn transition(&mut self, next: TaskStatus) -> bool {
        if self.status == next {
            return true;
        }
        if !self.status.can_transition_to(next) {
            return false;
        }
        self.status = next;
        if next != TaskStatus::Downloading {
            self.speed_bytes_per_sec = 0.0;
            self.time_remaining_sec = None;
        }
        true
    }

    /// Updates byte counters and percent. A known total never ends up below
    /// the bytes already written.
    pub(crate) fn set_sizes(&mut self, downloaded: u64, total: u64) {
        self.downloaded_size = downloaded;
        self.total_size = if total > 0 { total.max(downloaded) } else { 0 };
        self.progress_percent = progress::percent(self.downloaded_size, self.total_size);
    }

    pub(crate) fn apply_throughput(&mut self, throughput: Throughput) {
        self.speed_bytes_per_sec = throughput.bytes_per_sec;
        self.time_remaining_sec = throughput.eta_secs;
    }

    pub(crate) fn mark_completed(&mut self) -> bool {
        if !self.transition(TaskStatus::Completed) {
            return false;
        }
        if self.total_size == 0 || self.downloaded_size > self.total_size {
            self.total_size = self.downloaded_size;
        }
        self.downloaded_size = self.total_size;
        self.progress_percent = 100.0;
        self.time_remaining_sec = Some(0.0);
        true
    }

    pub(crate) fn mark_failed(&mut self, message: String) -> bool {
        if !self.transition(TaskStatus::Error) {
            return false;
        }
        self.error_message = Some(message);
        true
    }
}

/// Pushed to `DownloadController::subscribe` receivers.
#[derive(Debug, Clone)]
pub enum TaskEvent {
    StatusChanged(DownloadTask),
    Progress(DownloadTask),
    Removed { task_id: String },
}

impl TaskEvent {
    pub fn task_id(&self) -> &str {
        match self {
            TaskEvent::StatusChanged(t) | TaskEvent::Progress(t) => &t.task_id,
            TaskEvent::Removed { task_id } => task_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task() -> DownloadTask {
        DownloadTask::new(
            "t1".into(),
            "https://example.com/a.bin".into(),
            "p1".into(),
            "/".into(),
            None,
            true,
        )
    }

    #[test]
    fn happy_path_transitions() {
        let mut t = task();
        assert!(t.transition(TaskStatus::Downloading));
        assert!(t.transition(TaskStatus::Paused));
        assert!(t.transition(TaskStatus::Downloading));
        assert!(t.mark_completed());
        assert_eq!(t.status, TaskStatus::Completed);
    }

    #[test]
    fn terminal_states_are_sticky() {
        let mut t = task();
        assert!(t.transition(TaskStatus::Cancelled));
        assert!(!t.transition(TaskStatus::Downloading));
        assert!(!t.mark_failed("late".into()));
        assert_eq!(t.status, TaskStatus::Cancelled);
        assert!(t.error_message.is_none());
    }

    #[test]
    fn completion_only_from_downloading() {
        let mut t = task();
        assert!(!t.mark_completed());
        assert!(!t.transition(TaskStatus::Paused));
        assert_eq!(t.status, TaskStatus::Preparing);
    }

    #[test]
    fn sizes_keep_percent_in_range() {
        let mut t = task();
        t.set_sizes(512, 0);
        assert_eq!(t.progress_percent, 0.0);
        t.set_sizes(256, 1024);
        assert_eq!(t.progress_percent, 25.0);
        t.set_sizes(2048, 1024);
        assert_eq!(t.total_size, 2048);
        assert_eq!(t.progress_percent, 100.0);
    }

    #[test]
    fn completion_with_unknown_total_adopts_downloaded() {
        let mut t = task();
        t.transition(TaskStatus::Downloading);
        t.set_sizes(777, 0);
        t.mark_completed();
        assert_eq!(t.total_size, 777);
        assert_eq!(t.progress_percent, 100.0);
    }

    #[test]
    fn status_serializes_lowercase() {
        let json = serde_json::to_string(&TaskStatus::Downloading).unwrap();
        assert_eq!(json, "\"downloading\"");
    }
}
