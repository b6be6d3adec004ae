//! Task controller: registry, lifecycle and worker supervision.
//!
//! Each task runs on its own named thread. The registry maps task ids to a
//! shared `TaskHandle`, the task's current `ControlToken` and its worker's
//! `JoinHandle`. Workers of removed tasks are kept in a retired list and
//! joined on `shutdown`.

mod handle;
mod worker;

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::thread::{self, JoinHandle};
use tokio::sync::broadcast;

use crate::config::PdmConfig;
use crate::control::{ControlSignal, ControlToken};
use crate::error::EngineError;
use crate::project::{ProjectPathResolver, ProjectRoot};
use crate::task::{DownloadTask, TaskEvent, TaskStatus};
use crate::url_model::parse_download_url;
use handle::TaskHandle;
use worker::{join_rel, remove_partial_files, run_task, WorkerContext};

const EVENT_CAPACITY: usize = 1024;

/// Arguments of `DownloadController::start`.
#[derive(Debug, Clone, Default)]
pub struct StartRequest {
    pub project_id: String,
    pub url: String,
    /// Caller-chosen file name; derived from the response or URL when None.
    pub filename: Option<String>,
    /// Directory inside the project, e.g. `/` or `/raw`.
    pub destination_path: String,
    /// Use parallel ranged chunks when the server allows it.
    pub concurrent: bool,
    /// Caller-chosen id; a UUID v4 is generated when None.
    pub task_id: Option<String>,
}

struct TaskEntry {
    handle: TaskHandle,
    token: ControlToken,
    worker: Option<JoinHandle<()>>,
}

struct Shared {
    ctx: WorkerContext,
    tasks: RwLock<HashMap<String, TaskEntry>>,
    retired: Mutex<Vec<(String, JoinHandle<()>)>>,
    events: broadcast::Sender<TaskEvent>,
}

/// Owns every download task. Cheap to clone; clones share the registry.
#[derive(Clone)]
pub struct DownloadController {
    shared: Arc<Shared>,
}

impl DownloadController {
    /// Controller resolving destinations under `config.projects_root`.
    pub fn new(config: PdmConfig) -> Self {
        let resolver = Arc::new(ProjectRoot::new(config.projects_root.clone()));
        Self::with_resolver(config, resolver)
    }

    pub fn with_resolver(config: PdmConfig, resolver: Arc<dyn ProjectPathResolver>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                ctx: WorkerContext {
                    config: Arc::new(config),
                    resolver,
                },
                tasks: RwLock::new(HashMap::new()),
                retired: Mutex::new(Vec::new()),
                events,
            }),
        }
    }

    pub fn config(&self) -> &PdmConfig {
        &self.shared.ctx.config
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, TaskEntry>> {
        self.shared.tasks.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, TaskEntry>> {
        self.shared.tasks.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn retire(&self, task_id: String, worker: JoinHandle<()>) {
        self.shared
            .retired
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((task_id, worker));
    }

    fn take_retired(&self, task_id: &str) -> Option<JoinHandle<()>> {
        let mut retired = self.shared.retired.lock().unwrap_or_else(PoisonError::into_inner);
        let pos = retired.iter().position(|(id, _)| id == task_id)?;
        Some(retired.swap_remove(pos).1)
    }

    fn spawn_worker(
        &self,
        handle: TaskHandle,
        token: ControlToken,
        predecessor: Option<JoinHandle<()>>,
    ) -> io::Result<JoinHandle<()>> {
        let ctx = self.shared.ctx.clone();
        let name = format!("pdm-task-{}", handle.snapshot().task_id);
        thread::Builder::new()
            .name(name)
            .spawn(move || run_task(ctx, handle, token, predecessor))
    }

    /// Validates the request, registers a `preparing` task and starts its
    /// worker. Returns the task id without waiting for any I/O.
    pub fn start(&self, req: StartRequest) -> Result<String, EngineError> {
        parse_download_url(&req.url)?;
        let resolver = &self.shared.ctx.resolver;
        resolver.resolve(&req.project_id, &req.destination_path)?;
        if let Some(name) = &req.filename {
            resolver.resolve(&req.project_id, &join_rel(&req.destination_path, name))?;
        }

        let task_id = req
            .task_id
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let mut tasks = self.write();
        if tasks.contains_key(&task_id) {
            return Err(EngineError::DuplicateTask(task_id));
        }

        let task = DownloadTask::new(
            task_id.clone(),
            req.url,
            req.project_id,
            req.destination_path,
            req.filename,
            req.concurrent,
        );
        let handle = TaskHandle::new(
            task,
            self.shared.ctx.config.progress_interval(),
            self.shared.events.clone(),
        );
        let token = ControlToken::new();
        // A cancelled task with the same id may still be winding down.
        let predecessor = self.take_retired(&task_id);
        let worker = self.spawn_worker(handle.clone(), token.clone(), predecessor)?;
        let _ = self
            .shared
            .events
            .send(TaskEvent::StatusChanged(handle.snapshot()));
        tasks.insert(
            task_id.clone(),
            TaskEntry {
                handle,
                token,
                worker: Some(worker),
            },
        );
        tracing::info!(task_id = %task_id, "task started");
        Ok(task_id)
    }

    pub fn get_progress(&self, task_id: &str) -> Option<DownloadTask> {
        self.read().get(task_id).map(|e| e.handle.snapshot())
    }

    /// Asks a preparing or downloading task to pause. The task reaches
    /// `paused` once its worker observes the request.
    pub fn pause(&self, task_id: &str) -> bool {
        let tasks = self.read();
        let Some(entry) = tasks.get(task_id) else {
            return false;
        };
        match entry.handle.status() {
            TaskStatus::Preparing | TaskStatus::Downloading => {
                entry.token.request(ControlSignal::Pause);
                tracing::info!(task_id, "pause requested");
                true
            }
            _ => false,
        }
    }

    /// Relaunches a paused task from its saved bytes.
    pub fn resume(&self, task_id: &str) -> bool {
        let mut tasks = self.write();
        let Some(entry) = tasks.get_mut(task_id) else {
            return false;
        };
        if entry.handle.status() != TaskStatus::Paused {
            return false;
        }
        if !entry.handle.transition(TaskStatus::Downloading) {
            return false;
        }
        let token = ControlToken::new();
        let predecessor = entry.worker.take();
        match self.spawn_worker(entry.handle.clone(), token.clone(), predecessor) {
            Ok(worker) => {
                entry.token = token;
                entry.worker = Some(worker);
                tracing::info!(task_id, "task resumed");
                true
            }
            Err(e) => {
                tracing::error!(task_id, "could not spawn worker: {}", e);
                entry.handle.fail(format!("could not spawn worker: {e}"));
                false
            }
        }
    }

    /// Stops a task, deletes its destination and temp files and drops it from
    /// the registry. Valid in every status.
    pub fn cancel(&self, task_id: &str) -> bool {
        let Some(entry) = self.write().remove(task_id) else {
            return false;
        };
        entry.token.request(ControlSignal::Cancel);
        entry.handle.transition(TaskStatus::Cancelled);
        if let Some(worker) = entry.worker {
            self.retire(task_id.to_string(), worker);
        }
        let task = entry.handle.snapshot();
        if let Some(path) = &task.file_path {
            remove_partial_files(path, task_id);
        }
        let _ = self.shared.events.send(TaskEvent::Removed {
            task_id: task_id.to_string(),
        });
        tracing::info!(task_id, "task cancelled");
        true
    }

    /// Snapshots, optionally for one project, oldest first.
    pub fn list(&self, project_id: Option<&str>) -> Vec<DownloadTask> {
        let mut out: Vec<DownloadTask> = self
            .read()
            .values()
            .map(|e| e.handle.snapshot())
            .filter(|t| project_id.map_or(true, |p| t.project_id == p))
            .collect();
        out.sort_by(|a, b| {
            a.started_at
                .cmp(&b.started_at)
                .then_with(|| a.task_id.cmp(&b.task_id))
        });
        out
    }

    /// Drops completed, failed and cancelled tasks. Files stay on disk.
    pub fn cleanup(&self) -> usize {
        let removed: Vec<(String, TaskEntry)> = {
            let mut tasks = self.write();
            let ids: Vec<String> = tasks
                .iter()
                .filter(|(_, e)| e.handle.status().is_terminal())
                .map(|(id, _)| id.clone())
                .collect();
            ids.into_iter()
                .filter_map(|id| tasks.remove(&id).map(|e| (id, e)))
                .collect()
        };
        let count = removed.len();
        for (task_id, entry) in removed {
            if let Some(worker) = entry.worker {
                self.retire(task_id.clone(), worker);
            }
            let _ = self.shared.events.send(TaskEvent::Removed { task_id });
        }
        self.reap_retired();
        if count > 0 {
            tracing::info!(count, "cleaned up finished tasks");
        }
        count
    }

    /// Joins retired workers that have already exited.
    fn reap_retired(&self) {
        let finished: Vec<JoinHandle<()>> = {
            let mut retired = self.shared.retired.lock().unwrap_or_else(PoisonError::into_inner);
            let (done, running): (Vec<_>, Vec<_>) =
                retired.drain(..).partition(|(_, w)| w.is_finished());
            *retired = running;
            done.into_iter().map(|(_, w)| w).collect()
        };
        for worker in finished {
            let _ = worker.join();
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.shared.events.subscribe()
    }

    /// Pauses every live task and joins every worker thread. Partial files
    /// are kept; tasks that were running end up `paused`.
    pub fn shutdown(&self) {
        let mut workers: Vec<JoinHandle<()>> = {
            let mut tasks = self.write();
            tasks
                .values_mut()
                .filter_map(|entry| {
                    entry.token.request(ControlSignal::Pause);
                    entry.worker.take()
                })
                .collect()
        };
        workers.extend(
            self.shared
                .retired
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .drain(..)
                .map(|(_, w)| w),
        );
        tracing::info!(workers = workers.len(), "shutting down");
        for worker in workers {
            let _ = worker.join();
        }
    }
}
