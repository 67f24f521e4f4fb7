//! Task registry: in-memory source of truth for tasks and their workers.
//!
//! Every mutation rewrites the store with a full snapshot before it returns,
//! so the file is always a consistent picture of the registry minus the live
//! worker handles. Mutations are serialized behind one async lock.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use sweepbot_store::{StoreError, TaskStore};
use sweepbot_types::{ChannelRef, DeletionTask, Recurrence, StartTime, TaskError, TaskStatus};

use crate::channel::ChannelProvider;
use crate::worker;

/// Handle to one task's live worker. Owned exclusively by the registry entry,
/// never serialized.
struct WorkerHandle {
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

impl WorkerHandle {
    /// Signal the worker to stop. The worker observes the token at its next
    /// suspension point, so an in-flight sleep is interrupted promptly.
    fn stop(self) {
        self.cancel.cancel();
    }

    fn is_running(&self) -> bool {
        !self.join.is_finished()
    }
}

struct TaskEntry {
    task: DeletionTask,
    worker: Option<WorkerHandle>,
}

/// A validated-at-the-edge creation request; all schedule fields arrive as
/// the raw strings the intake collected.
#[derive(Debug, Clone)]
pub struct CreateTask {
    pub channel: ChannelRef,
    pub start_time: String,
    pub day_of_week: String,
    pub timezone: String,
    pub status: TaskStatus,
}

/// One task plus its derived liveness, as reported by `list_tasks`.
#[derive(Debug, Clone, Serialize)]
pub struct TaskView {
    #[serde(flatten)]
    pub task: DeletionTask,
    /// Whether a worker is currently running for this task. Derived, never
    /// stored.
    pub running: bool,
}

/// Owns the full task set and mediates between store, scheduler and control
/// operations.
pub struct TaskRegistry {
    store: TaskStore,
    channels: Arc<dyn ChannelProvider>,
    entries: Mutex<HashMap<String, TaskEntry>>,
}

impl TaskRegistry {
    pub fn new(store: TaskStore, channels: Arc<dyn ChannelProvider>) -> Self {
        Self {
            store,
            channels,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Validate, persist and start a new deletion task. Returns the fresh id.
    pub async fn create_task(&self, req: CreateTask) -> Result<String, TaskError> {
        let start_time: StartTime = req.start_time.parse()?;
        let recurrence: Recurrence = req.day_of_week.parse()?;
        sweepbot_types::resolve_timezone(&req.timezone)?;

        let task = DeletionTask {
            id: Uuid::new_v4().to_string(),
            channel: req.channel,
            start_time,
            recurrence,
            timezone: req.timezone,
            status: req.status,
        };

        let mut entries = self.entries.lock().await;
        let mut snapshot = snapshot_of(&entries);
        snapshot.push(task.clone());
        self.store.save(&snapshot).map_err(storage_err)?;

        let worker = if task.status == TaskStatus::Active {
            self.spawn_worker(&task).await
        } else {
            None
        };

        info!(
            task_id = %task.id,
            channel = %task.channel.name,
            recurrence = %task.recurrence,
            start_time = %task.start_time,
            timezone = %task.timezone,
            "deletion task created"
        );

        let id = task.id.clone();
        entries.insert(id.clone(), TaskEntry { task, worker });
        Ok(id)
    }

    /// Stop the worker (if any) and remove the task from registry and store.
    pub async fn cancel_task(&self, id: &str) -> Result<(), TaskError> {
        let mut entries = self.entries.lock().await;
        if !entries.contains_key(id) {
            return Err(TaskError::NotFound(id.to_string()));
        }

        let mut snapshot = snapshot_of(&entries);
        snapshot.retain(|t| t.id != id);
        self.store.save(&snapshot).map_err(storage_err)?;

        if let Some(entry) = entries.remove(id) {
            if let Some(handle) = entry.worker {
                handle.stop();
            }
        }
        info!(task_id = id, "deletion task cancelled");
        Ok(())
    }

    /// Activate or suspend a task. Idempotent: setting the current status is
    /// a successful no-op with no store write and no worker churn.
    pub async fn set_status(&self, id: &str, status: TaskStatus) -> Result<(), TaskError> {
        let mut entries = self.entries.lock().await;
        let current = match entries.get(id) {
            Some(entry) => entry.task.clone(),
            None => return Err(TaskError::NotFound(id.to_string())),
        };
        if current.status == status {
            return Ok(());
        }

        let mut updated = current;
        updated.status = status;

        let mut snapshot = snapshot_of(&entries);
        for task in &mut snapshot {
            if task.id == id {
                task.status = status;
            }
        }
        self.store.save(&snapshot).map_err(storage_err)?;

        // Resume spawns a fresh worker with a freshly computed next fire;
        // suspend stops the running one but keeps the descriptor.
        let worker = match status {
            TaskStatus::Active => self.spawn_worker(&updated).await,
            TaskStatus::Inactive => None,
        };

        if let Some(entry) = entries.get_mut(id) {
            if let Some(old) = entry.worker.take() {
                old.stop();
            }
            entry.worker = worker;
            entry.task = updated;
        }
        info!(task_id = id, status = ?status, "deletion task status updated");
        Ok(())
    }

    /// All tasks with derived worker liveness, ordered by id.
    pub async fn list_tasks(&self) -> Vec<TaskView> {
        let entries = self.entries.lock().await;
        let mut views: Vec<TaskView> = entries
            .values()
            .map(|entry| TaskView {
                task: entry.task.clone(),
                running: entry.worker.as_ref().is_some_and(WorkerHandle::is_running),
            })
            .collect();
        views.sort_by(|a, b| a.task.id.cmp(&b.task.id));
        views
    }

    /// Load the persisted task set and spawn workers for active tasks.
    /// Returns the number of workers spawned.
    ///
    /// A task whose channel cannot be resolved stays in the registry without
    /// a worker; it is logged, not cancelled, so a transient outage at
    /// startup never destroys schedules.
    pub async fn reload_all(&self) -> Result<usize, TaskError> {
        let tasks = self.store.load().map_err(storage_err)?;

        let mut entries = self.entries.lock().await;
        for (_, entry) in entries.drain() {
            if let Some(handle) = entry.worker {
                handle.stop();
            }
        }

        let mut spawned = 0;
        for task in tasks {
            let worker = if task.status == TaskStatus::Active {
                let handle = self.spawn_worker(&task).await;
                if handle.is_some() {
                    spawned += 1;
                }
                handle
            } else {
                None
            };
            entries.insert(task.id.clone(), TaskEntry { task, worker });
        }

        info!(total = entries.len(), spawned, "task set reloaded from store");
        Ok(spawned)
    }

    /// Stop all workers. Descriptors stay persisted for the next start.
    pub async fn shutdown(&self) {
        let mut entries = self.entries.lock().await;
        for entry in entries.values_mut() {
            if let Some(handle) = entry.worker.take() {
                handle.stop();
            }
        }
        info!("all workers stopped");
    }

    async fn spawn_worker(&self, task: &DeletionTask) -> Option<WorkerHandle> {
        match self.channels.resolve(&task.channel.id).await {
            Some(ops) => {
                let cancel = CancellationToken::new();
                let join = tokio::spawn(worker::run(task.clone(), ops, cancel.clone()));
                Some(WorkerHandle { cancel, join })
            }
            None => {
                warn!(
                    task_id = %task.id,
                    channel_id = %task.channel.id,
                    "channel unreachable, task left dormant"
                );
                None
            }
        }
    }
}

fn snapshot_of(entries: &HashMap<String, TaskEntry>) -> Vec<DeletionTask> {
    let mut tasks: Vec<DeletionTask> = entries.values().map(|e| e.task.clone()).collect();
    tasks.sort_by(|a, b| a.id.cmp(&b.id));
    tasks
}

fn storage_err(e: StoreError) -> TaskError {
    TaskError::Storage(e.to_string())
}
