//! In-process task registry.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;

use crate::error::TaskError;

use super::events::{TaskEvent, TaskEventBroadcaster, TaskEventKind};
use super::model::{PipelineStage, ProcessingResult, Task, TaskStatus};

// ─── TaskStore ──────────────────────────────────────────────────────────────

/// Registry of task status records.
///
/// Mutating calls against an unknown or terminal task are silent no-ops;
/// they return `false` instead of an error. Reads return `None` for unknown
/// ids. Implementations must apply each call atomically.
pub trait TaskStore: Send + Sync {
    /// Inserts a pending task. Fails if the id is already registered.
    fn create(&self, task_id: &str) -> Result<Task, TaskError>;

    /// Moves a running task to `stage`. Progress is clamped to `[0, 100]`
    /// and never decreases.
    fn update_stage(&self, task_id: &str, stage: PipelineStage, progress: f32) -> bool;

    /// Marks the task completed and attaches its result.
    fn complete(&self, task_id: &str, result: ProcessingResult) -> bool;

    /// Marks the task failed with a human-readable message.
    fn fail(&self, task_id: &str, error: &str) -> bool;

    fn get(&self, task_id: &str) -> Option<Task>;

    /// Removes the record. Returns true iff something was removed.
    fn delete(&self, task_id: &str) -> bool;

    /// Snapshot of all tasks, oldest first.
    fn list(&self) -> Vec<Task>;
}

// ─── InMemoryTaskStore ──────────────────────────────────────────────────────

/// Volatile, process-lifetime task store.
///
/// A single `RwLock` guards the map; every operation holds it for exactly
/// one short critical section. Accepted mutations are published on the
/// optional [`TaskEventBroadcaster`] while the lock is still held, so
/// subscribers see events in the order the store applied them.
#[derive(Default)]
pub struct InMemoryTaskStore {
    tasks: RwLock<HashMap<String, Task>>,
    events: Option<TaskEventBroadcaster>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that publishes every accepted mutation.
    pub fn with_events(events: TaskEventBroadcaster) -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
            events: Some(events),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Task>> {
        match self.tasks.read() {
            Ok(g) => g,
            Err(poisoned) => {
                log::warn!("Task store lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Task>> {
        match self.tasks.write() {
            Ok(g) => g,
            Err(poisoned) => {
                log::warn!("Task store lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn publish(&self, kind: TaskEventKind, task: &Task) {
        if let Some(ref events) = self.events {
            events.send(TaskEvent::from_task(kind, task));
        }
    }

    /// Applies `mutate` to a live task and publishes `kind`. Returns the
    /// updated snapshot, or `None` when the task is unknown or already
    /// terminal.
    fn mutate_live<F>(
        &self,
        task_id: &str,
        op: &str,
        kind: TaskEventKind,
        mutate: F,
    ) -> Option<Task>
    where
        F: FnOnce(&mut Task),
    {
        let mut tasks = self.write();
        match tasks.get_mut(task_id) {
            None => {
                log::debug!("Ignoring {} for unknown task {}", op, task_id);
                None
            }
            Some(task) if task.is_terminal() => {
                log::debug!(
                    "Ignoring {} for task {} in terminal state {}",
                    op,
                    task_id,
                    task.status
                );
                None
            }
            Some(task) => {
                mutate(task);
                self.publish(kind, task);
                Some(task.clone())
            }
        }
    }
}

fn clamp_progress(current: f32, requested: f32) -> f32 {
    if requested.is_nan() {
        return current;
    }
    requested.clamp(0.0, 100.0).max(current)
}

impl TaskStore for InMemoryTaskStore {
    fn create(&self, task_id: &str) -> Result<Task, TaskError> {
        let mut tasks = self.write();
        if tasks.contains_key(task_id) {
            return Err(TaskError::Duplicate {
                task_id: task_id.to_string(),
            });
        }
        let task = Task::new(task_id);
        tasks.insert(task_id.to_string(), task.clone());
        self.publish(TaskEventKind::Created, &task);

        log::debug!("Created task {}", task_id);
        Ok(task)
    }

    fn update_stage(&self, task_id: &str, stage: PipelineStage, progress: f32) -> bool {
        if stage == PipelineStage::Done {
            log::warn!(
                "Ignoring update_stage(Done) for task {}; only completion sets Done",
                task_id
            );
            return false;
        }

        self.mutate_live(task_id, "stage update", TaskEventKind::StageChanged, |task| {
            task.current_stage = Some(stage);
            task.progress_pct = clamp_progress(task.progress_pct, progress);
            task.status = TaskStatus::Processing;
        })
        .is_some()
    }

    fn complete(&self, task_id: &str, result: ProcessingResult) -> bool {
        let updated = self.mutate_live(task_id, "completion", TaskEventKind::Completed, |task| {
            task.status = TaskStatus::Completed;
            task.current_stage = Some(PipelineStage::Done);
            task.progress_pct = 100.0;
            task.result = Some(result);
            task.completed_at = Some(Utc::now());
        });

        if updated.is_some() {
            log::info!("Task {} completed", task_id);
        }
        updated.is_some()
    }

    fn fail(&self, task_id: &str, error: &str) -> bool {
        let updated = self.mutate_live(task_id, "failure", TaskEventKind::Failed, |task| {
            task.status = TaskStatus::Failed;
            task.error = Some(error.to_string());
            task.completed_at = Some(Utc::now());
        });

        if updated.is_some() {
            log::warn!("Task {} failed: {}", task_id, error);
        }
        updated.is_some()
    }

    fn get(&self, task_id: &str) -> Option<Task> {
        self.read().get(task_id).cloned()
    }

    fn delete(&self, task_id: &str) -> bool {
        let mut tasks = self.write();
        match tasks.remove(task_id) {
            Some(task) => {
                self.publish(TaskEventKind::Deleted, &task);
                log::debug!("Deleted task {}", task_id);
                true
            }
            None => false,
        }
    }

    fn list(&self) -> Vec<Task> {
        let mut tasks: Vec<Task> = self.read().values().cloned().collect();
        tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        tasks
    }
}
