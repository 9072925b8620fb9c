//! Task event broadcaster for streaming status changes to subscribers.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::model::{PipelineStage, Task, TaskStatus};

/// What happened to a task.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskEventKind {
    Created,
    StageChanged,
    Completed,
    Failed,
    Deleted,
}

/// Snapshot of a task taken right after an accepted mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskEvent {
    pub task_id: String,
    pub kind: TaskEventKind,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<PipelineStage>,
    pub progress_pct: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl TaskEvent {
    pub fn from_task(kind: TaskEventKind, task: &Task) -> Self {
        Self {
            task_id: task.task_id.clone(),
            kind,
            status: task.status,
            stage: task.current_stage,
            progress_pct: task.progress_pct,
            error: task.error.clone(),
            timestamp: Utc::now(),
        }
    }
}

/// Broadcasts task events to any number of subscribers.
#[derive(Clone)]
pub struct TaskEventBroadcaster {
    sender: Arc<broadcast::Sender<TaskEvent>>,
}

impl TaskEventBroadcaster {
    /// Creates a broadcaster with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn send(&self, event: TaskEvent) {
        // No active receivers is fine
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for TaskEventBroadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscriber_receives_event() {
        let broadcaster = TaskEventBroadcaster::new(8);
        let mut rx = broadcaster.subscribe();

        let task = Task::new("t-1");
        broadcaster.send(TaskEvent::from_task(TaskEventKind::Created, &task));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.task_id, "t-1");
        assert_eq!(event.kind, TaskEventKind::Created);
        assert_eq!(event.status, TaskStatus::Pending);
    }

    #[test]
    fn test_send_without_receivers_does_not_panic() {
        let broadcaster = TaskEventBroadcaster::new(1);
        let task = Task::new("t-2");
        broadcaster.send(TaskEvent::from_task(TaskEventKind::Deleted, &task));
        assert_eq!(broadcaster.receiver_count(), 0);
    }
}
