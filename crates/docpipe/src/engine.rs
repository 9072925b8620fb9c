//! Boundary surface used by request handlers and the CLI.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use tokio::sync::{broadcast, Semaphore};
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{ConfigError, TaskError};
use crate::index::{IndexError, SearchHit};
use crate::pipeline::{Pipeline, PipelineError, ProcessParams, Services};
use crate::task::{
    InMemoryTaskStore, PipelineStage, ProcessingResult, Task, TaskEvent, TaskEventBroadcaster,
    TaskStore,
};

/// Availability of each collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceHealth {
    /// `healthy` when the index is reachable, `degraded` otherwise.
    pub status: String,
    pub services: BTreeMap<String, bool>,
    pub version: String,
}

/// Cancellation handle of one run. `run_id` tells apart successive runs
/// registered under the same task id.
struct RunningTask {
    run_id: Uuid,
    token: CancellationToken,
}

type RunningTasks = HashMap<String, RunningTask>;

/// Owns the task store, the pipeline and the background task bookkeeping.
pub struct Engine {
    pipeline: Arc<Pipeline>,
    tasks: Arc<dyn TaskStore>,
    events: TaskEventBroadcaster,
    permits: Arc<Semaphore>,
    running: Arc<Mutex<RunningTasks>>,
}

impl Engine {
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let services = Services::from_config(config)?;
        Ok(Self::new(services, config.max_concurrent_tasks))
    }

    /// Builds an engine with an in-memory task store that publishes events.
    pub fn new(services: Services, max_concurrent_tasks: usize) -> Self {
        let events = TaskEventBroadcaster::default();
        let tasks: Arc<dyn TaskStore> =
            Arc::new(InMemoryTaskStore::with_events(events.clone()));
        Self::with_store(services, tasks, events, max_concurrent_tasks)
    }

    /// Builds an engine around an existing task store.
    pub fn with_store(
        services: Services,
        tasks: Arc<dyn TaskStore>,
        events: TaskEventBroadcaster,
        max_concurrent_tasks: usize,
    ) -> Self {
        Self {
            pipeline: Arc::new(Pipeline::new(services, tasks.clone())),
            tasks,
            events,
            permits: Arc::new(Semaphore::new(max_concurrent_tasks.max(1))),
            running: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn running(&self) -> MutexGuard<'_, RunningTasks> {
        lock_running(&self.running)
    }

    /// Registers a pending task. A fresh UUID is used when `task_id` is `None`.
    pub fn create_task(&self, task_id: Option<&str>) -> Result<Task, TaskError> {
        let task_id = match task_id {
            Some(id) => id.to_string(),
            None => Uuid::new_v4().to_string(),
        };
        self.tasks.create(&task_id)
    }

    /// Runs the pipeline for an existing task inline, without waiting for a
    /// permit.
    pub async fn run_pipeline(
        &self,
        task_id: &str,
        path: impl Into<PathBuf>,
        params: ProcessParams,
    ) -> Result<ProcessingResult, PipelineError> {
        let (run_id, token) = self.register(task_id);
        let outcome = run_contained(
            self.pipeline.clone(),
            task_id.to_string(),
            path.into(),
            params,
            token,
        )
        .await;
        unregister(&self.running, task_id, run_id);
        outcome
    }

    /// Runs the pipeline in the background, at most `max_concurrent_tasks`
    /// at a time. Fatal errors are logged here and also returned through
    /// the handle.
    pub fn submit(
        &self,
        task_id: &str,
        path: impl Into<PathBuf>,
        params: ProcessParams,
    ) -> JoinHandle<Result<ProcessingResult, PipelineError>> {
        let (run_id, token) = self.register(task_id);
        let pipeline = self.pipeline.clone();
        let permits = self.permits.clone();
        let running = self.running.clone();
        let task_id = task_id.to_string();
        let path = path.into();

        tokio::spawn(async move {
            let outcome = match permits.acquire_owned().await {
                Ok(_permit) => {
                    run_contained(pipeline, task_id.clone(), path, params, token).await
                }
                Err(_) => {
                    // semaphore closed, nothing ran
                    let e = PipelineError::Cancelled {
                        stage: PipelineStage::Upload,
                    };
                    pipeline.tasks().fail(&task_id, &e.to_string());
                    Err(e)
                }
            };

            unregister(&running, &task_id, run_id);
            if let Err(ref e) = outcome {
                if !e.is_cancelled() {
                    tracing::error!(task_id = %task_id, "Background task failed: {}", e);
                }
            }
            outcome
        })
    }

    fn register(&self, task_id: &str) -> (Uuid, CancellationToken) {
        let run_id = Uuid::new_v4();
        let token = CancellationToken::new();
        self.running().insert(
            task_id.to_string(),
            RunningTask {
                run_id,
                token: token.clone(),
            },
        );
        (run_id, token)
    }

    pub fn get_task_status(&self, task_id: &str) -> Option<Task> {
        self.tasks.get(task_id)
    }

    /// Removes the record and cancels the run if one is in flight.
    pub fn delete_task(&self, task_id: &str) -> bool {
        let removed = self.tasks.delete(task_id);
        if let Some(run) = self.running().remove(task_id) {
            tracing::info!(task_id, "Cancelling in-flight pipeline");
            run.token.cancel();
        }
        removed
    }

    pub fn list_tasks(&self) -> Vec<Task> {
        self.tasks.list()
    }

    /// Number of pipelines currently registered as running.
    pub fn running_count(&self) -> usize {
        self.running().len()
    }

    pub async fn search(
        &self,
        query: &str,
        top_k: usize,
        collection: Option<&str>,
    ) -> Result<Vec<SearchHit>, IndexError> {
        self.pipeline
            .services()
            .index
            .search(query, top_k, collection)
            .await
    }

    pub async fn health(&self) -> ServiceHealth {
        let services = self.pipeline.services();
        let ocr = services.ocr.is_available().await;
        let enhancer = services.enhancer.is_available().await;
        let index = services.index.is_available().await;

        let mut map = BTreeMap::new();
        map.insert(services.parser.name().to_string(), true);
        map.insert("ocr".to_string(), ocr);
        map.insert("enhancer".to_string(), enhancer);
        map.insert("index".to_string(), index);

        ServiceHealth {
            status: if index { "healthy" } else { "degraded" }.to_string(),
            services: map,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Stream of task store mutations.
    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.events.subscribe()
    }
}

/// Runs the pipeline on its own tokio task so a panicking collaborator
/// fails the task instead of leaving it `Processing`.
async fn run_contained(
    pipeline: Arc<Pipeline>,
    task_id: String,
    path: PathBuf,
    params: ProcessParams,
    token: CancellationToken,
) -> Result<ProcessingResult, PipelineError> {
    let run = {
        let pipeline = pipeline.clone();
        let task_id = task_id.clone();
        tokio::spawn(async move {
            pipeline
                .run_with_cancellation(&task_id, &path, params, &token)
                .await
        })
    };

    match run.await {
        Ok(outcome) => outcome,
        Err(e) => {
            let err = PipelineError::Panicked(join_failure(e));
            tracing::error!(task_id = %task_id, "{}", err);
            pipeline.tasks().fail(&task_id, &err.to_string());
            Err(err)
        }
    }
}

fn join_failure(e: JoinError) -> String {
    if !e.is_panic() {
        return e.to_string();
    }
    let payload = e.into_panic();
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Drops the running entry only if it still belongs to `run_id`.
fn unregister(running: &Mutex<RunningTasks>, task_id: &str, run_id: Uuid) {
    let mut running = lock_running(running);
    if running.get(task_id).is_some_and(|run| run.run_id == run_id) {
        running.remove(task_id);
    }
}

fn lock_running(running: &Mutex<RunningTasks>) -> MutexGuard<'_, RunningTasks> {
    match running.lock() {
        Ok(g) => g,
        Err(poisoned) => {
            log::warn!("Running task map lock was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}
