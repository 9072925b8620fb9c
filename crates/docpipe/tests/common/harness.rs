//! Test harness for pipeline and engine integration tests.
//!
//! Provides:
//! - Isolated temp directories for input, output and config files
//! - An in-memory task store wired to an event broadcaster
//! - Helpers for building a `Pipeline` or `Engine` around fake services

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use docpipe::pipeline::ServicesBuilder;
use docpipe::storage::FileSink;
use docpipe::task::{TaskEvent, TaskEventBroadcaster};
use docpipe::{Engine, InMemoryTaskStore, Pipeline, Services, TaskStore};
use tempfile::TempDir;
use tokio::sync::broadcast;

/// Test harness providing isolated directories and a shared task store.
pub struct TestHarness {
    /// Root temp directory (dropped when the harness goes out of scope)
    pub temp_dir: TempDir,
    /// Directory holding uploaded input files
    pub input_dir: PathBuf,
    /// Directory the file sink writes results into
    pub output_dir: PathBuf,
    /// Directory for config files
    pub config_dir: PathBuf,
    pub events: TaskEventBroadcaster,
    pub tasks: Arc<dyn TaskStore>,
}

impl TestHarness {
    /// Create a new test harness. The output directory is left for the sink
    /// to create.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let input_dir = temp_dir.path().join("input");
        let output_dir = temp_dir.path().join("output");
        let config_dir = temp_dir.path().join("config");

        std::fs::create_dir_all(&input_dir).expect("Failed to create input dir");
        std::fs::create_dir_all(&config_dir).expect("Failed to create config dir");

        let events = TaskEventBroadcaster::default();
        let tasks: Arc<dyn TaskStore> = Arc::new(InMemoryTaskStore::with_events(events.clone()));

        Self {
            temp_dir,
            input_dir,
            output_dir,
            config_dir,
            events,
            tasks,
        }
    }

    /// Write an input file; the bytes are irrelevant to the fake services.
    pub fn write_input(&self, filename: &str, content: &[u8]) -> PathBuf {
        let path = self.input_dir.join(filename);
        std::fs::write(&path, content).expect("Failed to write input file");
        path
    }

    /// Write a config file and return its path.
    pub fn write_config(&self, filename: &str, content: &str) -> PathBuf {
        let path = self.config_dir.join(filename);
        std::fs::write(&path, content).expect("Failed to write config file");
        path
    }

    /// Stand-in services writing into `output_dir`.
    pub fn services(&self) -> ServicesBuilder {
        Services::builder(Arc::new(FileSink::new(&self.output_dir)))
    }

    pub fn pipeline(&self, services: Services) -> Pipeline {
        Pipeline::new(services, self.tasks.clone())
    }

    pub fn engine(&self, services: Services, max_concurrent_tasks: usize) -> Engine {
        Engine::with_store(
            services,
            self.tasks.clone(),
            self.events.clone(),
            max_concurrent_tasks,
        )
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.events.subscribe()
    }

    /// Files written by the sink, sorted by name. Empty if nothing was written.
    pub fn output_files(&self) -> Vec<PathBuf> {
        list_files(&self.output_dir)
    }

    pub fn read_output(&self, path: &Path) -> String {
        std::fs::read_to_string(path).expect("Failed to read output file")
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

fn list_files(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .collect();
    files.sort();
    files
}

/// Drain every event currently buffered in `rx`.
pub fn drain_events(rx: &mut broadcast::Receiver<TaskEvent>) -> Vec<TaskEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
