//! Background execution, cancellation and the boundary operations.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use docpipe::index::MemoryIndex;
use docpipe::{PipelineError, PipelineStage, ProcessParams, TaskError, TaskStatus, TaskStore};

#[tokio::test]
async fn test_delete_cancels_in_flight_run() {
    let harness = TestHarness::new();
    let input = harness.write_input("slow.png", b"\x89PNG");
    let ocr = StalledOcr::new();
    let engine = harness.engine(harness.services().ocr(ocr.clone()).build(), 2);

    engine.create_task(Some("slow")).unwrap();
    let handle = engine.submit("slow", &input, ProcessParams::default());

    tokio::time::timeout(Duration::from_secs(5), ocr.started.notified())
        .await
        .expect("OCR never started");
    assert_eq!(
        engine.get_task_status("slow").unwrap().current_stage,
        Some(PipelineStage::Ocr)
    );

    assert!(engine.delete_task("slow"));
    let outcome = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("cancelled run did not stop")
        .unwrap();

    match outcome {
        Err(PipelineError::Cancelled { stage }) => assert_eq!(stage, PipelineStage::Ocr),
        other => panic!("expected cancellation, got {:?}", other.map(|r| r.content)),
    }
    assert!(engine.get_task_status("slow").is_none());
    assert_eq!(engine.running_count(), 0);
    assert!(harness.output_files().is_empty());
}

#[tokio::test]
async fn test_panicking_collaborator_fails_task() {
    let harness = TestHarness::new();
    let input = harness.write_input("crash.png", b"\x89PNG");
    let engine = harness.engine(harness.services().ocr(Arc::new(PanickingOcr)).build(), 1);

    engine.create_task(Some("crash")).unwrap();
    let outcome = tokio::time::timeout(
        Duration::from_secs(5),
        engine.submit("crash", &input, ProcessParams::default()),
    )
    .await
    .expect("panicked run never finished")
    .unwrap();

    match outcome {
        Err(PipelineError::Panicked(message)) => assert!(message.contains("pixRead")),
        other => panic!("expected panic failure, got {:?}", other.map(|r| r.content)),
    }
    let task = engine.get_task_status("crash").unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert!(task.error.as_deref().unwrap().contains("panicked"));
    assert!(task.result.is_none());
    assert_eq!(engine.running_count(), 0);
    assert!(harness.output_files().is_empty());

    // the single permit was released, so a second run is not starved
    engine.create_task(Some("again")).unwrap();
    let again = tokio::time::timeout(
        Duration::from_secs(5),
        engine.submit("again", &input, ProcessParams::default()),
    )
    .await
    .expect("permit leaked by panicked run")
    .unwrap();
    assert!(matches!(again, Err(PipelineError::Panicked(_))));
}

#[tokio::test]
async fn test_panic_in_foreground_run_fails_task() {
    let harness = TestHarness::new();
    let input = harness.write_input("crash.png", b"\x89PNG");
    let engine = harness.engine(harness.services().ocr(Arc::new(PanickingOcr)).build(), 1);

    engine.create_task(Some("fg")).unwrap();
    let err = engine
        .run_pipeline("fg", &input, ProcessParams::default())
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::Panicked(_)));
    assert_eq!(engine.get_task_status("fg").unwrap().status, TaskStatus::Failed);
    assert_eq!(engine.running_count(), 0);
}

#[tokio::test]
async fn test_concurrent_tasks_complete_independently() {
    let harness = TestHarness::new();
    let services = harness
        .services()
        .ocr(ScriptedOcr::text("shared ocr text"))
        .index(RecordingIndex::new())
        .build();
    let engine = harness.engine(services, 2);

    let mut handles = Vec::new();
    for i in 0..6 {
        let task_id = format!("task-{}", i);
        let input = harness.write_input(&format!("page{}.png", i), b"\x89PNG");
        engine.create_task(Some(&task_id)).unwrap();
        handles.push(engine.submit(&task_id, &input, ProcessParams::default()));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let tasks = engine.list_tasks();
    assert_eq!(tasks.len(), 6);
    assert!(tasks.iter().all(|t| t.status == TaskStatus::Completed));
    assert!(tasks.iter().all(|t| t.progress_pct == 100.0));
    // one content file and one metadata file per task
    assert_eq!(harness.output_files().len(), 12);
    assert_eq!(engine.running_count(), 0);
}

#[tokio::test]
async fn test_failed_background_task_is_recorded() {
    let harness = TestHarness::new();
    let input = harness.write_input("scan.png", b"\x89PNG");
    let engine = harness.engine(
        harness
            .services()
            .ocr(ScriptedOcr::failing("no tessdata"))
            .build(),
        1,
    );

    engine.create_task(Some("t1")).unwrap();
    let outcome = engine
        .submit("t1", &input, ProcessParams::default())
        .await
        .unwrap();
    assert!(outcome.is_err());

    let task = engine.get_task_status("t1").unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert!(task.error.unwrap().contains("no tessdata"));
}

#[tokio::test]
async fn test_run_pipeline_then_search() {
    let harness = TestHarness::new();
    let input = harness.write_input("report.png", b"\x89PNG");
    let services = harness
        .services()
        .ocr(ScriptedOcr::text("Quarterly revenue grew by twelve percent"))
        .index(Arc::new(MemoryIndex::new("docs", 10)))
        .build();
    let engine = harness.engine(services, 1);

    engine.create_task(Some("t1")).unwrap();
    let result = engine
        .run_pipeline("t1", &input, ProcessParams::default())
        .await
        .unwrap();
    assert_eq!(result.vector_ids.len(), 1);

    let hits = engine.search("revenue", 5, None).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].metadata.get_str("source"), Some("report.png"));
    assert_eq!(hits[0].metadata.get("chunkIndex"), Some(&serde_json::json!(0)));

    assert!(engine.search("revenue", 5, Some("other")).await.unwrap().is_empty());
    assert!(engine.search("  ", 5, None).await.is_err());
}

#[tokio::test]
async fn test_health_reports_each_service() {
    let harness = TestHarness::new();
    let healthy = harness
        .engine(
            harness
                .services()
                .ocr(ScriptedOcr::text(""))
                .index(RecordingIndex::new())
                .build(),
            1,
        )
        .health()
        .await;
    assert_eq!(healthy.status, "healthy");
    assert_eq!(healthy.services.get("ocr"), Some(&true));
    assert_eq!(healthy.services.get("enhancer"), Some(&false));
    assert_eq!(healthy.version, env!("CARGO_PKG_VERSION"));

    let degraded = harness
        .engine(harness.services().index(Arc::new(FailingIndex)).build(), 1)
        .health()
        .await;
    assert_eq!(degraded.status, "degraded");
    assert_eq!(degraded.services.get("index"), Some(&false));
}

#[test]
fn test_duplicate_task_id_is_rejected() {
    let harness = TestHarness::new();
    let engine = harness.engine(harness.services().build(), 1);

    engine.create_task(Some("dup")).unwrap();
    let err = engine.create_task(Some("dup")).unwrap_err();
    assert_eq!(
        err,
        TaskError::Duplicate {
            task_id: "dup".to_string()
        }
    );
    assert_eq!(engine.list_tasks().len(), 1);
}

#[test]
fn test_mutations_on_unknown_task_create_nothing() {
    let harness = TestHarness::new();
    let tasks = &harness.tasks;
    let mut events = harness.subscribe();

    assert!(!tasks.update_stage("ghost", PipelineStage::Ocr, 30.0));
    assert!(!tasks.fail("ghost", "boom"));
    assert!(!tasks.delete("ghost"));
    assert!(tasks.get("ghost").is_none());
    assert!(tasks.list().is_empty());
    assert!(drain_events(&mut events).is_empty());
}

#[test]
fn test_terminal_tasks_ignore_further_updates() {
    let harness = TestHarness::new();
    let tasks = &harness.tasks;

    tasks.create("t1").unwrap();
    assert!(tasks.update_stage("t1", PipelineStage::Chunk, 70.0));
    assert!(tasks.update_stage("t1", PipelineStage::Enhance, 50.0));
    assert_eq!(tasks.get("t1").unwrap().progress_pct, 70.0);

    assert!(tasks.fail("t1", "boom"));
    assert!(!tasks.update_stage("t1", PipelineStage::Index, 85.0));
    assert!(!tasks.fail("t1", "again"));

    let task = tasks.get("t1").unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.error.as_deref(), Some("boom"));
}
