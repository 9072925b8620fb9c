//! Scripted collaborators standing in for tesseract, the VLM endpoint and
//! the vector database.

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use docpipe::index::IndexError;
use docpipe::processor::{
    BoundingBox, OcrBlock, OcrEngine, OcrOutput, ParseOutput, StructuralParser,
};
use docpipe::{Chunk, Enhancement, Enhancer, OutputFormat, SearchHit, StageError, VectorIndex};
use tokio::sync::Notify;

// ─── Parser ─────────────────────────────────────────────────────────────────

/// Returns fixed text for every parse and counts calls.
pub struct ScriptedParser {
    text: String,
    fail: Option<String>,
    pub calls: AtomicUsize,
}

impl ScriptedParser {
    pub fn text(text: &str) -> Arc<Self> {
        Arc::new(Self {
            text: text.to_string(),
            fail: None,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            text: String::new(),
            fail: Some(message.to_string()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StructuralParser for ScriptedParser {
    async fn parse(&self, _path: &Path) -> Result<ParseOutput, StageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.fail {
            Some(message) => Err(StageError::Parse(message.clone())),
            None => Ok(ParseOutput {
                text: self.text.clone(),
                ..ParseOutput::default()
            }),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

// ─── OCR ────────────────────────────────────────────────────────────────────

/// Returns one block per line of `text`, all at the same confidence.
pub struct ScriptedOcr {
    text: String,
    confidence: f32,
    fail: Option<String>,
}

impl ScriptedOcr {
    pub fn text(text: &str) -> Arc<Self> {
        Arc::new(Self {
            text: text.to_string(),
            confidence: 0.9,
            fail: None,
        })
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            text: String::new(),
            confidence: 0.0,
            fail: Some(message.to_string()),
        })
    }

    fn output(&self) -> OcrOutput {
        let blocks = self
            .text
            .lines()
            .enumerate()
            .map(|(i, line)| OcrBlock {
                text: line.to_string(),
                confidence: self.confidence,
                bounding_box: BoundingBox {
                    left: 0,
                    top: i as u32 * 20,
                    width: 400,
                    height: 18,
                },
                page: 1,
            })
            .collect();
        OcrOutput::from_blocks(blocks)
    }
}

#[async_trait]
impl OcrEngine for ScriptedOcr {
    async fn extract(&self, _path: &Path, _languages: &[String]) -> Result<OcrOutput, StageError> {
        match &self.fail {
            Some(message) => Err(StageError::Ocr(message.clone())),
            None => Ok(self.output()),
        }
    }

    async fn is_available(&self) -> bool {
        true
    }
}

/// Signals `started` and then hangs until the run is cancelled.
pub struct StalledOcr {
    pub started: Notify,
}

impl StalledOcr {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            started: Notify::new(),
        })
    }
}

#[async_trait]
impl OcrEngine for StalledOcr {
    async fn extract(&self, _path: &Path, _languages: &[String]) -> Result<OcrOutput, StageError> {
        self.started.notify_one();
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(OcrOutput::default())
    }

    async fn is_available(&self) -> bool {
        true
    }
}

/// Panics inside `extract`, like a crashing native binding.
pub struct PanickingOcr;

#[async_trait]
impl OcrEngine for PanickingOcr {
    async fn extract(&self, _path: &Path, _languages: &[String]) -> Result<OcrOutput, StageError> {
        panic!("leptonica pixRead returned null");
    }

    async fn is_available(&self) -> bool {
        true
    }
}

// ─── Enhancer ───────────────────────────────────────────────────────────────

/// Behaves like an endpoint that never answers within the deadline.
pub struct TimeoutEnhancer;

#[async_trait]
impl Enhancer for TimeoutEnhancer {
    async fn enhance(&self, _path: &Path, current_text: &str, _format: OutputFormat) -> Enhancement {
        Enhancement::fallback(current_text, "timeout")
    }

    async fn is_available(&self) -> bool {
        false
    }
}

/// Replaces the text with a fixed answer.
pub struct FixedEnhancer(pub String);

#[async_trait]
impl Enhancer for FixedEnhancer {
    async fn enhance(&self, _path: &Path, _current_text: &str, _format: OutputFormat) -> Enhancement {
        Enhancement::Enhanced(self.0.clone())
    }

    async fn is_available(&self) -> bool {
        true
    }
}

// ─── Index ──────────────────────────────────────────────────────────────────

/// Keeps every stored chunk for inspection.
#[derive(Default)]
pub struct RecordingIndex {
    pub stored: Mutex<Vec<Chunk>>,
    pub collections: Mutex<Vec<Option<String>>>,
}

impl RecordingIndex {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn chunks(&self) -> Vec<Chunk> {
        self.stored.lock().unwrap().clone()
    }
}

#[async_trait]
impl VectorIndex for RecordingIndex {
    async fn store(&self, chunks: &[Chunk], collection: Option<&str>) -> Result<Vec<String>, IndexError> {
        self.stored.lock().unwrap().extend_from_slice(chunks);
        self.collections
            .lock()
            .unwrap()
            .push(collection.map(str::to_string));
        Ok((0..chunks.len()).map(|i| format!("vec-{}", i)).collect())
    }

    async fn search(
        &self,
        _query: &str,
        _top_k: usize,
        _collection: Option<&str>,
    ) -> Result<Vec<SearchHit>, IndexError> {
        Ok(Vec::new())
    }

    async fn is_available(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "recording"
    }
}

/// Rejects every write as if the database were down.
pub struct FailingIndex;

#[async_trait]
impl VectorIndex for FailingIndex {
    async fn store(&self, _chunks: &[Chunk], _collection: Option<&str>) -> Result<Vec<String>, IndexError> {
        Err(IndexError::Unavailable("connection refused".to_string()))
    }

    async fn search(
        &self,
        _query: &str,
        _top_k: usize,
        _collection: Option<&str>,
    ) -> Result<Vec<SearchHit>, IndexError> {
        Err(IndexError::Unavailable("connection refused".to_string()))
    }

    async fn is_available(&self) -> bool {
        false
    }

    fn name(&self) -> &str {
        "failing"
    }
}
