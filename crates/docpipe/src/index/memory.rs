//! Process-local vector index.
//!
//! Embeddings are hashed term-frequency vectors: every token is hashed into
//! one of [`EMBEDDING_DIM`] buckets and the resulting vector is
//! L2-normalized. CJK ideographs count as one token each, so Chinese text
//! without spaces still matches on shared characters.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::chunker::Chunk;
use crate::config::IndexConfig;
use crate::metadata::Metadata;

use super::{IndexError, SearchHit, VectorIndex, MAX_TOP_K};

pub const EMBEDDING_DIM: usize = 256;

struct IndexedChunk {
    id: String,
    text: String,
    embedding: Vec<f32>,
    metadata: Metadata,
}

type Collections = HashMap<String, Vec<IndexedChunk>>;

pub struct MemoryIndex {
    collections: RwLock<Collections>,
    default_collection: String,
    batch_size: usize,
}

impl MemoryIndex {
    pub fn new(default_collection: impl Into<String>, batch_size: usize) -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            default_collection: default_collection.into(),
            batch_size: batch_size.max(1),
        }
    }

    pub fn from_config(config: &IndexConfig) -> Self {
        Self::new(config.default_collection.clone(), config.batch_size)
    }

    pub fn default_collection(&self) -> &str {
        &self.default_collection
    }

    /// Number of entries stored in `collection`.
    pub fn len(&self, collection: &str) -> usize {
        self.read().get(collection).map_or(0, Vec::len)
    }

    fn read(&self) -> RwLockReadGuard<'_, Collections> {
        match self.collections.read() {
            Ok(g) => g,
            Err(poisoned) => {
                log::warn!("Index lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, Collections> {
        match self.collections.write() {
            Ok(g) => g,
            Err(poisoned) => {
                log::warn!("Index lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn resolve_collection<'a>(&'a self, collection: Option<&'a str>) -> Result<&'a str, IndexError> {
        let name = collection.unwrap_or(&self.default_collection);
        let valid = !name.is_empty()
            && name.len() <= 128
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if valid {
            Ok(name)
        } else {
            Err(IndexError::InvalidCollection(name.to_string()))
        }
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn store(
        &self,
        chunks: &[Chunk],
        collection: Option<&str>,
    ) -> Result<Vec<String>, IndexError> {
        let name = self.resolve_collection(collection)?;
        let mut ids = Vec::with_capacity(chunks.len());

        for batch in chunks.chunks(self.batch_size) {
            let entries: Vec<IndexedChunk> = batch
                .iter()
                .map(|chunk| IndexedChunk {
                    id: Uuid::new_v4().to_string(),
                    text: chunk.text.clone(),
                    embedding: embed(&chunk.text),
                    metadata: flatten_metadata(chunk),
                })
                .collect();

            ids.extend(entries.iter().map(|e| e.id.clone()));
            self.write()
                .entry(name.to_string())
                .or_default()
                .extend(entries);
            tracing::debug!(collection = name, batch = batch.len(), "Indexed chunk batch");
        }

        tracing::info!(collection = name, count = ids.len(), "Stored chunks in index");
        Ok(ids)
    }

    async fn search(
        &self,
        query: &str,
        top_k: usize,
        collection: Option<&str>,
    ) -> Result<Vec<SearchHit>, IndexError> {
        if query.trim().is_empty() {
            return Err(IndexError::EmptyQuery);
        }
        let name = self.resolve_collection(collection)?;
        let top_k = top_k.clamp(1, MAX_TOP_K);
        let query_embedding = embed(query);

        let collections = self.read();
        let Some(entries) = collections.get(name) else {
            return Ok(Vec::new());
        };

        let mut scored: Vec<(f32, &IndexedChunk)> = entries
            .iter()
            .map(|e| (cosine_similarity(&query_embedding, &e.embedding), e))
            .filter(|(score, _)| *score > 0.0)
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));

        Ok(scored
            .into_iter()
            .take(top_k)
            .map(|(score, e)| SearchHit {
                text: e.text.clone(),
                score,
                metadata: e.metadata.clone(),
            })
            .collect())
    }

    async fn is_available(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "memory"
    }
}

// ─── Embedding ──────────────────────────────────────────────────────────────

fn is_cjk(c: char) -> bool {
    matches!(c,
        '\u{3040}'..='\u{30FF}'   // kana
        | '\u{3400}'..='\u{4DBF}' // CJK extension A
        | '\u{4E00}'..='\u{9FFF}' // CJK unified
        | '\u{AC00}'..='\u{D7AF}' // hangul
        | '\u{F900}'..='\u{FAFF}')
}

/// Lowercased alphanumeric words, with each CJK character as its own token.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut word = String::new();

    for c in text.chars() {
        if is_cjk(c) {
            if !word.is_empty() {
                tokens.push(std::mem::take(&mut word));
            }
            tokens.push(c.to_string());
        } else if c.is_alphanumeric() {
            word.extend(c.to_lowercase());
        } else if !word.is_empty() {
            tokens.push(std::mem::take(&mut word));
        }
    }
    if !word.is_empty() {
        tokens.push(word);
    }
    tokens
}

pub fn embed(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0f32; EMBEDDING_DIM];
    for token in tokenize(text) {
        let mut hasher = DefaultHasher::new();
        token.hash(&mut hasher);
        let bucket = (hasher.finish() % EMBEDDING_DIM as u64) as usize;
        vector[bucket] += 1.0;
    }

    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.iter_mut().for_each(|x| *x /= norm);
    }
    vector
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

/// Scalar-only copy of the chunk metadata, always carrying `chunkIndex`.
/// Nested values are stored as their JSON text; nulls are dropped.
fn flatten_metadata(chunk: &Chunk) -> Metadata {
    let mut flat = Metadata::new();
    for (key, value) in chunk.metadata.iter() {
        let scalar = match value {
            Value::Null => continue,
            Value::Array(_) | Value::Object(_) => Value::String(value.to_string()),
            other => other.clone(),
        };
        flat.insert_new(key.clone(), scalar);
    }
    if !flat.contains_key("chunkIndex") {
        flat.insert_new("chunkIndex", chunk.chunk_index);
    }
    flat
}
