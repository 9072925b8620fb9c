//! Vector index collaborators.

pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::chunker::Chunk;
use crate::metadata::Metadata;

pub use memory::MemoryIndex;

/// Most hits a single search may return.
pub const MAX_TOP_K: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub text: String,
    pub score: f32,
    pub metadata: Metadata,
}

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Index unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid collection name '{0}'")]
    InvalidCollection(String),

    #[error("Empty search query")]
    EmptyQuery,
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Stores `chunks` in `collection` (or the default one) and returns one
    /// generated id per chunk, in chunk order.
    async fn store(&self, chunks: &[Chunk], collection: Option<&str>)
        -> Result<Vec<String>, IndexError>;

    /// Best matches first. An unknown collection yields no hits.
    async fn search(
        &self,
        query: &str,
        top_k: usize,
        collection: Option<&str>,
    ) -> Result<Vec<SearchHit>, IndexError>;

    async fn is_available(&self) -> bool;

    fn name(&self) -> &str;
}

/// Index used when indexing is switched off. Stores nothing.
#[derive(Debug, Clone, Default)]
pub struct DisabledIndex;

#[async_trait]
impl VectorIndex for DisabledIndex {
    async fn store(
        &self,
        _chunks: &[Chunk],
        _collection: Option<&str>,
    ) -> Result<Vec<String>, IndexError> {
        Ok(Vec::new())
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
        false
    }

    fn name(&self) -> &str {
        "disabled"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_index_stores_nothing() {
        let chunk = Chunk {
            text: "hello".to_string(),
            chunk_index: 0,
            metadata: Metadata::new(),
        };
        let ids = DisabledIndex.store(&[chunk], None).await.unwrap();
        assert!(ids.is_empty());
        assert!(DisabledIndex.search("hello", 5, None).await.unwrap().is_empty());
        assert!(!DisabledIndex.is_available().await);
    }
}
