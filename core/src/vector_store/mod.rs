pub mod in_memory_vec_store;

use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

use crate::document::{content_hash, DocumentId};

pub use in_memory_vec_store::InMemoryVectorStore;

/// Identifier assigned to a chunk by the store, increasing in insertion order.
pub type ChunkId = u64;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VectorStoreError {
    #[error("Vector has {actual} dimensions, store holds {expected}-dimensional vectors")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("Cannot store an empty vector")]
    EmptyVector,
    #[error("Vector contains non-finite values")]
    NonFiniteVector,
    #[error("Vector store backend failure: {0}")]
    Backend(String),
}

impl VectorStoreError {
    /// Whether the error was caused by the caller's input rather than the store.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        !matches!(self, Self::Backend(_))
    }
}

/// A chunk ready to be inserted, before the store assigns it an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewChunk {
    pub text: String,
    /// Position of the chunk within its document.
    pub ordinal: usize,
    pub content_hash: String,
    pub source_label: Option<String>,
}

impl NewChunk {
    pub fn new(text: impl Into<String>, ordinal: usize, source_label: Option<String>) -> Self {
        let text = text.into();
        let content_hash = content_hash(&text);
        Self {
            text,
            ordinal,
            content_hash,
            source_label,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredChunk {
    pub id: ChunkId,
    pub document_id: DocumentId,
    pub text: String,
    pub ordinal: usize,
    pub content_hash: String,
    pub source_label: Option<String>,
    pub vector: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk: StoredChunk,
    pub score: f64,
}

/// Storage for chunk vectors with nearest-neighbour lookup.
///
/// Inserts are idempotent per (document, content hash) and every stored
/// vector shares one dimensionality.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Store `chunk` for `document_id`, returning the existing id if the same
    /// text was already stored for that document.
    async fn insert(
        &self,
        chunk: NewChunk,
        vector: Vec<f64>,
        document_id: DocumentId,
    ) -> Result<ChunkId, VectorStoreError>;

    /// Store every chunk of a document or none of them.
    async fn insert_all(
        &self,
        document_id: DocumentId,
        entries: Vec<(NewChunk, Vec<f64>)>,
    ) -> Result<Vec<ChunkId>, VectorStoreError> {
        let mut ids = Vec::with_capacity(entries.len());
        for (chunk, vector) in entries {
            match self.insert(chunk, vector, document_id).await {
                Ok(id) => ids.push(id),
                Err(e) => {
                    warn!(%document_id, error = %e, "Insert failed, rolling back document");
                    self.remove_document(document_id).await?;
                    return Err(e);
                }
            }
        }
        Ok(ids)
    }

    /// Up to `k` chunks ordered by descending cosine similarity, earlier
    /// inserted chunks first on ties. An empty store yields an empty result.
    async fn query(&self, vector: &[f64], k: usize) -> Result<Vec<ScoredChunk>, VectorStoreError>;

    /// Delete every chunk belonging to `document_id`, returning how many were removed.
    async fn remove_document(&self, document_id: DocumentId) -> Result<usize, VectorStoreError>;

    async fn len(&self) -> Result<usize, VectorStoreError>;

    async fn is_empty(&self) -> Result<bool, VectorStoreError> {
        Ok(self.len().await? == 0)
    }

    /// Dimensionality of stored vectors, `None` until something has been stored.
    async fn dimensions(&self) -> Result<Option<usize>, VectorStoreError>;
}

pub(crate) fn validate_vector(vector: &[f64], expected: Option<usize>) -> Result<(), VectorStoreError> {
    if vector.is_empty() {
        return Err(VectorStoreError::EmptyVector);
    }
    if vector.iter().any(|v| !v.is_finite()) {
        return Err(VectorStoreError::NonFiniteVector);
    }
    match expected {
        Some(expected) if expected != vector.len() => Err(VectorStoreError::DimensionMismatch {
            expected,
            actual: vector.len(),
        }),
        _ => Ok(()),
    }
}
