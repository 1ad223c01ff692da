use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use super::{validate_vector, ChunkId, NewChunk, ScoredChunk, StoredChunk, VectorStore, VectorStoreError};
use crate::document::DocumentId;
use crate::embeddings::cosine_similarity;

#[derive(Default)]
struct Inner {
    /// Kept in insertion order.
    chunks: Vec<StoredChunk>,
    by_key: HashMap<(DocumentId, String), ChunkId>,
    dimensions: Option<usize>,
    next_id: ChunkId,
}

impl Inner {
    fn existing(&self, document_id: DocumentId, chunk: &NewChunk) -> Option<ChunkId> {
        self.by_key
            .get(&(document_id, chunk.content_hash.clone()))
            .copied()
    }

    fn push(&mut self, chunk: NewChunk, vector: Vec<f64>, document_id: DocumentId) -> ChunkId {
        if let Some(id) = self.existing(document_id, &chunk) {
            debug!(%document_id, chunk_id = id, "Chunk already stored");
            return id;
        }
        let id = self.next_id;
        self.next_id += 1;
        self.dimensions.get_or_insert(vector.len());
        self.by_key
            .insert((document_id, chunk.content_hash.clone()), id);
        self.chunks.push(StoredChunk {
            id,
            document_id,
            text: chunk.text,
            ordinal: chunk.ordinal,
            content_hash: chunk.content_hash,
            source_label: chunk.source_label,
            vector,
        });
        id
    }
}

/// Brute-force in-process vector store.
///
/// Writes are serialized behind a single write lock, so concurrent inserts of
/// the same chunk collapse into one entry. Queries take the read lock.
#[derive(Default)]
pub struct InMemoryVectorStore {
    inner: RwLock<Inner>,
}

impl InMemoryVectorStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that only accepts vectors of `dimensions` length.
    #[must_use]
    pub fn with_dimensions(dimensions: usize) -> Self {
        Self {
            inner: RwLock::new(Inner {
                dimensions: Some(dimensions),
                ..Inner::default()
            }),
        }
    }

    /// Stored chunks of one document, ordered by position in the document.
    pub async fn chunks_of(&self, document_id: DocumentId) -> Vec<StoredChunk> {
        let inner = self.inner.read().await;
        let mut chunks: Vec<_> = inner
            .chunks
            .iter()
            .filter(|c| c.document_id == document_id)
            .cloned()
            .collect();
        chunks.sort_by_key(|c| c.ordinal);
        chunks
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    #[instrument(skip(self, chunk, vector), fields(ordinal = chunk.ordinal))]
    async fn insert(
        &self,
        chunk: NewChunk,
        vector: Vec<f64>,
        document_id: DocumentId,
    ) -> Result<ChunkId, VectorStoreError> {
        let mut inner = self.inner.write().await;
        validate_vector(&vector, inner.dimensions)?;
        Ok(inner.push(chunk, vector, document_id))
    }

    #[instrument(skip(self, entries), fields(entries = entries.len()))]
    async fn insert_all(
        &self,
        document_id: DocumentId,
        entries: Vec<(NewChunk, Vec<f64>)>,
    ) -> Result<Vec<ChunkId>, VectorStoreError> {
        let mut inner = self.inner.write().await;
        let mut expected = inner.dimensions;
        for (_, vector) in &entries {
            validate_vector(vector, expected)?;
            expected = Some(vector.len());
        }
        let ids = entries
            .into_iter()
            .map(|(chunk, vector)| inner.push(chunk, vector, document_id))
            .collect();
        Ok(ids)
    }

    async fn query(&self, vector: &[f64], k: usize) -> Result<Vec<ScoredChunk>, VectorStoreError> {
        let inner = self.inner.read().await;
        if inner.chunks.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        validate_vector(vector, inner.dimensions)?;

        let mut results: Vec<(f64, &StoredChunk)> = inner
            .chunks
            .iter()
            .map(|chunk| (cosine_similarity(vector, &chunk.vector), chunk))
            .collect();
        results.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.id.cmp(&b.1.id)));
        results.truncate(k);
        Ok(results
            .into_iter()
            .map(|(score, chunk)| ScoredChunk {
                chunk: chunk.clone(),
                score,
            })
            .collect())
    }

    async fn remove_document(&self, document_id: DocumentId) -> Result<usize, VectorStoreError> {
        let mut inner = self.inner.write().await;
        let before = inner.chunks.len();
        inner.chunks.retain(|c| c.document_id != document_id);
        inner.by_key.retain(|(doc, _), _| *doc != document_id);
        let removed = before - inner.chunks.len();
        debug!(%document_id, removed, "Removed document chunks");
        Ok(removed)
    }

    async fn len(&self) -> Result<usize, VectorStoreError> {
        Ok(self.inner.read().await.chunks.len())
    }

    async fn dimensions(&self) -> Result<Option<usize>, VectorStoreError> {
        Ok(self.inner.read().await.dimensions)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn chunk(text: &str, ordinal: usize) -> NewChunk {
        NewChunk::new(text, ordinal, Some("notes.txt".to_string()))
    }

    #[tokio::test]
    async fn test_insert_is_idempotent_per_document() {
        let store = InMemoryVectorStore::new();
        let doc = DocumentId::new();

        let first = store
            .insert(chunk("hello world", 0), vec![1.0, 2.0, 3.0], doc)
            .await
            .unwrap();
        let second = store
            .insert(chunk("hello world", 0), vec![1.0, 2.0, 3.0], doc)
            .await
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(store.len().await.unwrap(), 1);

        // same text under another document is a separate chunk
        let other = store
            .insert(chunk("hello world", 0), vec![1.0, 2.0, 3.0], DocumentId::new())
            .await
            .unwrap();
        assert_ne!(first, other);
        assert_eq!(store.len().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_rejects_mismatched_dimensions() {
        let store = InMemoryVectorStore::new();
        let doc = DocumentId::new();
        store
            .insert(chunk("a", 0), vec![1.0, 0.0, 0.0], doc)
            .await
            .unwrap();

        let err = store
            .insert(chunk("b", 1), vec![1.0, 0.0], doc)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            VectorStoreError::DimensionMismatch {
                expected: 3,
                actual: 2
            }
        );
        assert!(err.is_validation());
        assert_eq!(store.len().await.unwrap(), 1);

        assert_eq!(
            store.insert(chunk("c", 2), vec![], doc).await.unwrap_err(),
            VectorStoreError::EmptyVector
        );
        assert_eq!(
            store
                .insert(chunk("d", 3), vec![f64::NAN, 0.0, 0.0], doc)
                .await
                .unwrap_err(),
            VectorStoreError::NonFiniteVector
        );
    }

    #[tokio::test]
    async fn test_with_dimensions_pins_length_up_front() {
        let store = InMemoryVectorStore::with_dimensions(2);
        assert_eq!(store.dimensions().await.unwrap(), Some(2));
        assert!(store
            .insert(chunk("a", 0), vec![1.0, 0.0, 0.0], DocumentId::new())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_query_empty_store() {
        let store = InMemoryVectorStore::new();
        assert!(store.query(&[1.0, 2.0], 4).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_top_n() {
        let store = InMemoryVectorStore::new();
        let doc = DocumentId::new();
        let id1 = store
            .insert(chunk("hello world", 0), vec![1.0, 2.0, 3.0], doc)
            .await
            .unwrap();
        let id2 = store
            .insert(chunk("shalom world", 1), vec![4.0, 5.0, 6.0], doc)
            .await
            .unwrap();
        store
            .insert(chunk("selam world", 2), vec![-7.0, 8.0, -9.0], doc)
            .await
            .unwrap();

        let top = store.query(&[1.0, 2.0, 3.0], 2).await.unwrap();
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].chunk.id, id1);
        assert_eq!(top[1].chunk.id, id2);
        assert!(top[0].score >= top[1].score);
        assert!((top[0].score - 1.0).abs() < 1e-12);
        assert_eq!(top[0].chunk.source_label.as_deref(), Some("notes.txt"));

        let all = store.query(&[1.0, 2.0, 3.0], 10).await.unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.windows(2).all(|w| w[0].score >= w[1].score));

        assert!(store.query(&[1.0, 2.0, 3.0], 0).await.unwrap().is_empty());
        assert!(store.query(&[1.0, 2.0], 2).await.is_err());
    }

    #[tokio::test]
    async fn test_ties_broken_by_insertion_order() {
        let store = InMemoryVectorStore::new();
        let doc = DocumentId::new();
        let mut ids = Vec::new();
        for (i, text) in ["first", "second", "third"].iter().enumerate() {
            ids.push(
                store
                    .insert(chunk(text, i), vec![1.0, 1.0], doc)
                    .await
                    .unwrap(),
            );
        }
        let top = store.query(&[2.0, 2.0], 3).await.unwrap();
        let got: Vec<_> = top.iter().map(|s| s.chunk.id).collect();
        assert_eq!(got, ids);
    }

    #[tokio::test]
    async fn test_insert_all_is_all_or_nothing() {
        let store = InMemoryVectorStore::new();
        let doc = DocumentId::new();
        let err = store
            .insert_all(
                doc,
                vec![
                    (chunk("a", 0), vec![1.0, 0.0]),
                    (chunk("b", 1), vec![0.0, 1.0]),
                    (chunk("c", 2), vec![0.0, 1.0, 0.0]),
                ],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, VectorStoreError::DimensionMismatch { .. }));
        assert_eq!(store.len().await.unwrap(), 0);
        assert_eq!(store.dimensions().await.unwrap(), None);

        let ids = store
            .insert_all(
                doc,
                vec![(chunk("a", 0), vec![1.0, 0.0]), (chunk("b", 1), vec![0.0, 1.0])],
            )
            .await
            .unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(store.chunks_of(doc).await.len(), 2);
    }

    #[tokio::test]
    async fn test_remove_document_cascades() {
        let store = InMemoryVectorStore::new();
        let (keep, drop) = (DocumentId::new(), DocumentId::new());
        store.insert(chunk("a", 0), vec![1.0, 0.0], keep).await.unwrap();
        store.insert(chunk("b", 0), vec![0.0, 1.0], drop).await.unwrap();
        store.insert(chunk("c", 1), vec![1.0, 1.0], drop).await.unwrap();

        assert_eq!(store.remove_document(drop).await.unwrap(), 2);
        assert_eq!(store.len().await.unwrap(), 1);
        assert!(store.chunks_of(drop).await.is_empty());

        // the dedup key is forgotten with the chunk
        store.insert(chunk("b", 0), vec![0.0, 1.0], drop).await.unwrap();
        assert_eq!(store.len().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_inserts() {
        let store = Arc::new(InMemoryVectorStore::new());
        let doc = DocumentId::new();

        let mut handles = Vec::new();
        for i in 0..32 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                // half the tasks race on the same content
                let text = if i % 2 == 0 { "shared".to_string() } else { format!("unique {i}") };
                store.insert(chunk(&text, i), vec![1.0, i as f64], doc).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(store.len().await.unwrap(), 17);
    }
}
