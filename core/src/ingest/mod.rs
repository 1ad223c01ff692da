//! Document ingestion: chunk, embed and store uploaded text.
//!
//! [`IngestionService::ingest`] is the core operation. [`IngestionService::handle`]
//! wraps it in the upload endpoint contract and [`IngestionService::ingest_all`]
//! runs a folder upload with bounded concurrency.

pub mod retry;

use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, error, info, instrument, warn};

use crate::{
    chunker::Chunker,
    config::{Config, ConfigError},
    document::{content_hash, with_provenance_header, Document, DocumentId},
    embeddings::{embed_checked, model::EmbeddingModel, EmbedderError},
    vector_store::{NewChunk, VectorStore, VectorStoreError},
};

pub use retry::RetryPolicy;

pub const SUCCESS_MESSAGE: &str = "Resource successfully created and embedded.";
pub const FAILURE_MESSAGE: &str = "Failed to create resource";

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Invalid document: {0}")]
    Validation(String),
    #[error("Failed to embed chunk {ordinal}: {source}")]
    Embedding {
        ordinal: usize,
        #[source]
        source: EmbedderError,
    },
    #[error("Failed to store chunks: {0}")]
    Store(#[from] VectorStoreError),
}

impl IngestError {
    /// HTTP status the upload endpoint answers with.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::Embedding { .. } | Self::Store(_) => 500,
        }
    }
}

/// Body of an upload request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestRequest {
    pub content: String,
    #[serde(default)]
    pub filename: Option<String>,
    /// Relative path of the file within an uploaded folder.
    #[serde(default)]
    pub path: Option<String>,
}

impl IngestRequest {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            filename: None,
            path: None,
        }
    }

    #[must_use]
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Path if present, otherwise the filename.
    #[must_use]
    pub fn source(&self) -> Option<&str> {
        non_blank(self.path.as_deref()).or_else(|| non_blank(self.filename.as_deref()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestResponse {
    pub message: String,
    pub document_id: DocumentId,
    pub chunks: usize,
    /// The content had already been ingested and nothing new was stored.
    pub deduplicated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestFailure {
    pub error: String,
    pub status: u16,
}

/// Result of one file in a batch upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestOutcome {
    pub source: Option<String>,
    pub result: Result<IngestResponse, IngestFailure>,
}

/// Sources of the batch entries that failed, the files an uploader should keep.
#[must_use]
pub fn failed_sources(outcomes: &[IngestOutcome]) -> Vec<&str> {
    outcomes
        .iter()
        .filter(|o| o.result.is_err())
        .filter_map(|o| o.source.as_deref())
        .collect()
}

fn non_blank(s: Option<&str>) -> Option<&str> {
    s.filter(|s| !s.trim().is_empty())
}

/// Drops a fingerprint's cell when its document never got built, whether the
/// build failed or the ingesting future was dropped mid-flight.
struct PendingFingerprint<'a> {
    cell: Arc<OnceCell<Document>>,
    fingerprints: &'a DashMap<String, Arc<OnceCell<Document>>>,
    key: String,
}

impl Drop for PendingFingerprint<'_> {
    fn drop(&mut self) {
        // a cell still shared with other callers is left for them to initialise
        self.fingerprints.remove_if(&self.key, |_, cell| {
            Arc::ptr_eq(cell, &self.cell)
                && !cell.initialized()
                && Arc::strong_count(cell) == 2
        });
    }
}

pub struct IngestionService<M: ?Sized, V: ?Sized> {
    embedder: Arc<M>,
    store: Arc<V>,
    chunker: Chunker,
    retry: RetryPolicy,
    embed_timeout: Duration,
    concurrency: usize,
    documents: DashMap<DocumentId, Document>,
    fingerprints: DashMap<String, Arc<OnceCell<Document>>>,
}

impl<M, V> IngestionService<M, V>
where
    M: EmbeddingModel + ?Sized,
    V: VectorStore + ?Sized,
{
    pub fn new(embedder: Arc<M>, store: Arc<V>, config: &Config) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            embedder,
            store,
            chunker: config.chunker()?,
            retry: config.retry_policy(),
            embed_timeout: config.embed_timeout(),
            concurrency: config.ingest_concurrency,
            documents: DashMap::new(),
            fingerprints: DashMap::new(),
        })
    }

    /// Chunk, embed and store `text`.
    ///
    /// A label is recorded on every chunk and written into the stored text
    /// as a `File: <label>` header. Content that was already ingested returns
    /// the existing document.
    #[instrument(skip(self, text), fields(len = text.len()))]
    pub async fn ingest(&self, text: &str, label: Option<&str>) -> Result<Document, IngestError> {
        self.ingest_labelled(text, label, true)
            .await
            .map(|(document, _)| document)
    }

    async fn ingest_labelled(
        &self,
        text: &str,
        label: Option<&str>,
        header: bool,
    ) -> Result<(Document, bool), IngestError> {
        if text.trim().is_empty() {
            return Err(IngestError::Validation(
                "content must not be empty".to_string(),
            ));
        }
        let label = non_blank(label).map(ToString::to_string);
        let stored = match (&label, header) {
            (Some(label), true) => with_provenance_header(label, text),
            _ => text.to_string(),
        };
        let fingerprint = content_hash(&stored);

        let pending = PendingFingerprint {
            cell: Arc::clone(&self.fingerprints.entry(fingerprint.clone()).or_default()),
            fingerprints: &self.fingerprints,
            key: fingerprint.clone(),
        };
        let created = AtomicBool::new(false);
        let flag = &created;
        let document = pending
            .cell
            .get_or_try_init(move || async move {
                flag.store(true, Ordering::SeqCst);
                self.build_document(stored, label, fingerprint).await
            })
            .await?;

        let deduplicated = !created.load(Ordering::SeqCst);
        if deduplicated {
            info!(document_id = %document.id, "Content already ingested");
        }
        Ok((document.clone(), deduplicated))
    }

    async fn build_document(
        &self,
        text: String,
        label: Option<String>,
        fingerprint: String,
    ) -> Result<Document, IngestError> {
        let chunks = self.chunker.split(&text);
        if chunks.is_empty() {
            return Err(IngestError::Validation(
                "content produced no chunks".to_string(),
            ));
        }

        let id = DocumentId::new();
        let mut seen = HashSet::new();
        let mut entries = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let new_chunk = NewChunk::new(chunk.text, chunk.index, label.clone());
            if !seen.insert(new_chunk.content_hash.clone()) {
                debug!(document_id = %id, ordinal = chunk.index, "Skipping repeated chunk");
                continue;
            }
            let vector = self
                .retry
                .run(|| embed_checked(self.embedder.as_ref(), &new_chunk.text, self.embed_timeout))
                .await
                .map_err(|source| {
                    error!(document_id = %id, ordinal = chunk.index, error = %source, "Embedding failed");
                    IngestError::Embedding {
                        ordinal: chunk.index,
                        source,
                    }
                })?;
            entries.push((new_chunk, vector));
        }

        let chunk_count = entries.len();
        self.store.insert_all(id, entries).await.map_err(|e| {
            error!(document_id = %id, error = %e, "Storing chunks failed");
            IngestError::from(e)
        })?;

        let document = Document::new(id, text, label, fingerprint, chunk_count);
        self.documents.insert(id, document.clone());
        info!(document_id = %id, chunks = chunk_count, "Document ingested");
        Ok(document)
    }

    /// Upload endpoint: a `path` labels the document and adds the `File:`
    /// header, a bare `filename` only labels it.
    #[instrument(skip(self, request), fields(filename = ?request.filename, path = ?request.path))]
    pub async fn handle(&self, request: IngestRequest) -> Result<IngestResponse, IngestFailure> {
        let (label, header) = match (non_blank(request.path.as_deref()), non_blank(request.filename.as_deref())) {
            (Some(path), _) => (Some(path), true),
            (None, Some(filename)) => (Some(filename), false),
            (None, None) => (None, false),
        };

        match self.ingest_labelled(&request.content, label, header).await {
            Ok((document, deduplicated)) => Ok(IngestResponse {
                message: SUCCESS_MESSAGE.to_string(),
                document_id: document.id,
                chunks: document.chunk_count,
                deduplicated,
            }),
            Err(e @ IngestError::Validation(_)) => {
                warn!(error = %e, "Rejected upload");
                Err(IngestFailure {
                    error: e.to_string(),
                    status: e.status_code(),
                })
            }
            Err(e) => {
                error!(error = %e, "{FAILURE_MESSAGE}");
                Err(IngestFailure {
                    error: FAILURE_MESSAGE.to_string(),
                    status: e.status_code(),
                })
            }
        }
    }

    /// Ingest many uploads, at most `ingest_concurrency` at a time.
    ///
    /// Outcomes are returned in input order.
    pub async fn ingest_all(&self, requests: Vec<IngestRequest>) -> Vec<IngestOutcome> {
        let total = requests.len();
        let outcomes: Vec<IngestOutcome> = stream::iter(requests)
            .map(|request| async move {
                let source = request.source().map(ToString::to_string);
                let result = self.handle(request).await;
                IngestOutcome { source, result }
            })
            .buffered(self.concurrency)
            .collect()
            .await;
        let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
        info!(total, failed, "Batch ingestion finished");
        outcomes
    }

    /// Delete a document and all of its chunks.
    #[instrument(skip(self))]
    pub async fn remove_document(&self, id: DocumentId) -> Result<Option<Document>, IngestError> {
        let Some((_, document)) = self.documents.remove(&id) else {
            return Ok(None);
        };
        self.fingerprints.remove(&document.fingerprint);
        let removed = self.store.remove_document(id).await?;
        info!(document_id = %id, removed, "Document removed");
        Ok(Some(document))
    }

    #[must_use]
    pub fn document(&self, id: DocumentId) -> Option<Document> {
        self.documents.get(&id).map(|d| d.clone())
    }

    /// Every ingested document, oldest first.
    #[must_use]
    pub fn documents(&self) -> Vec<Document> {
        let mut documents: Vec<_> = self.documents.iter().map(|d| d.clone()).collect();
        documents.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        documents
    }
}
