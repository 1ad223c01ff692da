use crate::embeddings::EmbedderError;
use async_trait::async_trait;

/// A provider that turns text into fixed-length vectors.
///
/// Implementations must always return vectors of [`dimensions`](Self::dimensions) length.
#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    fn dimensions(&self) -> usize;

    async fn embed(&self, data: &str) -> Result<Vec<f64>, EmbedderError>;
}
