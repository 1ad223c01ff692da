pub mod model;

use std::time::Duration;

use model::EmbeddingModel;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EmbedderError {
    #[error("RequestError: {0}")]
    Request(String),
    #[error("Embedding request timed out after {0:?}")]
    Timeout(Duration),
    #[error("Rate limited by provider: {0}")]
    RateLimited(String),
    #[error("Provider unavailable -> HTTP Status {0}: {1}")]
    Unavailable(u16, String),
    #[error("Provider rejected credentials -> HTTP Status {0}: {1}")]
    Unauthorized(u16, String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("ParseError: {0}")]
    Parse(String),
    #[error("Expected a {expected}-dimensional embedding, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

impl EmbedderError {
    /// Whether retrying the same request may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Request(_) | Self::Timeout(_) | Self::RateLimited(_) | Self::Unavailable(..)
        )
    }

    /// Classify a non-success HTTP response from an embedding provider.
    #[must_use]
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            429 => Self::RateLimited(body),
            401 | 403 => Self::Unauthorized(status, body),
            408 | 500..=599 => Self::Unavailable(status, body),
            _ => Self::InvalidInput(format!("HTTP Status {status}: {body}")),
        }
    }
}

/// Embed `text`, bounding the call by `timeout` and checking the vector length.
pub(crate) async fn embed_checked<M: EmbeddingModel + ?Sized>(
    model: &M,
    text: &str,
    timeout: Duration,
) -> Result<Vec<f64>, EmbedderError> {
    if text.trim().is_empty() {
        return Err(EmbedderError::InvalidInput("cannot embed empty text".to_string()));
    }
    let vector = tokio::time::timeout(timeout, model.embed(text))
        .await
        .map_err(|_| {
            warn!(?timeout, "Embedding call timed out");
            EmbedderError::Timeout(timeout)
        })??;
    if vector.len() != model.dimensions() {
        return Err(EmbedderError::DimensionMismatch {
            expected: model.dimensions(),
            actual: vector.len(),
        });
    }
    Ok(vector)
}

/// Cosine similarity of two vectors, `0.0` for empty, zero or mismatched inputs.
#[must_use]
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let (mut dot, mut norm_a, mut norm_b) = (0.0, 0.0, 0.0);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f64::EPSILON {
        0.0
    } else {
        dot / denom
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::FakeEmbedder;

    #[test]
    fn status_classification() {
        assert_eq!(
            EmbedderError::from_status(429, "slow down".into()),
            EmbedderError::RateLimited("slow down".into())
        );
        assert!(EmbedderError::from_status(429, String::new()).is_transient());
        assert!(EmbedderError::from_status(503, String::new()).is_transient());
        assert!(!EmbedderError::from_status(401, String::new()).is_transient());
        assert!(!EmbedderError::from_status(413, String::new()).is_transient());
        assert!(matches!(
            EmbedderError::from_status(400, "too long".into()),
            EmbedderError::InvalidInput(_)
        ));
    }

    #[test]
    fn cosine_similarity_bounds() {
        assert!((cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-12);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-12);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-12);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
    }

    #[tokio::test]
    async fn embed_checked_rejects_blank_text() {
        let embedder = FakeEmbedder::new();
        let err = embed_checked(&embedder, "   ", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, EmbedderError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn embed_checked_times_out() {
        let embedder = FakeEmbedder::new().with_delay(Duration::from_millis(200));
        let err = embed_checked(&embedder, "hello", Duration::from_millis(10))
            .await
            .unwrap_err();
        assert_eq!(err, EmbedderError::Timeout(Duration::from_millis(10)));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn embed_checked_enforces_dimensions() {
        let embedder = FakeEmbedder::new().with_wrong_dimensions();
        let err = embed_checked(&embedder, "hello", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, EmbedderError::DimensionMismatch { .. }));
    }
}
