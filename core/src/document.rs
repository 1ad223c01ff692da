use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Identifier of an ingested [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(Uuid);

impl DocumentId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A document accepted into the knowledge base.
///
/// Documents are immutable once stored, uploading changed content creates a
/// new `Document` rather than editing an existing one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: DocumentId,
    /// Text as stored, including the `File:` provenance header when a label was given.
    pub text: String,
    /// Human readable source, usually the uploaded file's path.
    pub label: Option<String>,
    pub created_at: DateTime<Utc>,
    /// SHA-256 of `text`, used to detect re-uploads.
    pub fingerprint: String,
    pub chunk_count: usize,
}

impl Document {
    pub(crate) fn new(
        id: DocumentId,
        text: String,
        label: Option<String>,
        fingerprint: String,
        chunk_count: usize,
    ) -> Self {
        Self {
            id,
            text,
            label,
            created_at: Utc::now(),
            fingerprint,
            chunk_count,
        }
    }
}

/// Hex encoded SHA-256 digest of `text`.
///
/// Used both as the document fingerprint and as the per-chunk dedup key.
#[must_use]
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Prefix `text` with the `File: <label>` header line.
pub(crate) fn with_provenance_header(label: &str, text: &str) -> String {
    format!("File: {label}\n{text}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_hash_is_stable_and_content_sensitive() {
        let a = content_hash("The sky is blue.");
        assert_eq!(a, content_hash("The sky is blue."));
        assert_ne!(a, content_hash("The sky is blue!"));
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn provenance_header_goes_on_its_own_line() {
        let text = with_provenance_header("notes/sky.txt", "The sky is blue.");
        assert_eq!(text, "File: notes/sky.txt\nThe sky is blue.");
    }

    #[test]
    fn document_ids_are_unique() {
        assert_ne!(DocumentId::new(), DocumentId::new());
    }
}
