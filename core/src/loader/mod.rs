pub mod builtins;

use async_trait::async_trait;

use crate::ingest::IngestRequest;
pub use builtins::file_loaders::{FileLoaderError, FileOnceLoader, FileOnceLoaderBuilder};

/// A text file read from disk, ready to be ingested.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct LoadedFile {
    /// Path relative to the loader's root, `/` separated.
    pub path: String,
    pub filename: String,
    pub content: String,
}

impl From<LoadedFile> for IngestRequest {
    fn from(file: LoadedFile) -> Self {
        IngestRequest::new(file.content)
            .with_filename(file.filename)
            .with_path(file.path)
    }
}

/// A source of documents to ingest.
#[async_trait]
pub trait Loader: Send + Sync {
    async fn load(&self) -> Result<Vec<LoadedFile>, FileLoaderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loaded_file_becomes_labelled_request() {
        let request = IngestRequest::from(LoadedFile {
            path: "notes/sky.txt".into(),
            filename: "sky.txt".into(),
            content: "The sky is blue.".into(),
        });
        assert_eq!(request.content, "The sky is blue.");
        assert_eq!(request.filename.as_deref(), Some("sky.txt"));
        assert_eq!(request.source(), Some("notes/sky.txt"));
    }
}
