use std::path::PathBuf;

use async_trait::async_trait;
use glob::Pattern;
use tracing::{debug, info, instrument, warn};

use super::{
    utils::{has_extension, read_text, relative_label, resolve_input_to_files},
    FileLoaderError,
};
use crate::loader::{LoadedFile, Loader};

const DEFAULT_EXTENSIONS: [&str; 3] = ["txt", "md", "json"];

/// A builder for constructing a `FileOnceLoader`.
///
/// Takes a list of glob patterns, validated up front, that are resolved to
/// files each time the loader runs.
pub struct FileOnceLoaderBuilder {
    glob_patterns: Vec<String>,
    root: Option<PathBuf>,
    extensions: Vec<String>,
}

impl FileOnceLoaderBuilder {
    /// Creates a new `FileOnceLoaderBuilder` instance.
    ///
    /// # Arguments
    /// * `glob_patterns` - A vector of glob pattern strings to be loaded.
    ///
    /// # Returns
    /// * `Ok(Self)` - A new `FileOnceLoaderBuilder` instance.
    /// * `Err(FileLoaderError)` - If any of the patterns is invalid.
    pub fn new(glob_patterns: Vec<String>) -> Result<Self, FileLoaderError> {
        for p in &glob_patterns {
            Pattern::new(p)?;
        }
        Ok(Self {
            glob_patterns,
            root: None,
            extensions: DEFAULT_EXTENSIONS.iter().map(ToString::to_string).collect(),
        })
    }

    /// Report paths relative to `root`, e.g. the uploaded folder.
    #[must_use]
    pub fn relative_to(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    /// Accepted file extensions, `txt`, `md` and `json` by default. An empty
    /// list accepts every file.
    #[must_use]
    pub fn extensions<S: Into<String>>(mut self, extensions: impl IntoIterator<Item = S>) -> Self {
        self.extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    pub fn build(self) -> FileOnceLoader {
        FileOnceLoader {
            glob_patterns: self.glob_patterns,
            root: self.root,
            extensions: self.extensions,
        }
    }
}

/// Reads every matching text file once per call to [`Loader::load`].
///
/// Empty and non UTF-8 files are skipped.
#[derive(Clone)]
pub struct FileOnceLoader {
    glob_patterns: Vec<String>,
    root: Option<PathBuf>,
    extensions: Vec<String>,
}

impl FileOnceLoader {
    fn load_blocking(&self) -> Result<Vec<LoadedFile>, FileLoaderError> {
        let mut loaded = Vec::new();
        for path in resolve_input_to_files(&self.glob_patterns)? {
            if !has_extension(&path, &self.extensions) {
                debug!(path = %path.display(), "Skipping unsupported file type");
                continue;
            }
            let Some(content) = read_text(&path)? else {
                warn!(path = %path.display(), "Skipping file that is not valid UTF-8");
                continue;
            };
            if content.trim().is_empty() {
                debug!(path = %path.display(), "Skipping empty file");
                continue;
            }
            let filename = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            loaded.push(LoadedFile {
                path: relative_label(&path, self.root.as_deref()),
                filename,
                content,
            });
        }
        Ok(loaded)
    }
}

#[async_trait]
impl Loader for FileOnceLoader {
    #[instrument(skip(self), fields(patterns = ?self.glob_patterns))]
    async fn load(&self) -> Result<Vec<LoadedFile>, FileLoaderError> {
        let loader = self.clone();
        let files = tokio::task::spawn_blocking(move || loader.load_blocking()).await??;
        if files.is_empty() {
            return Err(FileLoaderError::NoMatchingDocuments);
        }
        info!(files = files.len(), "Loaded files");
        Ok(files)
    }
}
