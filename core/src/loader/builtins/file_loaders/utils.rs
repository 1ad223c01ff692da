use std::{
    collections::BTreeSet,
    io,
    path::{Path, PathBuf},
};

use glob::glob;
use tracing::warn;
use walkdir::WalkDir;

use super::FileLoaderError;

/// Expand glob patterns into files, walking any matched directories.
/// The result is sorted and free of duplicates.
pub(super) fn resolve_input_to_files(inputs: &[String]) -> Result<Vec<PathBuf>, FileLoaderError> {
    let mut files = BTreeSet::new();

    for input in inputs {
        for entry in glob(input)? {
            match entry {
                Ok(path) => {
                    if path.is_dir() {
                        for entry in WalkDir::new(path) {
                            let entry = entry.map_err(io::Error::from)?;
                            if entry.file_type().is_file() {
                                files.insert(entry.path().to_path_buf());
                            }
                        }
                    } else if path.is_file() {
                        files.insert(path);
                    }
                }
                Err(e) => warn!(error = %e, "Glob error"),
            }
        }
    }

    Ok(files.into_iter().collect())
}

pub(super) fn has_extension(path: &Path, extensions: &[String]) -> bool {
    if extensions.is_empty() {
        return true;
    }
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| extensions.iter().any(|allowed| allowed.eq_ignore_ascii_case(ext)))
}

/// Read `path` as UTF-8 text, `None` if it is not valid UTF-8.
pub(super) fn read_text(path: &Path) -> io::Result<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == io::ErrorKind::InvalidData => Ok(None),
        Err(e) => Err(e),
    }
}

/// `path` relative to `root` with `/` separators.
pub(super) fn relative_label(path: &Path, root: Option<&Path>) -> String {
    let relative = root
        .and_then(|root| path.strip_prefix(root).ok())
        .unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
