//! Module for loading documents from files.
//!
//! [`FileOnceLoader`] resolves glob patterns and folders into text files once,
//! skipping empty files and extensions the upload page does not accept.

mod utils;

pub mod file_once_loader;

pub use file_once_loader::{FileOnceLoader, FileOnceLoaderBuilder};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FileLoaderError {
    #[error("Invalid glob-pattern")]
    InvalidGlobPattern(#[from] glob::PatternError),
    #[error("No matching documents found")]
    NoMatchingDocuments,
    #[error("Failed to read files: {0}")]
    Io(#[from] std::io::Error),
    #[error("File loading task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
