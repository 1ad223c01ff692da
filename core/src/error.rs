use crate::{
    chunker::ChunkerError,
    completion::{ChatError, CompletionError},
    config::ConfigError,
    embeddings::EmbedderError,
    ingest::IngestError,
    loader::FileLoaderError,
    tools::{ToolError, ToolSetError},
    vector_store::VectorStoreError,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Completion error: {0}")]
    Completion(#[from] CompletionError),
    #[error("Chat error: {0}")]
    Chat(#[from] ChatError),
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),
    #[error("ToolSet error: {0}")]
    ToolSet(#[from] ToolSetError),
    #[error("VectorStore error: {0}")]
    VectorStore(#[from] VectorStoreError),
    #[error("Embedder error: {0}")]
    Embedder(#[from] EmbedderError),
    #[error("Ingest error: {0}")]
    Ingest(#[from] IngestError),
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
    #[error("Chunker error: {0}")]
    Chunker(#[from] ChunkerError),
    #[error("Loader error: {0}")]
    Loader(#[from] FileLoaderError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
