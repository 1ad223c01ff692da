pub use crate::{
    completion::{ChatEvent, ChatOutcome, Client, CompletionModel, Conversation, Message},
    config::Config,
    document::{Document, DocumentId},
    embeddings::model::EmbeddingModel,
    error::{Error, Result},
    ingest::{IngestRequest, IngestionService},
    loader::{FileOnceLoaderBuilder, Loader},
    tools::{RetrievalTool, Tool, ToolSet},
    vector_store::{InMemoryVectorStore, VectorStore},
};
