//! # docchat - Core API Documentation
//!
//! docchat is the retrieval layer behind a "chat with your documents" app:
//! uploaded text is chunked, embedded and indexed, and a language model
//! answers questions by calling a knowledge-base tool inside a bounded
//! multi-step loop.
//!
//! ## Features
//!
//! - **Ingestion** of raw text or whole folders, deduplicated by content hash,
//!   with bounded retries for flaky embedding providers
//! - **Vector Stores**: chunk storage with cosine top-K lookup (in-memory)
//! - **Embedders**: pluggable text embedding providers
//! - **Chat Client**: a streaming tool-calling loop with an explicit step limit
//! - **Tools**: function calling abstractions with JSON-schema definitions
//!
//! ### Ingest, then chat
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use docchat::prelude::*;
//! use docchat::providers::{completions::OpenAI, embeddings::OpenAIEmbedding};
//!
//! #[tokio::main]
//! async fn main() -> docchat::error::Result<()> {
//!     let config = Config::from_json(None)?;
//!     let embedder = Arc::new(OpenAIEmbedding::new(None)?);
//!     let store = Arc::new(InMemoryVectorStore::new());
//!
//!     let ingestion = IngestionService::new(embedder.clone(), store.clone(), &config)?;
//!     ingestion
//!         .handle(IngestRequest::new("The sky is blue.").with_path("notes/sky.txt"))
//!         .await
//!         .ok();
//!
//!     let tools = ToolSet::default().with_tool(RetrievalTool::from_config(embedder, store, &config));
//!     let client = Client::from_config(
//!         Arc::new(OpenAI::new(None)?),
//!         "You are a helpful assistant. Check your knowledge base before answering.",
//!         tools,
//!         &config,
//!     );
//!
//!     let mut conversation = client.conversation();
//!     let outcome = client.prompt(&mut conversation, "What color is the sky?").send().await?;
//!     println!("{}", outcome.text());
//!     Ok(())
//! }
//! ```
//!
//! ### Streaming a turn
//!
//! ```rust,no_run
//! # use docchat::prelude::*;
//! # async fn run<M: CompletionModel>(client: Client<M>) -> docchat::error::Result<()> {
//! let (tx, mut rx) = tokio::sync::mpsc::channel(64);
//! let mut conversation = client.conversation();
//! let turn = client.prompt(&mut conversation, "Summarise my notes").stream_to(tx);
//!
//! let printer = tokio::spawn(async move {
//!     while let Some(event) = rx.recv().await {
//!         match event {
//!             ChatEvent::TextDelta(text) => print!("{text}"),
//!             other => if let Some(status) = other.indicator() { println!("[{status}]") },
//!         }
//!     }
//! });
//! turn.send().await?;
//! printer.await.ok();
//! # Ok(())
//! # }
//! ```

/// Sentence-aware text chunking
pub mod chunker;

/// Language model completion and conversation management
///
/// Contains:
/// - Client running the bounded tool-calling loop
/// - Append-only conversation history
/// - Streaming chat events
pub mod completion;

/// Tunables shared by ingestion, retrieval and chat
pub mod config;

/// Ingested documents and content hashing
pub mod document;

/// Text embeddings support
pub mod embeddings;

/// Error types for all library operations
pub mod error;

/// Chunk, embed and store uploaded documents
pub mod ingest;

/// Resource loading utilities
pub mod loader;

/// Convenience prelude exports
pub mod prelude;

/// Builtin completion and embedding model providers
pub mod providers;

/// Function calling and tool execution support
pub mod tools;

/// Vector storage and retrieval
pub mod vector_store;

#[cfg(test)]
pub(crate) mod test_utils;
