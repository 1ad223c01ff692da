//! Upload a folder of notes and print which files still need attention.
//!
//! ```sh
//! DOCCHAT_OPENAI_API_KEY=... cargo run --example ingest_folder -- ./notes
//! ```

use std::sync::Arc;

use docchat::ingest::failed_sources;
use docchat::prelude::*;
use docchat::providers::embeddings::OpenAIEmbedding;

#[tokio::main]
async fn main() -> Result<(), docchat::error::Error> {
    tracing_subscriber::fmt().init();
    let folder = std::env::args().nth(1).unwrap_or_else(|| ".".to_string());

    let config = Config::from_json(Some(r#"{ "ingest_concurrency": 8 }"#))?;
    let embedder = Arc::new(OpenAIEmbedding::new(None)?);
    let store = Arc::new(InMemoryVectorStore::new());
    let ingestion = IngestionService::new(embedder, store.clone(), &config)?;

    let files = FileOnceLoaderBuilder::new(vec![folder.clone()])?
        .relative_to(&folder)
        .build()
        .load()
        .await?;
    let outcomes = ingestion
        .ingest_all(files.into_iter().map(IngestRequest::from).collect())
        .await;

    for outcome in &outcomes {
        match &outcome.result {
            Ok(response) => println!(
                "{}: {} ({} chunks{})",
                outcome.source.as_deref().unwrap_or("<unnamed>"),
                response.message,
                response.chunks,
                if response.deduplicated { ", already known" } else { "" }
            ),
            Err(failure) => println!(
                "{}: {} [{}]",
                outcome.source.as_deref().unwrap_or("<unnamed>"),
                failure.error,
                failure.status
            ),
        }
    }
    println!("still to upload: {:?}", failed_sources(&outcomes));
    println!("chunks stored: {}", store.len().await?);
    Ok(())
}
