//! Ingest a few files, then chat about them on stdin.
//!
//! ```sh
//! DOCCHAT_OPENAI_API_KEY=... cargo run --example chat_with_documents -- "notes/**/*.md"
//! ```

use std::io::{BufRead, Write};
use std::sync::Arc;

use docchat::prelude::*;
use docchat::providers::{completions::OpenAI, embeddings::OpenAIEmbedding};

const PREAMBLE: &str = "You are a helpful assistant. Check your knowledge base before answering any questions.
Only respond to questions using information from tool calls.
If no relevant information is found in the tool calls, respond, \"Sorry, I don't know.\"";

#[tokio::main]
async fn main() -> Result<(), docchat::error::Error> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();
    let patterns: Vec<String> = std::env::args().skip(1).collect();

    let config = Config::from_json(None)?;
    let embedder = Arc::new(OpenAIEmbedding::new(None)?);
    let store = Arc::new(InMemoryVectorStore::new());
    let ingestion = IngestionService::new(embedder.clone(), store.clone(), &config)?;

    if !patterns.is_empty() {
        let files = FileOnceLoaderBuilder::new(patterns)?.build().load().await?;
        ingestion
            .ingest_all(files.into_iter().map(IngestRequest::from).collect())
            .await;
    }

    let tools = ToolSet::default().with_tool(RetrievalTool::from_config(embedder, store, &config));
    let client = Client::from_config(Arc::new(OpenAI::new(None)?), PREAMBLE, tools, &config);
    let mut conversation = client.conversation();

    let stdin = std::io::stdin();
    print!("> ");
    std::io::stdout().flush().ok();
    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }

        let (tx, mut rx) = tokio::sync::mpsc::channel(64);
        let printer = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                match event {
                    ChatEvent::TextDelta(text) => print!("{text}"),
                    ChatEvent::StepLimitReached { steps } => {
                        println!("\n[gave up after {steps} lookups]");
                    }
                    other => {
                        if let Some(status) = other.indicator() {
                            println!("[{status}]");
                        }
                    }
                }
                std::io::stdout().flush().ok();
            }
        });

        client
            .prompt(&mut conversation, line)
            .stream_to(tx)
            .send()
            .await?;
        printer.await.ok();
        print!("\n> ");
        std::io::stdout().flush().ok();
    }
    Ok(())
}
