use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, instrument};

use super::{schema_value, Tool, ToolArg, ToolError};
use crate::{
    config::Config,
    embeddings::{embed_checked, model::EmbeddingModel},
    vector_store::{ChunkId, ScoredChunk, VectorStore},
};

pub const RETRIEVAL_TOOL_NAME: &str = "getInformation";
const RETRIEVAL_TOOL_DESCRIPTION: &str =
    "get information from your knowledge base to answer questions";

/// A stored chunk returned to the model as retrieval context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Passage {
    pub text: String,
    /// Cosine similarity to the query.
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_label: Option<String>,
    pub chunk_id: ChunkId,
}

impl From<ScoredChunk> for Passage {
    fn from(scored: ScoredChunk) -> Self {
        Self {
            text: scored.chunk.text,
            score: scored.score,
            source_label: scored.chunk.source_label,
            chunk_id: scored.chunk.id,
        }
    }
}

#[derive(Deserialize)]
struct Params {
    query: String,
}

/// Knowledge-base lookup exposed to the model as `getInformation`.
///
/// Embeds the query with the same model used at ingest time and returns the
/// `top_k` closest stored chunks.
pub struct RetrievalTool<M: ?Sized, V: ?Sized> {
    embedder: Arc<M>,
    store: Arc<V>,
    top_k: usize,
    timeout: Duration,
    args: Vec<ToolArg>,
}

impl<M, V> RetrievalTool<M, V>
where
    M: EmbeddingModel + ?Sized,
    V: VectorStore + ?Sized,
{
    pub fn new(embedder: Arc<M>, store: Arc<V>, top_k: usize, timeout: Duration) -> Self {
        Self {
            embedder,
            store,
            top_k,
            timeout,
            args: vec![ToolArg::new::<String>("query", "the users question")],
        }
    }

    pub fn from_config(embedder: Arc<M>, store: Arc<V>, config: &Config) -> Self {
        Self::new(embedder, store, config.top_k, config.embed_timeout())
    }

    #[instrument(skip(self), fields(top_k = self.top_k))]
    pub async fn invoke(&self, query: &str) -> Result<Vec<Passage>, ToolError> {
        if query.trim().is_empty() {
            return Err(ToolError::InvalidArguments(
                "query must not be empty".to_string(),
            ));
        }
        let vector = embed_checked(self.embedder.as_ref(), query, self.timeout).await?;
        let hits = self.store.query(&vector, self.top_k).await?;
        info!(hits = hits.len(), "Retrieved passages");
        Ok(hits.into_iter().map(Passage::from).collect())
    }
}

#[async_trait]
impl<M, V> Tool for RetrievalTool<M, V>
where
    M: EmbeddingModel + ?Sized,
    V: VectorStore + ?Sized,
{
    fn name(&self) -> &str {
        RETRIEVAL_TOOL_NAME
    }

    fn description(&self) -> &str {
        RETRIEVAL_TOOL_DESCRIPTION
    }

    fn args(&self) -> &[ToolArg] {
        &self.args
    }

    async fn call(&self, args: &str) -> Result<Value, ToolError> {
        let params: Params = serde_json::from_str(args)?;
        let passages = self.invoke(&params.query).await?;
        Ok(serde_json::to_value(passages)?)
    }

    fn output_schema(&self) -> Option<Value> {
        Some(schema_value::<Vec<Passage>>())
    }
}
