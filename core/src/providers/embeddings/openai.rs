use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, error, instrument};

use crate::config::{api_key_from_env, ConfigError};
use crate::embeddings::{model::EmbeddingModel, EmbedderError};

const API_KEY_ENV_VAR: &str = "DOCCHAT_OPENAI_API_KEY";
const URL: &str = "https://api.openai.com/v1/embeddings";
const DEFAULT_MODEL: &str = "text-embedding-3-small";
const DEFAULT_DIMENSIONS: usize = 1536;

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
struct ModelConfig {
    api_key_var: Option<String>,
    api_url: Option<String>,
    model: Option<String>,
    dimensions: Option<usize>,
}

pub struct OpenAIEmbeddingModel {
    api_url: String,
    api_key: String,
    model: String,
    dimensions: usize,
    client: Client,
}

impl OpenAIEmbeddingModel {
    #[instrument]
    pub fn new(json_config: Option<&str>) -> Result<Self, ConfigError> {
        let config = match json_config {
            Some(json) => serde_json::from_str::<ModelConfig>(json).map_err(|e| {
                error!(error = %e, "Failed to deserialize json config");
                ConfigError::from(e)
            })?,
            None => ModelConfig::default(),
        };
        let dimensions = config.dimensions.unwrap_or(DEFAULT_DIMENSIONS);
        if dimensions == 0 {
            return Err(ConfigError::Invalid(
                "embedding dimensions must be at least 1".to_string(),
            ));
        }
        let api_key = api_key_from_env(
            config.api_key_var.as_deref().unwrap_or(API_KEY_ENV_VAR),
        )?;
        Ok(Self {
            api_url: config.api_url.unwrap_or_else(|| URL.to_string()),
            api_key,
            model: config.model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            dimensions,
            client: Client::new(),
        })
    }
}

#[derive(Deserialize)]
struct OpenAIEmbeddingResponse {
    pub data: Vec<OpenAIEmbeddingData>,
}

#[derive(Deserialize)]
struct OpenAIEmbeddingData {
    pub embedding: Vec<f64>,
}

fn parse_response(body: &str) -> Result<Vec<f64>, EmbedderError> {
    let response = serde_json::from_str::<OpenAIEmbeddingResponse>(body)
        .map_err(|e| EmbedderError::Parse(e.to_string()))?;
    response
        .data
        .into_iter()
        .next()
        .map(|d| d.embedding)
        .ok_or_else(|| EmbedderError::Parse("response contained no embeddings".to_string()))
}

#[async_trait]
impl EmbeddingModel for OpenAIEmbeddingModel {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    #[instrument(skip(self, data), fields(model = %self.model, len = data.len()))]
    async fn embed(&self, data: &str) -> Result<Vec<f64>, EmbedderError> {
        let request_body = json!({
            "input": data,
            "model": self.model,
            "dimensions": self.dimensions,
        });
        let response = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request_body)
            .send()
            .await
            .map_err(|e| EmbedderError::Request(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| EmbedderError::Request(e.to_string()))?;
        if !status.is_success() {
            error!(%status, error = %body, "Embedding request rejected");
            return Err(EmbedderError::from_status(status.as_u16(), body));
        }
        debug!(%status, "Received embedding");
        parse_response(&body)
    }
}
