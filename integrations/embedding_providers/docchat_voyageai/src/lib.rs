use async_trait::async_trait;
use docchat::config::{api_key_from_env, ConfigError};
use docchat::embeddings::{model::EmbeddingModel, EmbedderError};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, instrument};

const DEFAULT_API_KEY_VAR_NAME: &str = "VOYAGEAI_API_KEY";
const DEFAULT_URL: &str = "https://api.voyageai.com/v1/embeddings";

#[derive(Serialize, Deserialize, Debug)]
#[serde(deny_unknown_fields)]
struct ModelConfig {
    api_key_var: Option<String>,
    api_url: Option<String>,
    model: String,
    dimensions: Option<usize>,
}

/// Default output size of the models that do not need `dimensions` set.
fn known_dimensions(model: &str) -> Option<usize> {
    match model {
        "voyage-3-lite" => Some(512),
        "voyage-3" | "voyage-3-large" | "voyage-code-3" | "voyage-large-2" | "voyage-2" => {
            Some(1024)
        }
        _ => None,
    }
}

/// Implementation of docchat's `EmbeddingModel` trait for [Voyage AI](https://voyageai.com).
///
/// # Supported Configuration
///
/// The model accepts the following configuration parameters:
///
/// - `model`: String identifier for the model to use
/// - `dimensions`(optional): Vector length, required unless `model` is a stock Voyage model
/// - `api_key_var`(optional): Environment variable name containing the API key
/// - `api_url`(optional): Custom API endpoint URL
///
/// # Examples
///
/// ```rust,no_run
/// use docchat_voyageai::VoyageAIEmbedding;
///
/// let embedder = VoyageAIEmbedding::new(Some(r#"{
///   "model": "voyage-3-lite",
///   "api_key_var": "ENV_VAR"
/// }"#)).unwrap();
/// ```
/// # Error Handling
///
/// - Invalid config json and unknown fields are rejected with `ConfigError::Json`
/// - A missing API key env var is a `ConfigError::MissingEnvVar`
pub struct VoyageAIEmbedding {
    api_key: String,
    api_url: String,
    model: String,
    dimensions: usize,
    client: Client,
}

impl VoyageAIEmbedding {
    /// Creates a new `VoyageAIEmbedding` from a JSON configuration string.
    #[instrument]
    pub fn new(json_config: Option<&str>) -> Result<Self, ConfigError> {
        let Some(json) = json_config else {
            return Err(ConfigError::Invalid(
                "VoyageAIEmbedding expects a config json with atleast the required model field"
                    .to_string(),
            ));
        };
        let config: ModelConfig = serde_json::from_str(json).map_err(|e| {
            error!(error = %e, "Failed to deserialize json config");
            ConfigError::from(e)
        })?;
        let dimensions = config
            .dimensions
            .or_else(|| known_dimensions(&config.model))
            .filter(|d| *d > 0)
            .ok_or_else(|| {
                ConfigError::Invalid(format!(
                    "`dimensions` must be set for model `{}`",
                    config.model
                ))
            })?;
        let api_key = api_key_from_env(
            config
                .api_key_var
                .as_deref()
                .unwrap_or(DEFAULT_API_KEY_VAR_NAME),
        )?;
        Ok(Self {
            api_key,
            api_url: config.api_url.unwrap_or_else(|| DEFAULT_URL.to_string()),
            model: config.model,
            dimensions,
            client: Client::new(),
        })
    }
}

#[derive(Deserialize)]
struct VoyageAIEmbeddingResponse {
    pub data: Vec<VoyageAIEmbeddingData>,
}

#[derive(Deserialize)]
struct VoyageAIEmbeddingData {
    pub embedding: Vec<f64>,
}

fn parse_response(body: &str) -> Result<Vec<f64>, EmbedderError> {
    serde_json::from_str::<VoyageAIEmbeddingResponse>(body)
        .map_err(|e| EmbedderError::Parse(e.to_string()))?
        .data
        .into_iter()
        .next()
        .map(|d| d.embedding)
        .ok_or_else(|| EmbedderError::Parse("response contained no embeddings".to_string()))
}

#[async_trait]
impl EmbeddingModel for VoyageAIEmbedding {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    #[instrument(skip(self, data), fields(model = %self.model))]
    async fn embed(&self, data: &str) -> Result<Vec<f64>, EmbedderError> {
        let mut request_body = json!({
                "input": data,
                "model": self.model,
        });
        if known_dimensions(&self.model) != Some(self.dimensions) {
            request_body["output_dimension"] = json!(self.dimensions);
        }
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
        if status.is_success() {
            parse_response(&body)
        } else {
            error!(%status, error = %body, "Voyage AI rejected embedding request");
            Err(EmbedderError::from_status(status.as_u16(), body))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_is_required_and_strict() {
        assert!(matches!(
            VoyageAIEmbedding::new(None),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            VoyageAIEmbedding::new(Some(r#"{"model": "voyage-3", "colour": "red"}"#)),
            Err(ConfigError::Json(_))
        ));
        assert!(matches!(
            VoyageAIEmbedding::new(Some(r#"{"model": "voyage-next"}"#)),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            VoyageAIEmbedding::new(Some(
                r#"{"model": "voyage-3", "api_key_var": "DOCCHAT_TEST_UNSET_VOYAGE_KEY"}"#
            )),
            Err(ConfigError::MissingEnvVar(_))
        ));
    }

    #[test]
    fn parses_embedding_response() {
        let body = r#"{"object":"list","data":[{"object":"embedding","embedding":[0.1,0.2,0.3],"index":0}],"model":"voyage-3-lite","usage":{"total_tokens":1}}"#;
        assert_eq!(parse_response(body).unwrap(), vec![0.1, 0.2, 0.3]);
        assert!(matches!(
            parse_response("not json"),
            Err(EmbedderError::Parse(_))
        ));
    }

    #[tokio::test]
    #[ignore]
    async fn simple_voyage_embed_request() {
        let model = VoyageAIEmbedding::new(Some(r#"{"model": "voyage-3-lite"}"#)).unwrap();
        let response = model.embed("test").await.unwrap();
        assert_eq!(response.len(), model.dimensions());
    }
}
