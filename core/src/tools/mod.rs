pub mod retrieval;

use async_trait::async_trait;
use schemars::{gen::SchemaSettings, JsonSchema};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::{embeddings::EmbedderError, vector_store::VectorStoreError};

pub use retrieval::{Passage, RetrievalTool, RETRIEVAL_TOOL_NAME};

/// A capability the model can call by name with JSON arguments.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn args(&self) -> &[ToolArg];

    async fn call(&self, args: &str) -> Result<Value, ToolError>;
    fn output_schema(&self) -> Option<Value> {
        None
    }

    /// Function definition in the chat-completions `tools` format.
    fn default_serializer(&self) -> Value {
        let parameters = build_parameters_schema(self.args());
        json!({
            "type": "function",
            "function": {
                "name": self.name(),
                "strict": true,
                "description": self.description(),
                "parameters": parameters
            }
        })
    }
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
    #[error("Json Error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("Embedding the query failed: {0}")]
    Embedding(#[from] EmbedderError),
    #[error("Vector store lookup failed: {0}")]
    Store(#[from] VectorStoreError),
}

#[derive(Debug, Error)]
pub enum ToolSetError {
    #[error("Failed to find tool `{0}`")]
    ToolNotFound(String),
    #[error("Tool error: {0}")]
    ToolError(#[from] ToolError),
}

#[derive(Default)]
pub struct ToolSet(Vec<Box<dyn Tool>>);

impl ToolSet {
    #[must_use]
    pub fn new(tools: Vec<Box<dyn Tool>>) -> Self {
        Self(tools)
    }

    #[must_use]
    pub fn with_tool(mut self, tool: impl Tool + 'static) -> Self {
        self.0.push(Box::new(tool));
        self
    }

    pub fn find_tool(&self, name: &str) -> Result<&dyn Tool, ToolSetError> {
        self.0
            .iter()
            .find(|t| t.name() == name)
            .map(AsRef::as_ref)
            .ok_or_else(|| ToolSetError::ToolNotFound(name.to_string()))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|t| t.name())
    }

    /// Serialized definitions of every tool, ready for a completion request.
    #[must_use]
    pub fn definitions(&self) -> Vec<Value> {
        self.0.iter().map(|t| t.default_serializer()).collect()
    }

    #[instrument(skip(self, args))]
    pub async fn call(
        &self,
        id: &str,
        name: &str,
        args: &str,
    ) -> Result<ToolResponse, ToolSetError> {
        let tool = self.find_tool(name)?;
        let v = tool.call(args).await.map_err(ToolSetError::from)?;
        debug!(tool = name, "Tool call succeeded");
        Ok(ToolResponse {
            id: id.to_owned(),
            name: name.to_owned(),
            content: v,
        })
    }
}

#[allow(unused)]
pub struct ToolArg {
    name: String,
    description: String,
    schema: Value,
}

impl ToolArg {
    pub fn new<T: JsonSchema + Serialize>(name: &str, description: &str) -> Self {
        let mut schema_value = schema_value::<T>();
        if let Some(obj) = schema_value.as_object_mut() {
            obj.insert("description".to_string(), json!(description));
        }

        ToolArg {
            name: name.to_string(),
            description: description.to_string(),
            schema: schema_value,
        }
    }
}

/// Inlined JSON schema for `T`, stripped of the keys completion APIs reject.
pub(crate) fn schema_value<T: JsonSchema>() -> Value {
    let settings = SchemaSettings::default().with(|s| {
        s.inline_subschemas = true;
    });
    let generator = settings.into_generator();
    let schema = generator.into_root_schema_for::<T>();
    let mut schema_value = serde_json::to_value(&schema).unwrap_or_else(|_| json!({}));

    if let Some(obj) = schema_value.as_object_mut() {
        obj.remove("$schema");
        obj.remove("format");
        obj.remove("title");
    }
    process_json_value(&mut schema_value);
    schema_value
}

fn process_json_value(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::Object(obj) => {
            let fields_to_remove = ["$schema", "format", "title", "minimum"];
            fields_to_remove.iter().for_each(|&f| {
                if obj.get(f).is_some_and(|v| v.is_string() || v.is_number()) {
                    obj.remove(f);
                }
            });
            if let Some(v) = obj.get("oneOf").cloned() {
                obj.remove("oneOf");
                obj.insert("anyOf".to_string(), v);
            };

            if obj.contains_key("properties") {
                obj.insert("additionalProperties".to_string(), json!(false));
            }
            for (_, v) in obj.iter_mut() {
                process_json_value(v);
            }
        }
        serde_json::Value::Array(arr) => {
            for elem in arr.iter_mut() {
                process_json_value(elem);
            }
        }
        _ => {}
    }
}

/// Represents a tool call requested by the assistant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

/// Represents the output of a tool execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResponse {
    pub id: String,
    pub name: String,
    pub content: serde_json::Value,
}

impl ToolResponse {
    /// A response telling the model the call failed.
    pub fn error(call: &ToolCall, message: impl Into<String>) -> Self {
        Self {
            id: call.id.clone(),
            name: call.name.clone(),
            content: json!({ "error": message.into() }),
        }
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        self.content.get("error").is_some()
    }
}

pub fn build_parameters_schema(args: &[ToolArg]) -> Value {
    let mut properties = serde_json::Map::new();
    let mut required = Vec::new();

    for arg in args {
        let mut schema = arg.schema.clone();
        if let Some(obj) = schema.as_object_mut() {
            obj.remove("minimum");
        }
        properties.insert(arg.name.clone(), schema.clone());
        required.push(json!(arg.name));
    }

    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false
    })
}
