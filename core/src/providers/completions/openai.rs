use std::collections::BTreeMap;

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, error, info, instrument, warn};

use crate::completion::{
    ChatEvent, CompletionError, CompletionModel, EventSink, Message, ModelTurn,
};
use crate::config::{api_key_from_env, ConfigError};
use crate::tools::{ToolCall, ToolSet};

const API_KEY_ENV_VAR: &str = "DOCCHAT_OPENAI_API_KEY";
const URL: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_TEMP: f64 = 1.0;
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_TOKENS: usize = 2400;

#[derive(Serialize, Deserialize, Debug)]
#[serde(deny_unknown_fields)]
struct ModelConfig {
    api_key_var: Option<String>,
    api_url: Option<String>,
    model: Option<String>,
    temperature: Option<f64>,
    max_tokens: Option<usize>,
}

/// Streaming chat completions against an OpenAI compatible endpoint.
pub struct OpenAICompletionModel {
    api_key: String,
    api_url: String,
    client: reqwest::Client,
    model: String,
    temperature: f64,
    max_tokens: usize,
}

impl OpenAICompletionModel {
    /// Build from an optional JSON config, e.g.
    /// `{"model": "gpt-4o", "api_key_var": "MY_KEY"}`.
    #[instrument]
    pub fn new(json_config: Option<&str>) -> Result<Self, ConfigError> {
        let config = match json_config {
            Some(json) => serde_json::from_str::<ModelConfig>(json).map_err(|e| {
                error!(error = %e, "Failed to deserialize json config");
                ConfigError::from(e)
            })?,
            None => ModelConfig {
                api_key_var: None,
                api_url: None,
                model: None,
                temperature: None,
                max_tokens: None,
            },
        };
        let api_key_var = config
            .api_key_var
            .unwrap_or_else(|| API_KEY_ENV_VAR.to_string());
        let api_key = api_key_from_env(&api_key_var)?;

        Ok(Self {
            api_key,
            api_url: config.api_url.unwrap_or_else(|| URL.to_string()),
            client: reqwest::Client::new(),
            model: config.model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            temperature: config.temperature.unwrap_or(DEFAULT_TEMP),
            max_tokens: config.max_tokens.unwrap_or(DEFAULT_TOKENS),
        })
    }
}

#[derive(Serialize, Debug, PartialEq)]
#[serde(tag = "role", rename_all = "lowercase")]
enum OpenAIMessage<'a> {
    System {
        content: &'a str,
    },
    User {
        content: &'a str,
    },
    Assistant {
        #[serde(skip_serializing_if = "Option::is_none")]
        content: Option<&'a str>,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<OpenAIToolCall<'a>>,
    },
    Tool {
        tool_call_id: &'a str,
        content: String,
    },
}

#[derive(Serialize, Debug, PartialEq)]
struct OpenAIToolCall<'a> {
    id: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    function: OpenAIFunction<'a>,
}

#[derive(Serialize, Debug, PartialEq)]
struct OpenAIFunction<'a> {
    name: &'a str,
    arguments: &'a str,
}

impl<'a> From<&'a Message> for OpenAIMessage<'a> {
    fn from(value: &'a Message) -> Self {
        match value {
            Message::Preamble(s) => Self::System { content: s },
            Message::User { content } => Self::User { content },
            Message::Assistant {
                content,
                tool_calls,
            } => {
                let tool_calls: Vec<_> = tool_calls
                    .iter()
                    .flatten()
                    .map(|tc| OpenAIToolCall {
                        id: &tc.id,
                        kind: "function",
                        function: OpenAIFunction {
                            name: &tc.name,
                            arguments: &tc.arguments,
                        },
                    })
                    .collect();
                let content = if content.is_empty() && !tool_calls.is_empty() {
                    None
                } else {
                    Some(content.as_str())
                };
                Self::Assistant {
                    content,
                    tool_calls,
                }
            }
            Message::Tool(response) => Self::Tool {
                tool_call_id: &response.id,
                content: response.content.to_string(),
            },
        }
    }
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Deserialize, Default)]
struct StreamDelta {
    content: Option<String>,
    tool_calls: Option<Vec<ToolCallDelta>>,
}

#[derive(Deserialize)]
struct ToolCallDelta {
    #[serde(default)]
    index: u64,
    id: Option<String>,
    function: Option<FunctionDelta>,
}

#[derive(Deserialize)]
struct FunctionDelta {
    name: Option<String>,
    arguments: Option<String>,
}

#[derive(Default, Debug)]
struct PartialToolCall {
    id: String,
    name: String,
    arguments: String,
}

/// Accumulates a server-sent-events completion stream.
///
/// Bytes are buffered until a full line is available so multi-byte
/// characters split across network chunks decode correctly.
#[derive(Default)]
struct StreamState {
    buffer: Vec<u8>,
    content: String,
    tool_calls: BTreeMap<u64, PartialToolCall>,
    done: bool,
}

impl StreamState {
    /// Feed raw bytes, returning the text deltas of every completed line.
    fn feed(&mut self, bytes: &[u8]) -> Result<Vec<String>, CompletionError> {
        self.buffer.extend_from_slice(bytes);
        let mut deltas = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(delta) = self.process_line(&line)? {
                deltas.push(delta);
            }
        }
        Ok(deltas)
    }

    /// Process a trailing line that was not newline terminated.
    fn flush(&mut self) -> Result<Option<String>, CompletionError> {
        let line = std::mem::take(&mut self.buffer);
        self.process_line(&line)
    }

    fn process_line(&mut self, line: &[u8]) -> Result<Option<String>, CompletionError> {
        let line = std::str::from_utf8(line)
            .map_err(|e| CompletionError::ParseError(format!("Invalid UTF-8 in stream: {e}")))?
            .trim();
        let Some(data) = line.strip_prefix("data:") else {
            return Ok(None);
        };
        let data = data.trim();
        if data == "[DONE]" {
            self.done = true;
            return Ok(None);
        }

        let chunk: StreamChunk = serde_json::from_str(data).map_err(|e| {
            error!(error = %e, data, "Failed to parse stream chunk");
            CompletionError::ParseError(e.to_string())
        })?;
        let Some(choice) = chunk.choices.into_iter().next() else {
            return Ok(None);
        };

        for tc in choice.delta.tool_calls.unwrap_or_default() {
            let entry = self.tool_calls.entry(tc.index).or_default();
            if let Some(id) = tc.id {
                entry.id.push_str(&id);
            }
            if let Some(function) = tc.function {
                if let Some(name) = function.name {
                    entry.name.push_str(&name);
                }
                if let Some(arguments) = function.arguments {
                    entry.arguments.push_str(&arguments);
                }
            }
        }

        match choice.delta.content {
            Some(text) if !text.is_empty() => {
                self.content.push_str(&text);
                Ok(Some(text))
            }
            _ => Ok(None),
        }
    }

    fn finish(self) -> Result<ModelTurn, CompletionError> {
        let mut calls = self.tool_calls.into_values();
        let Some(first) = calls.next() else {
            return Ok(ModelTurn::Answer(self.content));
        };
        let ignored = calls.count();
        if ignored > 0 {
            warn!(ignored, "Model requested parallel tool calls, keeping the first");
        }
        if first.name.is_empty() {
            return Err(CompletionError::ParseError(
                "Tool call without a function name".to_string(),
            ));
        }
        let arguments = if first.arguments.trim().is_empty() {
            "{}".to_string()
        } else {
            first.arguments
        };
        Ok(ModelTurn::ToolCall {
            call: ToolCall {
                id: first.id,
                name: first.name,
                arguments,
            },
            content: self.content,
        })
    }
}

#[async_trait]
impl CompletionModel for OpenAICompletionModel {
    #[instrument(
        skip(self, history, tools, events),
        fields(
            history_len = history.len(),
            tools = tools.is_some())
    )]
    async fn complete(
        &self,
        history: &[Message],
        tools: Option<&ToolSet>,
        events: &EventSink,
    ) -> Result<ModelTurn, CompletionError> {
        let messages: Vec<OpenAIMessage> = history.iter().map(OpenAIMessage::from).collect();

        let mut request_body = json!({
            "model": self.model,
            "messages": messages,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
            "stream": true,
        });

        if let Some(tools) = tools {
            let tools_serialized = tools.definitions();
            if let Some(obj) = request_body.as_object_mut() {
                info!(
                    tool_count = tools_serialized.len(),
                    "Including tools in request"
                );
                obj.insert(
                    "tools".to_string(),
                    serde_json::Value::Array(tools_serialized),
                );
                obj.insert("parallel_tool_calls".to_string(), json!(false));
            }
        }

        debug!(request_body = ?request_body, "Sending request to OpenAI");

        let response = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request_body)
            .send()
            .await
            .map_err(|e| {
                error!(error = ?e, "Request failed");
                CompletionError::RequestError(e.to_string())
            })?;

        let status = response.status();
        debug!(%status, "Received API response");
        if !status.is_success() {
            let error_msg = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error (failed to read response body)".to_string());
            error!(
                status = %status,
                error = %error_msg,
                "API returned error response"
            );
            return Err(CompletionError::ProviderError(status.into(), error_msg));
        }

        let mut stream = response.bytes_stream();
        let mut state = StreamState::default();
        while let Some(chunk) = stream.next().await {
            let bytes = chunk.map_err(|e| {
                error!(error = ?e, "Stream interrupted");
                CompletionError::RequestError(e.to_string())
            })?;
            for delta in state.feed(&bytes)? {
                events.emit(ChatEvent::TextDelta(delta)).await?;
            }
            if state.done {
                break;
            }
        }
        if let Some(delta) = state.flush()? {
            events.emit(ChatEvent::TextDelta(delta)).await?;
        }

        let turn = state.finish()?;
        if let ModelTurn::ToolCall { call, .. } = &turn {
            info!(tool = %call.name, "Model requested a tool call");
        }
        Ok(turn)
    }
}
