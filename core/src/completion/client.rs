use std::{sync::Arc, time::Duration};

use serde::Deserialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use super::{
    ChatEvent, CompletionError, CompletionModel, Conversation, EventSink, Message, ModelTurn,
};
use crate::{
    config::{Config, DEFAULT_MAX_STEPS, DEFAULT_MODEL_TIMEOUT_SECS},
    tools::{Passage, ToolCall, ToolResponse, ToolSet, ToolSetError},
    vector_store::ChunkId,
};


#[derive(Debug, Error)]
pub enum ChatError {
    #[error(transparent)]
    Completion(CompletionError),
    #[error("Chat turn cancelled")]
    Cancelled,
    #[error("Prompt must not be empty")]
    EmptyPrompt,
}

impl From<CompletionError> for ChatError {
    fn from(e: CompletionError) -> Self {
        match e {
            CompletionError::Cancelled => Self::Cancelled,
            other => Self::Completion(other),
        }
    }
}

/// One tool call made during a chat turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocationRecord {
    /// 1-based step the call was made in.
    pub step: usize,
    pub tool: String,
    pub query: Option<String>,
    /// Chunks the tool returned, empty for non-retrieval tools or failures.
    pub chunk_ids: Vec<ChunkId>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatOutcome {
    Answer {
        text: String,
        invocations: Vec<ToolInvocationRecord>,
    },
    /// The model kept asking for tools after `steps` calls had run.
    StepLimitExceeded {
        partial: String,
        steps: usize,
        invocations: Vec<ToolInvocationRecord>,
    },
}

impl ChatOutcome {
    /// The answer text, or whatever partial text the model produced.
    #[must_use]
    pub fn text(&self) -> &str {
        match self {
            Self::Answer { text, .. } => text,
            Self::StepLimitExceeded { partial, .. } => partial,
        }
    }

    #[must_use]
    pub fn invocations(&self) -> &[ToolInvocationRecord] {
        match self {
            Self::Answer { invocations, .. } | Self::StepLimitExceeded { invocations, .. } => {
                invocations
            }
        }
    }
}

/// Per-turn step accounting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepContext {
    pub step: usize,
    pub max_steps: usize,
    pub invocations: Vec<ToolInvocationRecord>,
    pub partial: String,
}

impl StepContext {
    #[must_use]
    pub fn new(max_steps: usize) -> Self {
        Self {
            max_steps,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn exhausted(&self) -> bool {
        self.step >= self.max_steps
    }

    fn record_text(&mut self, content: &str) {
        if content.trim().is_empty() {
            return;
        }
        if !self.partial.is_empty() {
            self.partial.push('\n');
        }
        self.partial.push_str(content);
    }
}

enum LoopState {
    AwaitingModel,
    ToolRequested { call: ToolCall, content: String },
    ToolExecuting(ToolCall),
    Done(String),
    /// Carries the text of the dropped tool call turn.
    StepLimitExceeded(String),
}

/// Runs chat turns against a [`CompletionModel`] with a fixed tool set.
pub struct Client<M: ?Sized> {
    completion_model: Arc<M>,
    preamble: String,
    tools: Arc<ToolSet>,
    max_steps: usize,
    timeout: Duration,
}

impl<M: CompletionModel + ?Sized> Client<M> {
    pub fn new(completion_model: Arc<M>, preamble: impl Into<String>, tools: ToolSet) -> Self {
        Self {
            completion_model,
            preamble: preamble.into(),
            tools: Arc::new(tools),
            max_steps: DEFAULT_MAX_STEPS,
            timeout: Duration::from_secs(DEFAULT_MODEL_TIMEOUT_SECS),
        }
    }

    pub fn from_config(
        completion_model: Arc<M>,
        preamble: impl Into<String>,
        tools: ToolSet,
        config: &Config,
    ) -> Self {
        Self::new(completion_model, preamble, tools)
            .with_max_steps(config.max_steps)
            .with_timeout(config.model_timeout())
    }

    #[must_use]
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn tools(&self) -> &ToolSet {
        &self.tools
    }

    /// Start a conversation seeded with the client's preamble.
    #[must_use]
    pub fn conversation(&self) -> Conversation {
        Conversation::new(self.preamble.clone())
    }

    /// Creates a `PromptBuilder` for one turn of `conversation`.
    pub fn prompt<'a>(
        &'a self,
        conversation: &'a mut Conversation,
        prompt: impl Into<String>,
    ) -> PromptBuilder<'a, M> {
        PromptBuilder {
            client: self,
            conversation,
            prompt: prompt.into(),
            max_steps: self.max_steps,
            with_tools: true,
            events: EventSink::disabled(),
        }
    }

    async fn call_model(
        &self,
        history: &[Message],
        tools: Option<&ToolSet>,
        events: &EventSink,
    ) -> Result<ModelTurn, CompletionError> {
        tokio::time::timeout(
            self.timeout,
            self.completion_model.complete(history, tools, events),
        )
        .await
        .map_err(|_| {
            warn!(timeout = ?self.timeout, "Model call timed out");
            CompletionError::Timeout(self.timeout)
        })?
    }
}

pub struct PromptBuilder<'a, M: ?Sized> {
    client: &'a Client<M>,
    conversation: &'a mut Conversation,
    prompt: String,
    max_steps: usize,
    with_tools: bool,
    events: EventSink,
}

impl<M: CompletionModel + ?Sized> PromptBuilder<'_, M> {
    /// Tool calls allowed in this turn, the client's limit by default
    #[must_use]
    pub fn max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Whether to send any tool definitions with the prompt, `true` by default
    #[must_use]
    pub fn with_tools(mut self, with_tools: bool) -> Self {
        self.with_tools = with_tools;
        self
    }

    /// Stream [`ChatEvent`]s to `tx`. Dropping the receiver cancels the turn.
    #[must_use]
    pub fn stream_to(mut self, tx: mpsc::Sender<ChatEvent>) -> Self {
        self.events = EventSink::new(tx);
        self
    }

    /// Run the turn until the model answers or the step limit is hit.
    #[instrument(skip(self), fields(max_steps = self.max_steps))]
    pub async fn send(self) -> Result<ChatOutcome, ChatError> {
        let prompt = self.prompt.trim();
        if prompt.is_empty() {
            return Err(ChatError::EmptyPrompt);
        }
        self.conversation.push(Message::User {
            content: prompt.to_string(),
        });

        let tools = if self.with_tools && !self.client.tools.is_empty() {
            Some(self.client.tools.as_ref())
        } else {
            None
        };
        let mut ctx = StepContext::new(self.max_steps);
        let mut state = LoopState::AwaitingModel;

        loop {
            state = match state {
                LoopState::AwaitingModel => {
                    let turn = self
                        .client
                        .call_model(self.conversation.messages(), tools, &self.events)
                        .await?;
                    match turn {
                        ModelTurn::Answer(text) => LoopState::Done(text),
                        ModelTurn::ToolCall { call, content } => {
                            LoopState::ToolRequested { call, content }
                        }
                    }
                }
                LoopState::ToolRequested { call, content } => {
                    ctx.record_text(&content);
                    if ctx.exhausted() {
                        warn!(tool = %call.name, steps = ctx.step, "Step limit reached, tool call dropped");
                        LoopState::StepLimitExceeded(content)
                    } else {
                        self.conversation.push(Message::Assistant {
                            content,
                            tool_calls: Some(vec![call.clone()]),
                        });
                        LoopState::ToolExecuting(call)
                    }
                }
                LoopState::ToolExecuting(call) => {
                    ctx.step += 1;
                    let announced = self
                        .events
                        .emit(ChatEvent::ToolCall {
                            step: ctx.step,
                            name: call.name.clone(),
                            arguments: call.arguments.clone(),
                        })
                        .await;
                    if let Err(e) = announced {
                        // every assistant tool call needs a reply for the history to stay valid
                        self.conversation
                            .push(Message::Tool(ToolResponse::error(&call, "cancelled")));
                        return Err(e.into());
                    }
                    info!(step = ctx.step, tool = %call.name, "calling tool");

                    let response = run_tool(tools, &call).await;
                    let record = invocation_record(ctx.step, &call, &response);
                    let error = record.error.clone();
                    ctx.invocations.push(record);
                    self.conversation.push(Message::Tool(response));
                    self.events
                        .emit(ChatEvent::ToolResult {
                            step: ctx.step,
                            name: call.name.clone(),
                            error,
                        })
                        .await?;
                    LoopState::AwaitingModel
                }
                LoopState::Done(text) => {
                    self.conversation.push(Message::Assistant {
                        content: text.clone(),
                        tool_calls: None,
                    });
                    if self
                        .events
                        .emit(ChatEvent::Done {
                            answer: text.clone(),
                        })
                        .await
                        .is_err()
                    {
                        debug!("Receiver gone before Done event");
                    }
                    info!(steps = ctx.step, "Chat turn finished");
                    return Ok(ChatOutcome::Answer {
                        text,
                        invocations: ctx.invocations,
                    });
                }
                LoopState::StepLimitExceeded(unrecorded) => {
                    if !unrecorded.trim().is_empty() {
                        self.conversation.push(Message::Assistant {
                            content: unrecorded,
                            tool_calls: None,
                        });
                    }
                    if self
                        .events
                        .emit(ChatEvent::StepLimitReached { steps: ctx.step })
                        .await
                        .is_err()
                    {
                        debug!("Receiver gone before StepLimitReached event");
                    }
                    return Ok(ChatOutcome::StepLimitExceeded {
                        partial: ctx.partial,
                        steps: ctx.step,
                        invocations: ctx.invocations,
                    });
                }
            };
        }
    }
}

/// Run `call`, turning any failure into an error response the model can read.
async fn run_tool(tools: Option<&ToolSet>, call: &ToolCall) -> ToolResponse {
    let result = match tools {
        Some(tools) => tools.call(&call.id, &call.name, &call.arguments).await,
        None => Err(ToolSetError::ToolNotFound(call.name.clone())),
    };
    result.unwrap_or_else(|e| {
        warn!(tool = %call.name, error = %e, "Tool call failed");
        ToolResponse::error(call, e.to_string())
    })
}

fn invocation_record(step: usize, call: &ToolCall, response: &ToolResponse) -> ToolInvocationRecord {
    #[derive(Deserialize)]
    struct QueryArgs {
        query: String,
    }

    let query = serde_json::from_str::<QueryArgs>(&call.arguments)
        .ok()
        .map(|a| a.query);
    let error = response
        .content
        .get("error")
        .and_then(|e| e.as_str())
        .map(ToString::to_string);
    let chunk_ids = serde_json::from_value::<Vec<Passage>>(response.content.clone())
        .map(|passages| passages.into_iter().map(|p| p.chunk_id).collect())
        .unwrap_or_default();

    ToolInvocationRecord {
        step,
        tool: call.name.clone(),
        query,
        chunk_ids,
        error,
    }
}
