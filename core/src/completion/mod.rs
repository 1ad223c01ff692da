pub mod client;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

use crate::tools::{ToolCall, ToolResponse, ToolSet};

pub use client::{
    ChatError, ChatOutcome, Client, PromptBuilder, StepContext, ToolInvocationRecord,
};

/// Message that'll be sent in Completions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    /// System prompt
    Preamble(String),
    /// Message sent by the user
    User { content: String },
    /// Response from the assistant, optionally requesting a tool call
    Assistant {
        content: String,
        tool_calls: Option<Vec<ToolCall>>,
    },
    /// Result of a tool call, answering the assistant message before it
    Tool(ToolResponse),
}

impl Message {
    #[must_use]
    pub fn role(&self) -> &'static str {
        match self {
            Self::Preamble(_) => "system",
            Self::User { .. } => "user",
            Self::Assistant { .. } => "assistant",
            Self::Tool(_) => "tool",
        }
    }
}

/// An append-only conversation history.
///
/// Messages can be added but never edited or removed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    #[must_use]
    pub fn new(preamble: impl Into<String>) -> Self {
        let preamble = preamble.into();
        let mut messages = Vec::new();
        if !preamble.is_empty() {
            messages.push(Message::Preamble(preamble));
        }
        Self { messages }
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    #[must_use]
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }
}

/// What the model produced for one request.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelTurn {
    /// A final answer for the user.
    Answer(String),
    /// A request to run a tool, with any text emitted before it.
    ToolCall { call: ToolCall, content: String },
}

/// Progress of a chat turn, streamed to the caller as it happens.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    TextDelta(String),
    ToolCall {
        step: usize,
        name: String,
        arguments: String,
    },
    ToolResult {
        step: usize,
        name: String,
        error: Option<String>,
    },
    Done {
        answer: String,
    },
    StepLimitReached {
        steps: usize,
    },
}

impl ChatEvent {
    /// Status line to show while a tool runs, e.g. `calling tool: getInformation`.
    #[must_use]
    pub fn indicator(&self) -> Option<String> {
        match self {
            Self::ToolCall { name, .. } => Some(format!("calling tool: {name}")),
            _ => None,
        }
    }
}

/// Where a turn's [`ChatEvent`]s go.
///
/// A sink without a receiver swallows events. Once a receiver has been
/// attached, dropping it cancels the turn.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::Sender<ChatEvent>>,
}

impl EventSink {
    #[must_use]
    pub fn new(tx: mpsc::Sender<ChatEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    #[must_use]
    pub fn disabled() -> Self {
        Self::default()
    }

    pub async fn emit(&self, event: ChatEvent) -> Result<(), CompletionError> {
        let Some(tx) = &self.tx else {
            return Ok(());
        };
        tx.send(event).await.map_err(|_| {
            debug!("Event receiver dropped");
            CompletionError::Cancelled
        })
    }
}

#[derive(Debug, Clone, Error)]
pub enum CompletionError {
    #[error("Provider error -> HTTP Status {0}: {1}")]
    ProviderError(u16, String),
    #[error("RequestError: {0}")]
    RequestError(String),
    #[error("ParseError: {0}")]
    ParseError(String),
    #[error("Model call timed out after {0:?}")]
    Timeout(Duration),
    #[error("Turn cancelled by the caller")]
    Cancelled,
}

impl CompletionError {
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::ProviderError(status, _) => *status == 429 || *status >= 500,
            Self::RequestError(_) | Self::Timeout(_) => true,
            Self::ParseError(_) | Self::Cancelled => false,
        }
    }
}

#[async_trait]
pub trait CompletionModel: Send + Sync {
    /// Send the conversation so far to the model and return its next turn.
    ///
    /// Text deltas are forwarded to `events` as they arrive.
    async fn complete(
        &self,
        history: &[Message],
        tools: Option<&ToolSet>,
        events: &EventSink,
    ) -> Result<ModelTurn, CompletionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversation_is_append_only_and_skips_empty_preamble() {
        let mut conversation = Conversation::new("");
        assert!(conversation.is_empty());
        conversation.push(Message::User {
            content: "hi".into(),
        });
        assert_eq!(conversation.len(), 1);
        assert_eq!(conversation.last().map(Message::role), Some("user"));

        let conversation = Conversation::new("be brief");
        assert_eq!(
            conversation.messages(),
            &[Message::Preamble("be brief".into())]
        );
    }

    #[test]
    fn indicator_only_for_tool_calls() {
        let event = ChatEvent::ToolCall {
            step: 1,
            name: "getInformation".into(),
            arguments: "{}".into(),
        };
        assert_eq!(
            event.indicator().as_deref(),
            Some("calling tool: getInformation")
        );
        assert_eq!(ChatEvent::TextDelta("x".into()).indicator(), None);
    }

    #[tokio::test]
    async fn sink_cancels_when_receiver_dropped() {
        assert!(EventSink::disabled()
            .emit(ChatEvent::TextDelta("x".into()))
            .await
            .is_ok());

        let (tx, rx) = mpsc::channel(1);
        let sink = EventSink::new(tx);
        drop(rx);
        assert!(matches!(
            sink.emit(ChatEvent::TextDelta("x".into())).await,
            Err(CompletionError::Cancelled)
        ));
    }

    #[test]
    fn transient_completion_errors() {
        assert!(CompletionError::ProviderError(503, String::new()).is_transient());
        assert!(CompletionError::ProviderError(429, String::new()).is_transient());
        assert!(!CompletionError::ProviderError(400, String::new()).is_transient());
        assert!(!CompletionError::Cancelled.is_transient());
    }
}
