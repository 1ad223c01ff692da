//! Deterministic stand-ins for the network-backed models.

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use serde_json::json;
use sha2::{Digest, Sha256};

use crate::{
    completion::{ChatEvent, CompletionError, CompletionModel, EventSink, Message, ModelTurn},
    embeddings::{model::EmbeddingModel, EmbedderError},
    tools::{ToolCall, ToolSet, RETRIEVAL_TOOL_NAME},
};

const FAKE_DIMENSIONS: usize = 256;

/// Bag-of-words embedder: every lowercase word is hashed into one of
/// `FAKE_DIMENSIONS` buckets, so texts sharing words score higher.
pub(crate) struct FakeEmbedder {
    delay: Option<Duration>,
    wrong_dimensions: bool,
    failures: Mutex<VecDeque<EmbedderError>>,
    calls: AtomicUsize,
}

impl FakeEmbedder {
    pub fn new() -> Self {
        Self {
            delay: None,
            wrong_dimensions: false,
            failures: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_wrong_dimensions(mut self) -> Self {
        self.wrong_dimensions = true;
        self
    }

    /// Fail the next calls with `errors`, in order, then behave normally.
    pub fn failing_with(self, errors: Vec<EmbedderError>) -> Self {
        *self.failures.lock().unwrap() = errors.into();
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn bucket(word: &str) -> usize {
    let digest = Sha256::digest(word.as_bytes());
    usize::from(u16::from_be_bytes([digest[0], digest[1]])) % FAKE_DIMENSIONS
}

#[async_trait]
impl EmbeddingModel for FakeEmbedder {
    fn dimensions(&self) -> usize {
        FAKE_DIMENSIONS
    }

    async fn embed(&self, data: &str) -> Result<Vec<f64>, EmbedderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let failure = self.failures.lock().unwrap().pop_front();
        if let Some(e) = failure {
            return Err(e);
        }
        let mut vector = vec![0.0; FAKE_DIMENSIONS];
        for word in data
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            vector[bucket(&word.to_lowercase())] += 1.0;
        }
        if vector.iter().all(|v| *v == 0.0) {
            vector[0] = 1.0;
        }
        if self.wrong_dimensions {
            vector.pop();
        }
        Ok(vector)
    }
}

type Script = dyn Fn(usize, &[Message]) -> Result<ModelTurn, CompletionError> + Send + Sync;

/// Completion model driven by a closure of (call index, history).
///
/// Answers are streamed to the event sink as a single text delta.
pub(crate) struct FnModel {
    script: Box<Script>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl FnModel {
    pub fn new<F>(script: F) -> Self
    where
        F: Fn(usize, &[Message]) -> Result<ModelTurn, CompletionError> + Send + Sync + 'static,
    {
        Self {
            script: Box::new(script),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionModel for FnModel {
    async fn complete(
        &self,
        history: &[Message],
        _tools: Option<&ToolSet>,
        events: &EventSink,
    ) -> Result<ModelTurn, CompletionError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let turn = (self.script)(call, history)?;
        if let ModelTurn::Answer(text) = &turn {
            if !text.is_empty() {
                events.emit(ChatEvent::TextDelta(text.clone())).await?;
            }
        }
        Ok(turn)
    }
}

/// A `getInformation` call for `query`.
pub(crate) fn tool_call(id: &str, query: &str) -> ModelTurn {
    ModelTurn::ToolCall {
        call: ToolCall {
            id: id.to_string(),
            name: RETRIEVAL_TOOL_NAME.to_string(),
            arguments: json!({ "query": query }).to_string(),
        },
        content: String::new(),
    }
}
