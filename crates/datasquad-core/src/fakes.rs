//! In-memory fakes for the model capability (testing only).
//!
//! [`ScriptedModelClient`] replays a fixed sequence of replies and failures
//! and records every request it receives.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::model::{Completion, ModelClient, ModelError, ModelRequest};

/// One scripted backend response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptStep {
    /// Reply with text; token count estimated.
    Reply(String),
    /// Reply with text and an explicit token count.
    ReplyWithTokens(String, u64),
    Fail(ModelError),
    /// Never resolve. Exercises timeouts and cancellation.
    Hang,
}

/// Model client that plays back [`ScriptStep`]s in order.
///
/// When the script runs out, the `fallback` step repeats; without one, the
/// client answers `ModelError::Rejected`.
#[derive(Debug, Default)]
pub struct ScriptedModelClient {
    name: String,
    steps: Mutex<VecDeque<ScriptStep>>,
    fallback: Option<ScriptStep>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedModelClient {
    pub fn new(steps: impl IntoIterator<Item = ScriptStep>) -> Self {
        Self {
            name: "scripted".to_string(),
            steps: Mutex::new(steps.into_iter().collect()),
            ..Self::default()
        }
    }

    /// Reply with each text in turn.
    pub fn replies<S: Into<String>>(texts: impl IntoIterator<Item = S>) -> Self {
        Self::new(texts.into_iter().map(|t| ScriptStep::Reply(t.into())))
    }

    /// Repeat the same step forever.
    pub fn always(step: ScriptStep) -> Self {
        Self::new(Vec::new()).with_fallback(step)
    }

    pub fn with_fallback(mut self, step: ScriptStep) -> Self {
        self.fallback = Some(step);
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Number of `complete` calls received.
    pub fn calls(&self) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// Every request received, in order.
    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn next_step(&self) -> Option<ScriptStep> {
        let mut steps = self.steps.lock().unwrap_or_else(|e| e.into_inner());
        steps.pop_front().or_else(|| self.fallback.clone())
    }
}

#[async_trait]
impl ModelClient for ScriptedModelClient {
    async fn complete(&self, request: &ModelRequest) -> Result<Completion, ModelError> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.clone());

        match self.next_step() {
            Some(ScriptStep::Reply(text)) => Ok(Completion::estimated(text)),
            Some(ScriptStep::ReplyWithTokens(text, tokens)) => Ok(Completion::new(text, tokens)),
            Some(ScriptStep::Fail(err)) => Err(err),
            Some(ScriptStep::Hang) => std::future::pending().await,
            None => Err(ModelError::Rejected("script exhausted".to_string())),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}
