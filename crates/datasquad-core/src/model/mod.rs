//! Model capability interface.
//!
//! [`ModelClient`] is the only seam between the orchestration core and a text
//! generation backend. Agents build a [`ModelRequest`]; backends translate it
//! into their own wire format and return a [`Completion`].
//!
//! - [`retry`]: timeout and bounded exponential backoff around one call

pub mod retry;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::context::estimate_tokens;
use crate::domain::Turn;

/// Backend-agnostic prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelRequest {
    /// Role instructions.
    pub system: String,
    /// Prior turns, oldest first, already trimmed to the per-call budget.
    pub context: Vec<Turn>,
    /// What the model should do now.
    pub task: String,
}

impl ModelRequest {
    /// Tokens this request puts on the wire: context turns plus estimated
    /// system and task text.
    pub fn prompt_tokens(&self) -> u64 {
        let context: u64 = self.context.iter().map(Turn::token_count).sum();
        context + estimate_tokens(&self.system) + estimate_tokens(&self.task)
    }
}

/// Text returned by a backend with its token cost.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    pub text: String,
    pub token_count: u64,
}

impl Completion {
    pub fn new(text: impl Into<String>, token_count: u64) -> Self {
        Self {
            text: text.into(),
            token_count,
        }
    }

    /// Completion whose token count is estimated from the text.
    pub fn estimated(text: impl Into<String>) -> Self {
        let text = text.into();
        let token_count = estimate_tokens(&text);
        Self { text, token_count }
    }
}

/// Backend failure, classified for retry decisions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    #[error("model call timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    #[error("rate limited or quota exhausted: {0}")]
    RateLimited(String),

    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("request rejected by backend: {0}")]
    Rejected(String),

    #[error("malformed backend response: {0}")]
    MalformedResponse(String),
}

impl ModelError {
    /// Whether a retry could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ModelError::Timeout { .. } | ModelError::RateLimited(_) | ModelError::Unavailable(_)
        )
    }
}

/// A text-generation backend.
///
/// Implementations must be cheap to share (`Arc<dyn ModelClient>`) and must
/// not leak their wire format into the request or completion types.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn complete(&self, request: &ModelRequest) -> Result<Completion, ModelError>;

    /// Short backend name for logs.
    fn name(&self) -> &str {
        "model"
    }
}
