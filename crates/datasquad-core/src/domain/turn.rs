//! Conversation turns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::context::estimate_tokens;
use crate::gate::ValidationVerdict;

/// Who authored a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    Architect,
    CloudArchitect,
    Validator,
}

impl std::fmt::Display for TurnRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TurnRole::Architect => "architect",
            TurnRole::CloudArchitect => "cloud_architect",
            TurnRole::Validator => "validator",
        };
        write!(f, "{s}")
    }
}

/// One entry in a request's conversation history.
///
/// Fields are private: a turn is immutable once constructed, so whatever the
/// `ContextWindow` holds is exactly what was appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    id: Uuid,
    role: TurnRole,
    content: String,
    token_count: u64,
    timestamp: DateTime<Utc>,
}

impl Turn {
    pub fn new(role: TurnRole, content: impl Into<String>, token_count: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content: content.into(),
            token_count,
            timestamp: Utc::now(),
        }
    }

    /// Build a turn whose token count is estimated from its content.
    pub fn estimated(role: TurnRole, content: impl Into<String>) -> Self {
        let content = content.into();
        let tokens = estimate_tokens(&content);
        Self::new(role, content, tokens)
    }

    /// Validator feedback turn carrying a rejection verdict.
    pub fn feedback(verdict: &ValidationVerdict) -> Self {
        Self::estimated(TurnRole::Validator, verdict.feedback_text())
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn role(&self) -> TurnRole {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn token_count(&self) -> u64 {
        self.token_count
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}
