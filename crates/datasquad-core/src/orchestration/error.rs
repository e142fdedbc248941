//! Error types for the orchestration layer.

use crate::agent::AgentRole;
use crate::audit::AuditTrail;
use crate::domain::Artifact;
use crate::gate::{GateError, ValidationVerdict};
use crate::model::ModelError;
use crate::orchestration::outcome::TranslationFailure;

/// Where a request was when it was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStage {
    Generation,
    Translation,
}

impl std::fmt::Display for RequestStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RequestStage::Generation => "generation",
            RequestStage::Translation => "translation",
        };
        write!(f, "{s}")
    }
}

/// Errors produced by the orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum OrchestrationError {
    /// Every attempt was rejected. The last candidate is kept for human review.
    #[error("validation failed after {attempts} attempt(s): {}", last_verdict.message)]
    ValidationExhausted {
        attempts: u32,
        last_verdict: ValidationVerdict,
        last_candidate: Box<Artifact>,
        audit: Box<AuditTrail>,
    },

    /// The model could not be reached. `attempts` counts completed Architect
    /// generations; `calls` counts model calls for the failed one.
    #[error("{role} generation unavailable after {calls} call(s): {reason}")]
    GenerationUnavailable {
        role: AgentRole,
        attempts: u32,
        calls: u32,
        reason: ModelError,
        last_verdict: Option<ValidationVerdict>,
        last_candidate: Option<Box<Artifact>>,
        audit: Box<AuditTrail>,
    },

    /// Refused before an Architect call. Progress made so far is attached.
    #[error("daily token budget exhausted: {used} of {limit} used")]
    BudgetExceeded {
        used: u64,
        limit: u64,
        attempts: u32,
        last_verdict: Option<ValidationVerdict>,
        last_candidate: Option<Box<Artifact>>,
        audit: Box<AuditTrail>,
    },

    /// Every configured target failed. The approved logic is attached.
    #[error("translation failed for every target: {}", join_failures(failures))]
    TranslationFailed {
        failures: Vec<TranslationFailure>,
        logic: Box<Artifact>,
        attempts: u32,
        audit: Box<AuditTrail>,
    },

    #[error("request cancelled during {stage} after {attempts} attempt(s)")]
    Cancelled { stage: RequestStage, attempts: u32 },

    #[error("gate rejected input: {0}")]
    Gate(#[from] GateError),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl OrchestrationError {
    /// Whether resubmitting the same request later could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            OrchestrationError::GenerationUnavailable { reason, .. } => reason.is_transient(),
            OrchestrationError::TranslationFailed { .. } | OrchestrationError::Cancelled { .. } => {
                true
            }
            _ => false,
        }
    }

    /// Architect generations made before the error, where known.
    pub fn attempts(&self) -> Option<u32> {
        match self {
            OrchestrationError::ValidationExhausted { attempts, .. }
            | OrchestrationError::GenerationUnavailable { attempts, .. }
            | OrchestrationError::BudgetExceeded { attempts, .. }
            | OrchestrationError::TranslationFailed { attempts, .. }
            | OrchestrationError::Cancelled { attempts, .. } => Some(*attempts),
            OrchestrationError::Gate(_) | OrchestrationError::InvalidRequest(_) => None,
        }
    }

    /// The request's audit trail, when the error carries one.
    pub fn audit(&self) -> Option<&AuditTrail> {
        match self {
            OrchestrationError::ValidationExhausted { audit, .. }
            | OrchestrationError::GenerationUnavailable { audit, .. }
            | OrchestrationError::BudgetExceeded { audit, .. }
            | OrchestrationError::TranslationFailed { audit, .. } => Some(&**audit),
            _ => None,
        }
    }
}

fn join_failures(failures: &[TranslationFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type for orchestration operations.
pub type OrchestrationResult<T> = std::result::Result<T, OrchestrationError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TargetPlatform;

    #[test]
    fn test_budget_error_is_not_retryable() {
        let err = OrchestrationError::BudgetExceeded {
            used: 10,
            limit: 10,
            attempts: 1,
            last_verdict: None,
            last_candidate: None,
            audit: Box::default(),
        };
        assert!(!err.is_retryable());
        assert_eq!(err.attempts(), Some(1));
        assert_eq!(err.to_string(), "daily token budget exhausted: 10 of 10 used");
    }

    fn unavailable(reason: ModelError) -> OrchestrationError {
        OrchestrationError::GenerationUnavailable {
            role: AgentRole::Architect,
            attempts: 0,
            calls: 1,
            reason,
            last_verdict: None,
            last_candidate: None,
            audit: Box::default(),
        }
    }

    #[test]
    fn test_only_transient_unavailability_is_retryable() {
        assert!(unavailable(ModelError::RateLimited("429".into())).is_retryable());
        assert!(!unavailable(ModelError::Rejected("401 bad key".into())).is_retryable());
        assert!(!unavailable(ModelError::MalformedResponse("no choices".into())).is_retryable());
    }

    #[test]
    fn test_translation_failed_lists_each_target() {
        let err = OrchestrationError::TranslationFailed {
            failures: vec![
                TranslationFailure {
                    target: TargetPlatform::AwsGlue,
                    reason: "quota".to_string(),
                    attempts: 1,
                },
                TranslationFailure {
                    target: TargetPlatform::AzureDatabricks,
                    reason: "down".to_string(),
                    attempts: 1,
                },
            ],
            logic: Box::new(Artifact::pipeline_logic("x", uuid::Uuid::new_v4())),
            attempts: 1,
            audit: Box::default(),
        };
        let text = err.to_string();
        assert!(text.contains("aws_glue: quota"));
        assert!(text.contains("azure_databricks: down"));
    }
}
