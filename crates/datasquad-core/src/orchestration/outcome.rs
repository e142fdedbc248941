//! Request-scoped state and results.

use serde::{Deserialize, Serialize};

use crate::audit::AuditTrail;
use crate::domain::{ApprovedLogic, Artifact, PipelineSpec, TargetPlatform, Turn};
use crate::gate::ValidationVerdict;

/// Self-healing loop position for one request. Discarded when the request ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryState {
    /// Architect generations made so far.
    pub attempt: u32,
    pub max_attempts: u32,
    pub last_verdict: Option<ValidationVerdict>,
    pub last_candidate: Option<Artifact>,
}

impl RetryState {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            attempt: 0,
            max_attempts,
            last_verdict: None,
            last_candidate: None,
        }
    }

    pub fn begin_attempt(&mut self) -> u32 {
        self.attempt += 1;
        self.attempt
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempt >= self.max_attempts
    }

    /// Feedback for the next Architect generation, if the last one was rejected.
    pub fn feedback(&self) -> Option<&ValidationVerdict> {
        self.last_verdict.as_ref()
    }

    pub fn record_rejection(&mut self, candidate: Artifact, verdict: ValidationVerdict) {
        self.last_candidate = Some(candidate);
        self.last_verdict = Some(verdict);
    }
}

/// Why one translation target produced no artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationFailure {
    pub target: TargetPlatform,
    pub reason: String,
    /// Model calls made for this target.
    pub attempts: u32,
}

impl std::fmt::Display for TranslationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.target, self.reason)
    }
}

/// Result of translating approved logic for one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetTranslation {
    pub target: TargetPlatform,
    pub result: Result<Artifact, TranslationFailure>,
}

impl TargetTranslation {
    pub fn artifact(&self) -> Option<&Artifact> {
        self.result.as_ref().ok()
    }

    pub fn failure(&self) -> Option<&TranslationFailure> {
        self.result.as_ref().err()
    }
}

/// Everything a successful request produced.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutcome {
    pub request_id: String,
    pub spec: PipelineSpec,
    pub logic: ApprovedLogic,
    /// One entry per configured target, in configuration order.
    pub translations: Vec<TargetTranslation>,
    /// Architect generations, including the approved one.
    pub attempts: u32,
    /// Every gate verdict, in order; the last one passed.
    pub verdicts: Vec<ValidationVerdict>,
    /// Full, untrimmed conversation.
    pub transcript: Vec<Turn>,
    pub audit: AuditTrail,
    /// Tokens this request charged to the daily meter.
    pub tokens_charged: u64,
}

impl PipelineOutcome {
    pub fn artifacts(&self) -> impl Iterator<Item = &Artifact> {
        self.translations.iter().filter_map(TargetTranslation::artifact)
    }

    pub fn failures(&self) -> impl Iterator<Item = &TranslationFailure> {
        self.translations.iter().filter_map(TargetTranslation::failure)
    }

    pub fn translation_for(&self, target: TargetPlatform) -> Option<&TargetTranslation> {
        self.translations.iter().find(|t| t.target == target)
    }
}
