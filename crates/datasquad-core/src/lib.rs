//! datasquad Core Library
//!
//! Orchestration core for a multi-agent pipeline-code squad: a token-budgeted
//! context window, a deterministic validation gate, role-bound agents over a
//! pluggable model capability, and the self-healing request loop that ties
//! them together.

pub mod agent;
pub mod audit;
pub mod cancel;
pub mod config;
pub mod context;
pub mod domain;
pub mod fakes;
pub mod gate;
pub mod metrics;
pub mod model;
pub mod obs;
pub mod orchestration;
pub mod rules;
pub mod sink;
pub mod telemetry;

pub use agent::{extract_code_blocks, Agent, AgentInput, AgentRole, Generation, RoleTemplate};

pub use audit::{AuditEntry, AuditEvent, AuditTrail};

pub use cancel::CancellationHandle;

pub use config::{BudgetConfig, SquadConfig};

pub use context::{estimate_tokens, ContextWindow, TrimmedContext, UsageMeter};

pub use domain::{
    ApprovedLogic, Artifact, ArtifactKind, PipelineSpec, Result, ScaleTier, SchemaField,
    SquadError, TargetPlatform, Turn, TurnRole,
};

pub use gate::{Approval, GateError, ValidationGate, ValidationVerdict};

pub use model::retry::{CallFailure, RetryConfig};
pub use model::{Completion, ModelClient, ModelError, ModelRequest};

pub use orchestration::{
    OrchestrationError, Orchestrator, PipelineOutcome, RequestStage, RetryState,
    TargetTranslation, TranslationFailure,
};

pub use rules::{Marker, RuleConfig, RuleDefinition, RuleFinding, RuleId, RuleSet};

pub use sink::{read_run_record, write_rejected_candidate, write_run_artifacts, RunRecord};

pub use telemetry::init_tracing;

/// datasquad version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
