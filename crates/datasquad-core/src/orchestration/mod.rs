//! The request lifecycle.
//!
//! [`Orchestrator::run_pipeline_request`] drives one request through
//! generation, gate validation, feedback-driven regeneration and per-target
//! translation:
//!
//! ```text
//! budget check -> Architect -> gate --reject--> feedback turn -> budget check -> Architect ...
//!                                   --approve--> CloudArchitect (per target) -> outcome
//! ```
//!
//! Each request owns its [`ContextWindow`]; only the [`UsageMeter`] is shared,
//! so one orchestrator can serve concurrent requests.
//!
//! - [`error`]: `OrchestrationError`
//! - [`outcome`]: `PipelineOutcome`, `RetryState`, per-target results

pub mod error;
pub mod outcome;

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, Instrument};
use uuid::Uuid;

use crate::agent::{Agent, AgentError, AgentInput, AgentRole, Generation, Invocation};
use crate::audit::{AuditEvent, AuditTrail};
use crate::cancel::CancellationHandle;
use crate::config::{BudgetConfig, SquadConfig};
use crate::context::{ContextWindow, UsageMeter};
use crate::domain::{ApprovedLogic, PipelineSpec, TargetPlatform, Turn, TurnRole};
use crate::gate::{Approval, ValidationGate};
use crate::metrics::METRICS;
use crate::model::retry::{CallFailure, RetryConfig};
use crate::model::ModelClient;
use crate::obs;

pub use error::{OrchestrationError, OrchestrationResult, RequestStage};
pub use outcome::{PipelineOutcome, RetryState, TargetTranslation, TranslationFailure};

/// Sequences agents, the gate and the budget for every request.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    architect: Agent,
    translators: Vec<(TargetPlatform, Agent)>,
    gate: ValidationGate,
    budget: BudgetConfig,
    retry: RetryConfig,
    meter: UsageMeter,
}

/// Per-request mutable state.
struct RequestRun<'a> {
    request_id: &'a str,
    window: ContextWindow,
    audit: AuditTrail,
    tokens_charged: u64,
}

impl RequestRun<'_> {
    fn append(&mut self, turn: Turn) {
        obs::emit_turn_appended(self.request_id, turn.role(), turn.token_count());
        self.audit.record(AuditEvent::TurnAppended {
            turn_id: turn.id(),
            role: turn.role(),
            token_count: turn.token_count(),
        });
        self.window.append(turn);
    }

    /// Charge a generation to the daily meter and append its turn.
    fn absorb(&mut self, generation: &Generation) {
        let consumed = generation.tokens_consumed();
        self.window.record_usage(consumed);
        self.tokens_charged += consumed;
        if !generation.transient_failures.is_empty() {
            self.audit.record(AuditEvent::ModelRetry {
                role: generation.turn.role().to_string(),
                transient_failures: generation.transient_failures.len() as u32,
            });
        }
        self.append(generation.turn.clone());
    }
}

impl Orchestrator {
    /// An orchestrator with no translation targets.
    pub fn new(architect: Agent, gate: ValidationGate, budget: BudgetConfig) -> Self {
        Self {
            architect,
            translators: Vec::new(),
            gate,
            budget,
            retry: RetryConfig::default(),
            meter: UsageMeter::new(),
        }
    }

    /// Build from configuration: one Architect client, one CloudArchitect
    /// client shared by every configured target.
    pub fn from_config(
        config: &SquadConfig,
        architect: Arc<dyn ModelClient>,
        cloud_architect: Arc<dyn ModelClient>,
    ) -> crate::domain::Result<Self> {
        config.validate()?;
        let gate = ValidationGate::new(config.rule_set()?);
        let translator = Agent::cloud_architect(cloud_architect);
        let mut orchestrator = Self::new(Agent::architect(architect), gate, config.budget.clone())
            .with_retry(config.retry.clone());
        for target in &config.targets {
            orchestrator = orchestrator.with_translator(*target, translator.clone());
        }
        Ok(orchestrator)
    }

    /// Add a translation target. Targets run in insertion order.
    pub fn with_translator(mut self, target: TargetPlatform, agent: Agent) -> Self {
        self.translators.push((target, agent));
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Share a daily meter, e.g. between orchestrators in one process.
    pub fn with_meter(mut self, meter: UsageMeter) -> Self {
        self.meter = meter;
        self
    }

    pub fn budget(&self) -> &BudgetConfig {
        &self.budget
    }

    pub fn gate(&self) -> &ValidationGate {
        &self.gate
    }

    pub fn targets(&self) -> Vec<TargetPlatform> {
        self.translators.iter().map(|(t, _)| *t).collect()
    }

    pub fn meter(&self) -> &UsageMeter {
        &self.meter
    }

    pub fn daily_usage(&self) -> u64 {
        self.meter.used()
    }

    pub fn reset_daily(&self) {
        self.meter.reset();
    }

    /// Run with the configured `max_validation_attempts`.
    pub async fn run(&self, spec: &PipelineSpec) -> OrchestrationResult<PipelineOutcome> {
        self.run_pipeline_request(spec, self.budget.max_validation_attempts)
            .await
    }

    pub async fn run_pipeline_request(
        &self,
        spec: &PipelineSpec,
        max_attempts: u32,
    ) -> OrchestrationResult<PipelineOutcome> {
        self.run_pipeline_request_with_cancel(spec, max_attempts, &CancellationHandle::new())
            .await
    }

    /// Run one request. `cancel` aborts any in-flight model call.
    pub async fn run_pipeline_request_with_cancel(
        &self,
        spec: &PipelineSpec,
        max_attempts: u32,
        cancel: &CancellationHandle,
    ) -> OrchestrationResult<PipelineOutcome> {
        let request_id = Uuid::new_v4().to_string();
        let span = obs::request_span(&request_id);
        async {
            let started = Instant::now();
            obs::emit_request_started(&request_id, &spec.task, max_attempts);

            let result = self.drive(&request_id, spec, max_attempts, cancel).await;

            let attempts = match &result {
                Ok(outcome) => outcome.attempts,
                Err(e) => e.attempts().unwrap_or(0),
            };
            obs::emit_request_finished(
                &request_id,
                attempts,
                result.is_ok(),
                started.elapsed().as_millis() as u64,
            );
            result
        }
        .instrument(span)
        .await
    }

    async fn drive(
        &self,
        request_id: &str,
        spec: &PipelineSpec,
        max_attempts: u32,
        cancel: &CancellationHandle,
    ) -> OrchestrationResult<PipelineOutcome> {
        if max_attempts == 0 {
            return Err(OrchestrationError::InvalidRequest(
                "max_attempts must be >= 1".to_string(),
            ));
        }

        let mut run = RequestRun {
            request_id,
            window: ContextWindow::new(self.meter.clone()),
            audit: AuditTrail::new(),
            tokens_charged: 0,
        };
        let mut state = RetryState::new(max_attempts);
        let mut verdicts = Vec::new();
        let invocation = Invocation {
            retry: &self.retry,
            cancel,
        };

        let logic = loop {
            self.ensure_budget(&mut run, &state)?;
            if cancel.is_cancelled() {
                return Err(OrchestrationError::Cancelled {
                    stage: RequestStage::Generation,
                    attempts: state.attempt,
                });
            }

            let context = run
                .window
                .trimmed_context(self.budget.per_call_token_budget);
            let input = AgentInput::Pipeline {
                spec,
                feedback: state.feedback(),
            };
            let generation = match self
                .architect
                .generate(input, &context.turns, invocation)
                .await
            {
                Ok(generation) => generation,
                Err(e) => return Err(generation_error(e, &state, &mut run)),
            };

            run.absorb(&generation);
            let attempt = state.begin_attempt();

            let approval = self.gate.review(generation.artifact)?;
            let verdict = match &approval {
                Approval::Approved(logic) => logic.verdict().clone(),
                Approval::Rejected { verdict, .. } => verdict.clone(),
            };
            obs::emit_gate_evaluated(request_id, attempt, verdict.passed, &verdict.violated_rules);
            run.audit.record(AuditEvent::GateEvaluated {
                attempt,
                passed: verdict.passed,
                violated_rules: verdict.violated_rules.clone(),
            });
            verdicts.push(verdict);

            match approval {
                Approval::Approved(logic) => break logic,
                Approval::Rejected { candidate, verdict } => {
                    if state.is_exhausted() {
                        return Err(OrchestrationError::ValidationExhausted {
                            attempts: state.attempt,
                            last_verdict: verdict,
                            last_candidate: Box::new(candidate),
                            audit: Box::new(run.audit),
                        });
                    }
                    run.append(Turn::feedback(&verdict));
                    state.record_rejection(candidate, verdict);
                }
            }
        };

        let translations = self
            .translate_all(&mut run, &logic, cancel, state.attempt)
            .await?;
        if !translations.is_empty() && translations.iter().all(|t| t.result.is_err()) {
            let failures = translations
                .into_iter()
                .filter_map(|t| t.result.err())
                .collect();
            return Err(OrchestrationError::TranslationFailed {
                failures,
                logic: Box::new(logic.into_artifact()),
                attempts: state.attempt,
                audit: Box::new(run.audit),
            });
        }

        Ok(PipelineOutcome {
            request_id: request_id.to_string(),
            spec: spec.clone(),
            logic,
            translations,
            attempts: state.attempt,
            verdicts,
            transcript: run.window.history().to_vec(),
            audit: run.audit,
            tokens_charged: run.tokens_charged,
        })
    }

    /// Translate approved logic for every target, sequentially and independently.
    async fn translate_all(
        &self,
        run: &mut RequestRun<'_>,
        logic: &ApprovedLogic,
        cancel: &CancellationHandle,
        attempts: u32,
    ) -> OrchestrationResult<Vec<TargetTranslation>> {
        let invocation = Invocation {
            retry: &self.retry,
            cancel,
        };
        let mut translations = Vec::with_capacity(self.translators.len());

        for (target, agent) in &self.translators {
            let target = *target;
            if cancel.is_cancelled() {
                return Err(OrchestrationError::Cancelled {
                    stage: RequestStage::Translation,
                    attempts,
                });
            }

            let used = self.meter.used();
            if used >= self.budget.daily_token_limit {
                self.refuse_budget(run, used);
                let failure = TranslationFailure {
                    target,
                    reason: format!(
                        "daily token budget exhausted: {used} of {} used",
                        self.budget.daily_token_limit
                    ),
                    attempts: 0,
                };
                self.record_translation_failure(run, &failure);
                translations.push(TargetTranslation {
                    target,
                    result: Err(failure),
                });
                continue;
            }

            let context: Vec<Turn> = run
                .window
                .trimmed_context(self.budget.per_call_token_budget)
                .turns
                .into_iter()
                .filter(|t| t.role() == TurnRole::CloudArchitect)
                .collect();

            let result = match agent
                .generate(AgentInput::Translation { logic, target }, &context, invocation)
                .await
            {
                Ok(generation) => {
                    run.absorb(&generation);
                    Ok(generation.artifact)
                }
                Err(AgentError::Call(CallFailure::Cancelled { .. })) => {
                    return Err(OrchestrationError::Cancelled {
                        stage: RequestStage::Translation,
                        attempts,
                    });
                }
                Err(AgentError::Call(CallFailure::Failed {
                    attempts: calls,
                    last,
                    ..
                })) => Err(TranslationFailure {
                    target,
                    reason: last.to_string(),
                    attempts: calls,
                }),
                Err(e @ AgentError::RoleMismatch { .. }) => Err(TranslationFailure {
                    target,
                    reason: e.to_string(),
                    attempts: 0,
                }),
            };

            if let Err(failure) = &result {
                self.record_translation_failure(run, failure);
            } else {
                debug!(platform = %target, "translation produced");
            }
            translations.push(TargetTranslation { target, result });
        }

        Ok(translations)
    }

    fn ensure_budget(
        &self,
        run: &mut RequestRun<'_>,
        state: &RetryState,
    ) -> OrchestrationResult<()> {
        let used = self.meter.used();
        let limit = self.budget.daily_token_limit;
        if used >= limit {
            self.refuse_budget(run, used);
            return Err(OrchestrationError::BudgetExceeded {
                used,
                limit,
                attempts: state.attempt,
                last_verdict: state.last_verdict.clone(),
                last_candidate: state.last_candidate.clone().map(Box::new),
                audit: Box::new(std::mem::take(&mut run.audit)),
            });
        }
        Ok(())
    }

    fn refuse_budget(&self, run: &mut RequestRun<'_>, used: u64) {
        let limit = self.budget.daily_token_limit;
        METRICS.inc_budget_refusals();
        obs::emit_budget_refused(used, limit);
        run.audit.record(AuditEvent::BudgetRefused { used, limit });
    }

    fn record_translation_failure(&self, run: &mut RequestRun<'_>, failure: &TranslationFailure) {
        obs::emit_translation_failed(run.request_id, failure.target, &failure.reason);
        run.audit.record(AuditEvent::TranslationFailed {
            target: failure.target,
            reason: failure.reason.clone(),
        });
    }
}

fn generation_error(
    err: AgentError,
    state: &RetryState,
    run: &mut RequestRun<'_>,
) -> OrchestrationError {
    match err {
        AgentError::Call(CallFailure::Failed {
            attempts: calls,
            last,
            ..
        }) => OrchestrationError::GenerationUnavailable {
            role: AgentRole::Architect,
            attempts: state.attempt,
            calls,
            reason: last,
            last_verdict: state.last_verdict.clone(),
            last_candidate: state.last_candidate.clone().map(Box::new),
            audit: Box::new(std::mem::take(&mut run.audit)),
        },
        AgentError::Call(CallFailure::Cancelled { .. }) => OrchestrationError::Cancelled {
            stage: RequestStage::Generation,
            attempts: state.attempt,
        },
        AgentError::RoleMismatch { .. } => OrchestrationError::InvalidRequest(err.to_string()),
    }
}
