//! Structured observability hooks for the request lifecycle.
//!
//! - Request-scoped tracing spans via the `RequestSpan` RAII guard
//! - Emission functions for lifecycle events: start, turn append, gate
//!   evaluation, model retry, translation failure, budget refusal, finish
//!
//! Every event carries an `event` field so log pipelines can filter on it.

use std::collections::BTreeSet;

use tracing::{info, warn};

use crate::domain::{TargetPlatform, TurnRole};
use crate::rules::RuleId;

/// RAII guard that enters a request-scoped span for the duration of a request.
///
/// Only hold this across synchronous sections. Async code should attach the
/// span with `tracing::Instrument` instead.
pub struct RequestSpan {
    _span: tracing::span::EnteredSpan,
}

impl RequestSpan {
    pub fn enter(request_id: &str) -> Self {
        Self {
            _span: request_span(request_id).entered(),
        }
    }
}

/// The span every request's events are recorded under.
pub fn request_span(request_id: &str) -> tracing::Span {
    tracing::info_span!("datasquad.request", request_id = %request_id)
}

pub fn emit_request_started(request_id: &str, task: &str, max_attempts: u32) {
    info!(
        event = "request.started",
        request_id = %request_id,
        task = %task,
        max_attempts = max_attempts,
    );
}

pub fn emit_request_finished(request_id: &str, attempts: u32, success: bool, duration_ms: u64) {
    info!(
        event = "request.finished",
        request_id = %request_id,
        attempts = attempts,
        success = success,
        duration_ms = duration_ms,
    );
}

pub fn emit_turn_appended(request_id: &str, role: TurnRole, token_count: u64) {
    info!(
        event = "turn.appended",
        request_id = %request_id,
        role = %role,
        token_count = token_count,
    );
}

/// Gate evaluations never add a turn; this event is their audit record.
pub fn emit_gate_evaluated(
    request_id: &str,
    attempt: u32,
    passed: bool,
    violated: &BTreeSet<RuleId>,
) {
    let violated: Vec<String> = violated.iter().map(ToString::to_string).collect();
    info!(
        event = "gate.evaluated",
        request_id = %request_id,
        attempt = attempt,
        passed = passed,
        violated = %violated.join(","),
    );
}

pub fn emit_model_retry(role: &str, attempt: u32, error: &dyn std::fmt::Display, delay_ms: u64) {
    warn!(
        event = "model.retry",
        role = %role,
        attempt = attempt,
        error = %error,
        delay_ms = delay_ms,
    );
}

pub fn emit_translation_failed(request_id: &str, target: TargetPlatform, reason: &str) {
    warn!(
        event = "translation.failed",
        request_id = %request_id,
        platform = %target,
        reason = %reason,
    );
}

pub fn emit_budget_refused(used: u64, limit: u64) {
    warn!(event = "budget.refused", used = used, limit = limit);
}
