//! Per-request audit trail.
//!
//! Mirrors every turn append and records the events that never reach the
//! agent-facing history: gate evaluations, model retries, translation
//! failures and budget refusals.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{TargetPlatform, TurnRole};
use crate::rules::RuleId;

/// One recorded lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEvent {
    TurnAppended {
        turn_id: Uuid,
        role: TurnRole,
        token_count: u64,
    },
    GateEvaluated {
        attempt: u32,
        passed: bool,
        violated_rules: BTreeSet<RuleId>,
    },
    ModelRetry {
        role: String,
        transient_failures: u32,
    },
    TranslationFailed {
        target: TargetPlatform,
        reason: String,
    },
    BudgetRefused {
        used: u64,
        limit: u64,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub seq: u64,
    pub at: DateTime<Utc>,
    pub event: AuditEvent,
}

/// Ordered, append-only event log for one request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditTrail {
    entries: Vec<AuditEntry>,
}

impl AuditTrail {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, event: AuditEvent) {
        let seq = self.entries.len() as u64;
        self.entries.push(AuditEntry {
            seq,
            at: Utc::now(),
            event,
        });
    }

    pub fn entries(&self) -> &[AuditEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn gate_evaluations(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e.event, AuditEvent::GateEvaluated { .. }))
            .count()
    }

    pub fn turns_appended(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e.event, AuditEvent::TurnAppended { .. }))
            .count()
    }
}
