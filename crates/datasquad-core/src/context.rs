//! Token-budgeted conversation buffer.
//!
//! Two independent budgets live here:
//! - the per-call budget, enforced by [`ContextWindow::trimmed_context`]
//!   through a sliding window over the request's history
//! - the daily budget, tracked by a [`UsageMeter`] shared between every window
//!   an orchestrator hands out

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{Turn, TurnRole};

/// Estimate token count from text (~4 chars per token heuristic).
pub fn estimate_tokens(text: &str) -> u64 {
    text.len().div_ceil(4) as u64
}

// ---------------------------------------------------------------------------
// UsageMeter: daily token consumption
// ---------------------------------------------------------------------------

/// Running total of tokens consumed since the last reset.
///
/// Clones share the same counter.
#[derive(Debug, Clone, Default)]
pub struct UsageMeter {
    used: Arc<AtomicU64>,
}

impl UsageMeter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `tokens` to the running total and return the new total.
    pub fn charge(&self, tokens: u64) -> u64 {
        self.used.fetch_add(tokens, Ordering::Relaxed) + tokens
    }

    pub fn used(&self) -> u64 {
        self.used.load(Ordering::Relaxed)
    }

    /// Clear the running total. Driven by an external daily scheduler.
    pub fn reset(&self) {
        self.used.store(0, Ordering::Relaxed);
    }

    /// Whether consumption has reached `limit`.
    pub fn exhausted(&self, limit: u64) -> bool {
        self.used() >= limit
    }
}

// ---------------------------------------------------------------------------
// ContextWindow: per-request history with sliding-window trim
// ---------------------------------------------------------------------------

/// Result of trimming the history to a per-call budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrimmedContext {
    /// Retained turns, oldest first.
    pub turns: Vec<Turn>,
    pub total_tokens: u64,
    pub budget: u64,
    pub dropped: usize,
    /// The most recent turn alone exceeds `budget` and was returned by itself.
    pub oversized: bool,
}

impl TrimmedContext {
    fn empty(budget: u64) -> Self {
        Self {
            turns: Vec::new(),
            total_tokens: 0,
            budget,
            dropped: 0,
            oversized: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

/// Ordered, append-only conversation history for one request.
#[derive(Debug)]
pub struct ContextWindow {
    history: Vec<Turn>,
    total_tokens: u64,
    meter: UsageMeter,
}

impl ContextWindow {
    /// A window that charges consumption to `meter`.
    pub fn new(meter: UsageMeter) -> Self {
        Self {
            history: Vec::new(),
            total_tokens: 0,
            meter,
        }
    }

    /// A window with its own private meter.
    pub fn standalone() -> Self {
        Self::new(UsageMeter::new())
    }

    pub fn append(&mut self, turn: Turn) {
        self.total_tokens += turn.token_count();
        debug!(
            role = %turn.role(),
            tokens = turn.token_count(),
            history_tokens = self.total_tokens,
            "context turn appended"
        );
        self.history.push(turn);
    }

    pub fn history(&self) -> &[Turn] {
        &self.history
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Token sum of the full, untrimmed history.
    pub fn total_tokens(&self) -> u64 {
        self.total_tokens
    }

    /// Most recent Validator feedback turn, if any.
    pub fn latest_feedback(&self) -> Option<&Turn> {
        self.history
            .iter()
            .rev()
            .find(|t| t.role() == TurnRole::Validator)
    }

    /// Select the turns to send with the next model call.
    ///
    /// Keeps the newest turns whose token sum fits `budget_tokens`, dropping the
    /// oldest first. The most recent Validator turn is retained ahead of older
    /// generation turns whenever it fits alongside the newest turn. Never empty
    /// for a non-empty history: an oversized newest turn is returned alone,
    /// unmodified, with `oversized` set.
    pub fn trimmed_context(&self, budget_tokens: u64) -> TrimmedContext {
        let Some(last_idx) = self.history.len().checked_sub(1) else {
            return TrimmedContext::empty(budget_tokens);
        };

        let last = &self.history[last_idx];
        if last.token_count() > budget_tokens {
            debug!(
                tokens = last.token_count(),
                budget = budget_tokens,
                "newest turn exceeds per-call budget; sending it alone"
            );
            return TrimmedContext {
                turns: vec![last.clone()],
                total_tokens: last.token_count(),
                budget: budget_tokens,
                dropped: last_idx,
                oversized: true,
            };
        }

        let mut keep = vec![false; self.history.len()];
        keep[last_idx] = true;
        let mut total = last.token_count();

        let pinned = self
            .history
            .iter()
            .rposition(|t| t.role() == TurnRole::Validator);
        if let Some(pin) = pinned.filter(|&p| p != last_idx) {
            let cost = self.history[pin].token_count();
            if total + cost <= budget_tokens {
                keep[pin] = true;
                total += cost;
            }
        }

        for idx in (0..last_idx).rev() {
            if keep[idx] {
                continue;
            }
            let cost = self.history[idx].token_count();
            if total + cost > budget_tokens {
                break;
            }
            keep[idx] = true;
            total += cost;
        }

        let turns: Vec<Turn> = self
            .history
            .iter()
            .zip(&keep)
            .filter(|(_, kept)| **kept)
            .map(|(t, _)| t.clone())
            .collect();

        TrimmedContext {
            dropped: self.history.len() - turns.len(),
            turns,
            total_tokens: total,
            budget: budget_tokens,
            oversized: false,
        }
    }

    /// Charge consumption for one model call to the shared meter.
    pub fn record_usage(&self, tokens: u64) -> u64 {
        self.meter.charge(tokens)
    }

    /// Tokens consumed since the last reset, across every window sharing the meter.
    pub fn daily_usage(&self) -> u64 {
        self.meter.used()
    }

    pub fn reset_daily(&self) {
        self.meter.reset();
    }
}
