//! Global atomic counters for datasquad observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. at the end of a request).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters: no allocations, no locking.
pub struct Metrics {
    model_calls: AtomicU64,
    model_retries: AtomicU64,
    gate_evaluations: AtomicU64,
    gate_rejections: AtomicU64,
    budget_refusals: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            model_calls: AtomicU64::new(0),
            model_retries: AtomicU64::new(0),
            gate_evaluations: AtomicU64::new(0),
            gate_rejections: AtomicU64::new(0),
            budget_refusals: AtomicU64::new(0),
        }
    }

    pub fn inc_model_calls(&self) {
        self.model_calls.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "model_calls", "counter incremented");
    }

    pub fn inc_model_retries(&self) {
        self.model_retries.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "model_retries", "counter incremented");
    }

    pub fn inc_gate_evaluations(&self) {
        self.gate_evaluations.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "gate_evaluations", "counter incremented");
    }

    pub fn inc_gate_rejections(&self) {
        self.gate_rejections.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "gate_rejections", "counter incremented");
    }

    pub fn inc_budget_refusals(&self) {
        self.budget_refusals.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "budget_refusals", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    ///
    /// Call this at natural boundaries (end of a request, CLI exit)
    /// rather than on every increment.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            model_calls = self.model_calls(),
            model_retries = self.model_retries(),
            gate_evaluations = self.gate_evaluations(),
            gate_rejections = self.gate_rejections(),
            budget_refusals = self.budget_refusals(),
        );
    }

    pub fn model_calls(&self) -> u64 {
        self.model_calls.load(Ordering::Relaxed)
    }

    pub fn model_retries(&self) -> u64 {
        self.model_retries.load(Ordering::Relaxed)
    }

    pub fn gate_evaluations(&self) -> u64 {
        self.gate_evaluations.load(Ordering::Relaxed)
    }

    pub fn gate_rejections(&self) -> u64 {
        self.gate_rejections.load(Ordering::Relaxed)
    }

    pub fn budget_refusals(&self) -> u64 {
        self.budget_refusals.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.model_calls.store(0, Ordering::Relaxed);
        self.model_retries.store(0, Ordering::Relaxed);
        self.gate_evaluations.store(0, Ordering::Relaxed);
        self.gate_rejections.store(0, Ordering::Relaxed);
        self.budget_refusals.store(0, Ordering::Relaxed);
    }
}
