//! Timeout and bounded exponential backoff around a single model call.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cancel::CancellationHandle;
use crate::metrics::METRICS;
use crate::model::{Completion, ModelClient, ModelError, ModelRequest};
use crate::obs::emit_model_retry;

/// Retry behaviour for model calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first call; total calls are `max_retries + 1`.
    pub max_retries: u32,
    /// Base delay, doubled per retry.
    pub base_delay_ms: u64,
    /// Ceiling on a single backoff delay.
    pub max_delay_ms: u64,
    /// Fraction of the delay added as random jitter (0.0 to 1.0).
    pub jitter_factor: f64,
    /// Per-call timeout.
    pub call_timeout_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            jitter_factor: 0.2,
            call_timeout_ms: 60_000,
        }
    }
}

impl RetryConfig {
    /// Short delays, no jitter. Suited to tests and local backends.
    pub fn fast() -> Self {
        Self {
            max_retries: 2,
            base_delay_ms: 10,
            max_delay_ms: 100,
            jitter_factor: 0.0,
            call_timeout_ms: 5_000,
        }
    }

    /// Delay before retry number `retry` (0-indexed).
    pub fn calculate_delay(&self, retry: u32) -> Duration {
        let exponential = self.base_delay_ms.saturating_mul(2u64.saturating_pow(retry));
        let capped = exponential.min(self.max_delay_ms);

        let jitter_range = (capped as f64 * self.jitter_factor.clamp(0.0, 1.0)) as u64;
        let jitter = if jitter_range > 0 {
            fastrand::u64(0..jitter_range)
        } else {
            0
        };

        Duration::from_millis(capped + jitter)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

/// A successful call plus the transient failures that preceded it.
#[derive(Debug, Clone, PartialEq)]
pub struct RetriedCompletion {
    pub completion: Completion,
    /// Calls made, including the successful one.
    pub attempts: u32,
    pub failures: Vec<ModelError>,
}

/// Why a call gave up.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CallFailure {
    #[error("model call failed after {attempts} attempt(s): {last}")]
    Failed {
        attempts: u32,
        last: ModelError,
        failures: Vec<ModelError>,
    },

    #[error("model call cancelled after {attempts} attempt(s)")]
    Cancelled { attempts: u32 },
}

/// Call `client` with a timeout, retrying transient failures with backoff.
///
/// Permanent failures return immediately. Cancellation aborts both the
/// in-flight call and any pending backoff sleep.
pub async fn complete_with_retry(
    client: &dyn ModelClient,
    request: &ModelRequest,
    config: &RetryConfig,
    cancel: &CancellationHandle,
    role: &str,
) -> Result<RetriedCompletion, CallFailure> {
    let max_calls = config.max_retries.saturating_add(1);
    let mut failures = Vec::new();
    let mut attempt = 0u32;

    loop {
        if cancel.is_cancelled() {
            return Err(CallFailure::Cancelled { attempts: attempt });
        }
        attempt += 1;
        METRICS.inc_model_calls();

        let call = tokio::time::timeout(config.call_timeout(), client.complete(request));
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(CallFailure::Cancelled { attempts: attempt }),
            result = call => result,
        };

        let error = match outcome {
            Ok(Ok(completion)) => {
                return Ok(RetriedCompletion {
                    completion,
                    attempts: attempt,
                    failures,
                })
            }
            Ok(Err(e)) => e,
            Err(_) => ModelError::Timeout {
                after_ms: config.call_timeout_ms,
            },
        };

        if !error.is_transient() || attempt >= max_calls {
            return Err(CallFailure::Failed {
                attempts: attempt,
                last: error,
                failures,
            });
        }

        let delay = config.calculate_delay(attempt - 1);
        emit_model_retry(role, attempt, &error, delay.as_millis() as u64);
        METRICS.inc_model_retries();
        failures.push(error);

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(CallFailure::Cancelled { attempts: attempt }),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
