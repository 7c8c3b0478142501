//! Retry utilities for external context lookups
//!
//! Lookups against collaborators (creator profile, trend history, content
//! rankings) are retried with exponential backoff. Each attempt runs under a
//! timeout; a timeout is fatal for the run and is never retried.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Configuration for retry behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first one
    pub max_attempts: u32,

    /// Base delay in milliseconds for exponential backoff
    pub base_delay_ms: u64,

    /// Maximum delay in milliseconds (caps exponential growth)
    pub max_delay_ms: u64,

    /// Multiplier for exponential backoff (default: 2.0)
    pub backoff_multiplier: f64,

    /// Time budget for a single attempt
    pub attempt_timeout_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 200,
            max_delay_ms: 5_000,
            backoff_multiplier: 2.0,
            attempt_timeout_ms: 10_000,
        }
    }
}

impl RetryConfig {
    /// Create a retry configuration with custom delays
    pub fn with_delays(max_attempts: u32, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_attempts,
            base_delay_ms,
            max_delay_ms,
            ..Default::default()
        }
    }

    /// Override the per-attempt timeout
    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.attempt_timeout_ms = timeout_ms;
        self
    }

    /// Delay before the given attempt (0-based); the first attempt never waits
    fn calculate_delay(&self, attempt: u32) -> Duration {
        let delay_ms = if attempt == 0 {
            0
        } else {
            let exponential =
                self.base_delay_ms as f64 * self.backoff_multiplier.powi((attempt - 1) as i32);
            (exponential as u64).min(self.max_delay_ms)
        };

        Duration::from_millis(delay_ms)
    }
}

/// Run a lookup with bounded retries and a per-attempt timeout
///
/// Returns [`Error::StageTimeout`] as soon as any attempt times out, and
/// [`Error::ContextUnavailable`] once every attempt has failed.
pub async fn fetch_with_retry<T, F, Fut>(
    config: &RetryConfig,
    lookup: &'static str,
    operation: F,
) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let attempts = config.max_attempts.max(1);
    let timeout = Duration::from_millis(config.attempt_timeout_ms);
    let mut last_error = None;

    for attempt in 0..attempts {
        if attempt > 0 {
            let delay = config.calculate_delay(attempt);
            debug!(
                lookup,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "Retrying lookup after delay"
            );
            tokio::time::sleep(delay).await;
        }

        match tokio::time::timeout(timeout, operation()).await {
            Err(_) => {
                warn!(lookup, attempt, timeout_ms = config.attempt_timeout_ms, "Lookup timed out");
                return Err(Error::StageTimeout {
                    lookup,
                    timeout_ms: config.attempt_timeout_ms,
                });
            }
            Ok(Ok(value)) => {
                if attempt > 0 {
                    debug!(lookup, attempt, "Lookup succeeded after retry");
                }
                return Ok(value);
            }
            Ok(Err(e)) => {
                warn!(
                    lookup,
                    attempt,
                    max_attempts = attempts,
                    error = %e,
                    "Lookup failed"
                );
                last_error = Some(e);
            }
        }
    }

    Err(Error::ContextUnavailable {
        lookup,
        attempts,
        reason: last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| String::from("no error details")),
    })
}
