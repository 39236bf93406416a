//! Transport-level retry with exponential backoff and jitter.
//!
//! This retry is invisible to the repair loop: a rate-limited call that
//! eventually succeeds still counts as one generation attempt.

use crate::error::RepairError;
use std::time::Duration;

/// Configuration for transport-level retry with exponential backoff and jitter.
///
/// # Example
///
/// ```
/// use crm_triage::provider::BackoffConfig;
///
/// assert_eq!(BackoffConfig::none().max_retries, 0);
/// assert_eq!(BackoffConfig::standard().max_retries, 3);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffConfig {
    /// Maximum number of transport retries.
    pub max_retries: u32,

    /// Initial delay before first retry.
    pub initial_delay: Duration,

    /// Delay grows: initial, initial * multiplier, initial * multiplier^2, ...
    pub multiplier: f64,

    /// Maximum delay between retries.
    pub max_delay: Duration,

    pub jitter: JitterStrategy,

    /// HTTP status codes that trigger retry.
    pub retryable_statuses: Vec<u16>,

    /// Wait for the provider's `Retry-After` hint instead of the computed delay.
    pub respect_retry_after: bool,
}

/// Jitter strategy to spread retries from concurrent callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JitterStrategy {
    /// Delay is exactly the calculated value.
    None,

    /// Random value in `[0, calculated_delay]`.
    Full,

    /// `calculated_delay/2 + random in [0, calculated_delay/2]`.
    Equal,
}

impl BackoffConfig {
    /// No transport retry.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::standard()
        }
    }

    /// Cloud API defaults: 3 retries, 1s initial, 2x multiplier, 60s max,
    /// full jitter, respects Retry-After.
    pub fn standard() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(60),
            jitter: JitterStrategy::Full,
            retryable_statuses: vec![429, 500, 502, 503, 504],
            respect_retry_after: true,
        }
    }

    /// Short waits for request/response callers: 2 retries, 500ms initial,
    /// 10s max.
    pub fn interactive() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_millis(500),
            multiplier: 1.5,
            max_delay: Duration::from_secs(10),
            ..Self::standard()
        }
    }

    /// Calculate the delay for attempt N (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);
        let capped = base.min(self.max_delay.as_secs_f64());

        let jittered = match self.jitter {
            JitterStrategy::None => capped,
            JitterStrategy::Full => fastrand::f64() * capped,
            JitterStrategy::Equal => capped / 2.0 + fastrand::f64() * (capped / 2.0),
        };

        Duration::from_secs_f64(jittered)
    }

    /// Delay before retrying after `error`, honoring `Retry-After` when enabled.
    pub fn retry_delay(&self, attempt: u32, error: &RepairError) -> Duration {
        match error {
            RepairError::HttpError {
                retry_after: Some(hint),
                ..
            } if self.respect_retry_after => (*hint).min(self.max_delay),
            _ => self.delay_for_attempt(attempt),
        }
    }

    /// Whether `error` is worth another transport attempt.
    ///
    /// Retryable: HTTP errors with a status in `retryable_statuses`, and
    /// connection-level failures.
    pub fn is_retryable(&self, error: &RepairError) -> bool {
        match error {
            RepairError::HttpError { status, .. } => self.retryable_statuses.contains(status),
            RepairError::Request(_) => true,
            _ => false,
        }
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self::none()
    }
}
