use std::time::Duration;

use crate::gateway::GatewayError;
use crate::models::constants::{
    DEFAULT_MAX_RETRIES, DEFAULT_RETRY_BACKOFF_BASE_MS, DEFAULT_RETRY_BACKOFF_MAX_MS,
};

/// How a commit talks to the persistence gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitPolicy {
    /// Per-call limit. `None` waits for the gateway indefinitely.
    pub timeout: Option<Duration>,
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl Default for CommitPolicy {
    fn default() -> Self {
        Self {
            timeout: None,
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_base: Duration::from_millis(DEFAULT_RETRY_BACKOFF_BASE_MS),
            backoff_max: Duration::from_millis(DEFAULT_RETRY_BACKOFF_MAX_MS),
        }
    }
}

impl CommitPolicy {
    pub fn backoff(&self, retry_count: u32) -> Duration {
        calculate_backoff(retry_count, self.backoff_base, self.backoff_max)
    }
}

/// Determines if a failed persistence call should be retried.
///
/// Only transient failures (network, timeout) are eligible, and only while
/// the retry count is below the maximum. A conflict needs a refresh first.
pub fn should_retry(error: &GatewayError, retry_count: u32, max_retries: u32) -> bool {
    if retry_count >= max_retries {
        return false;
    }
    error.is_transient()
}

/// Exponential backoff for retry attempts.
///
/// Formula: base * 2^(retry_count-1), capped at max
///
/// With base=250ms, max=4s:
/// - Retry 1: 250ms
/// - Retry 2: 500ms
/// - Retry 3: 1s
/// - Retry 6+: 4s (capped)
pub fn calculate_backoff(retry_count: u32, base: Duration, max: Duration) -> Duration {
    if retry_count == 0 {
        return Duration::ZERO;
    }

    let multiplier = 2u32.saturating_pow(retry_count - 1);
    base.saturating_mul(multiplier).min(max)
}
