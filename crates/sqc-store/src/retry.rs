// SPDX-License-Identifier: Apache-2.0

use std::fmt::Display;
use std::thread;
use std::time::Duration;
use tracing::warn;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_backoff_ms: u64,
}

pub trait BackoffPolicy {
    fn delay_for_attempt(&self, attempt: usize) -> Duration;
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff_ms: 100,
        }
    }
}

impl BackoffPolicy for RetryPolicy {
    fn delay_for_attempt(&self, attempt: usize) -> Duration {
        Duration::from_millis(self.base_backoff_ms.saturating_mul(attempt as u64))
    }
}

/// Runs `op` until it succeeds, fails with an error `is_retryable` rejects,
/// or the policy's attempts are used up. The last error is returned; call
/// sites decide whether to raise or swallow it.
pub fn retry<T, E, F, C>(
    policy: &RetryPolicy,
    operation: &str,
    is_retryable: C,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Result<T, E>,
    C: Fn(&E) -> bool,
    E: Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1usize;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(err) => {
                let retryable = is_retryable(&err);
                warn!(
                    operation,
                    attempt,
                    max_attempts,
                    retryable,
                    error = %err,
                    "storage operation failed"
                );
                if !retryable || attempt >= max_attempts {
                    return Err(err);
                }
                thread::sleep(policy.delay_for_attempt(attempt));
                attempt += 1;
            }
        }
    }
}
