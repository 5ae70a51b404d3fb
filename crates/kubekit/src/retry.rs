//! Fixed-interval retry for eventually-consistent cluster checks.

use crate::backend::Executor;
use crate::error::{Error, Result};
use crate::types::{CommandInvocation, RetryPolicy};
use std::thread;
use std::time::Duration;

/// Callback trait for retry progress notifications.
pub trait RetryCallback {
    /// Called when an attempt failed and another one will follow.
    ///
    /// # Arguments
    /// * `attempt` - The attempt that failed (1-indexed)
    /// * `max_attempts` - Maximum number of attempts
    /// * `error` - The error from that attempt
    /// * `delay` - Time until the next attempt
    fn on_retry(&self, attempt: u32, max_attempts: u32, error: &Error, delay: Duration);
}

/// No-op callback that does nothing.
pub struct NoCallback;

impl RetryCallback for NoCallback {
    fn on_retry(&self, _attempt: u32, _max_attempts: u32, _error: &Error, _delay: Duration) {}
}

/// Callback that logs retries at warn level.
pub struct LogCallback;

impl RetryCallback for LogCallback {
    fn on_retry(&self, attempt: u32, max_attempts: u32, error: &Error, delay: Duration) {
        log::warn!(
            "attempt {}/{} failed: {}. Retrying in {}s...",
            attempt,
            max_attempts,
            error,
            delay.as_secs()
        );
    }
}

/// Blocks between attempts.
pub trait Sleeper {
    /// Wait for `duration`.
    fn sleep(&self, duration: Duration);
}

/// Sleeper backed by [`std::thread::sleep`].
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// Execute an operation with fixed-interval retry.
///
/// Every error is retried until `policy.max_attempts` is reached. The first
/// success is returned immediately.
///
/// # Returns
/// The result of the operation, or the last error if all attempts failed.
pub fn with_retry<T, F>(
    policy: &RetryPolicy,
    callback: Option<&dyn RetryCallback>,
    sleeper: &dyn Sleeper,
    mut operation: F,
) -> Result<T>
where
    F: FnMut(u32) -> Result<T>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation(attempt) {
            Ok(value) => return Ok(value),
            Err(e) if attempt >= max_attempts => return Err(e),
            Err(e) => {
                if let Some(cb) = callback {
                    cb.on_retry(attempt, max_attempts, &e, policy.interval);
                }
                sleeper.sleep(policy.interval);
                attempt += 1;
            }
        }
    }
}

/// Run a command until it succeeds or the policy is exhausted.
///
/// On exhaustion the returned [`Error::RetryExhausted`] names the command,
/// its arguments, the attempt count and the last error.
pub fn run_with_retry<E: Executor + ?Sized>(
    executor: &E,
    invocation: &CommandInvocation,
    policy: &RetryPolicy,
    callback: Option<&dyn RetryCallback>,
    sleeper: &dyn Sleeper,
) -> Result<String> {
    let mut attempts = 0;
    let result = with_retry(policy, callback, sleeper, |attempt| {
        attempts = attempt;
        log::debug!("attempt {}/{}: {}", attempt, policy.max_attempts, invocation);
        executor.run_checked(invocation)
    });

    result.map_err(|last| {
        let err = Error::RetryExhausted {
            invocation: invocation.clone(),
            attempts,
            last: Box::new(last),
        };
        log::error!("{err}");
        err
    })
}
