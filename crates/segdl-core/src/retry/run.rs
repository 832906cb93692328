//! Retry loop: run a closure until success, a permanent error, or a stop request.

use std::thread;
use std::time::{Duration, Instant};

use super::classify;
use super::error::AttemptError;
use super::policy::{ChunkRetries, RetryDecision, RetryPolicy};

const STOP_POLL: Duration = Duration::from_millis(50);

/// Runs `f` until it succeeds or the chunk's failure budget runs out.
///
/// `f` receives the 1-based attempt number within the current run of
/// failures. `position` reports how far the chunk has got; progress between
/// two failures restores the budget. A backoff sleep is cut short when
/// `should_stop` turns true; the last error is then returned and the caller
/// is expected to notice the stop itself.
pub fn run_with_retry<T, F>(
    policy: &RetryPolicy,
    should_stop: &dyn Fn() -> bool,
    position: &dyn Fn() -> u64,
    mut f: F,
) -> Result<T, AttemptError>
where
    F: FnMut(u32) -> Result<T, AttemptError>,
{
    let mut budget = ChunkRetries::new(*policy, position());
    loop {
        let e = match f(budget.failures() + 1) {
            Ok(v) => return Ok(v),
            Err(e) => e,
        };
        match budget.on_failure(position(), classify::classify(&e)) {
            RetryDecision::GiveUp => return Err(e),
            RetryDecision::RetryAfter(d) => {
                tracing::debug!(
                    failures = budget.failures(),
                    delay_ms = d.as_millis() as u64,
                    error = %e,
                    "retrying"
                );
                if !sleep_unless_stopped(d, should_stop) {
                    return Err(e);
                }
            }
        }
    }
}

/// Returns false if `should_stop` fired before `d` elapsed.
fn sleep_unless_stopped(d: Duration, should_stop: &dyn Fn() -> bool) -> bool {
    let deadline = Instant::now() + d;
    loop {
        if should_stop() {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep((deadline - now).min(STOP_POLL));
    }
}
