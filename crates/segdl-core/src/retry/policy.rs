use std::time::Duration;

/// How a failed chunk request should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Timeouts, resets, broken bodies, 5xx: try again after backoff.
    Transient,
    /// 429 / 503. The server may say how long to stay away.
    Throttled { retry_after: Option<Duration> },
    /// Retrying cannot help (4xx, content changed, bad URL).
    Permanent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    GiveUp,
    RetryAfter(Duration),
}

/// Backoff settings, from `[retry]` via `EngineConfig::retry_policy`.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Consecutive attempts without progress before a chunk gives up.
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// Upper bound for backoff and for a server's `Retry-After`.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay after `failures` consecutive failures: `base * 2^(failures-1)`, capped.
    pub fn backoff(&self, failures: u32) -> Duration {
        let shift = failures.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << shift)
            .min(self.max_delay)
    }

    pub fn decide(&self, failures: u32, kind: ErrorKind) -> RetryDecision {
        if failures >= self.max_attempts {
            return RetryDecision::GiveUp;
        }
        match kind {
            ErrorKind::Permanent => RetryDecision::GiveUp,
            ErrorKind::Throttled {
                retry_after: Some(wait),
            } => RetryDecision::RetryAfter(wait.min(self.max_delay)),
            ErrorKind::Throttled { retry_after: None } | ErrorKind::Transient => {
                RetryDecision::RetryAfter(self.backoff(failures))
            }
        }
    }
}

/// Failure budget of one chunk.
///
/// Counts consecutive failures at the same offset. A reconnect that moved the
/// chunk forward before failing again starts a fresh budget, so a long chunk
/// survives resets spread over its lifetime while a connection that keeps
/// failing in place runs out.
#[derive(Debug, Clone)]
pub struct ChunkRetries {
    policy: RetryPolicy,
    failures: u32,
    offset: u64,
}

impl ChunkRetries {
    pub fn new(policy: RetryPolicy, offset: u64) -> Self {
        Self {
            policy,
            failures: 0,
            offset,
        }
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Records a failure with the chunk at `offset` and decides what next.
    pub fn on_failure(&mut self, offset: u64, kind: ErrorKind) -> RetryDecision {
        if offset > self.offset {
            self.offset = offset;
            self.failures = 0;
        }
        self.failures += 1;
        self.policy.decide(self.failures, kind)
    }
}
