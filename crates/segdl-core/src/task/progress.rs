//! Rate-limited progress reporting.

use std::time::{Duration, Instant};

/// Accumulates flushed bytes and lets a report through at most once per interval.
#[derive(Debug)]
pub(crate) struct ProgressGate {
    last_emit: Instant,
    accumulated: u64,
}

/// One progress report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Tick {
    /// Bytes flushed since the previous report.
    pub bytes: u64,
    pub bytes_per_sec: u64,
}

impl ProgressGate {
    pub fn new(now: Instant) -> Self {
        Self {
            last_emit: now,
            accumulated: 0,
        }
    }

    pub fn record(&mut self, bytes: u64) {
        self.accumulated += bytes;
    }

    /// A report if `interval` has passed since the last one and bytes were
    /// flushed meanwhile. Emitting resets the accumulator.
    pub fn poll(&mut self, now: Instant, interval: Duration) -> Option<Tick> {
        let elapsed = now.saturating_duration_since(self.last_emit);
        if elapsed < interval || self.accumulated == 0 {
            return None;
        }
        let bytes = std::mem::take(&mut self.accumulated);
        self.last_emit = now;
        let bytes_per_sec = (bytes as f64 / elapsed.as_secs_f64().max(1e-3)) as u64;
        Some(Tick {
            bytes,
            bytes_per_sec,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INTERVAL: Duration = Duration::from_millis(333);

    #[test]
    fn nothing_before_interval() {
        let t0 = Instant::now();
        let mut g = ProgressGate::new(t0);
        g.record(1000);
        assert_eq!(g.poll(t0 + Duration::from_millis(100), INTERVAL), None);
        // The skipped report is not queued: bytes stay accumulated.
        let tick = g.poll(t0 + INTERVAL, INTERVAL).unwrap();
        assert_eq!(tick.bytes, 1000);
    }

    #[test]
    fn nothing_without_bytes() {
        let t0 = Instant::now();
        let mut g = ProgressGate::new(t0);
        assert_eq!(g.poll(t0 + Duration::from_secs(5), INTERVAL), None);
    }

    #[test]
    fn reports_rate_and_resets() {
        let t0 = Instant::now();
        let mut g = ProgressGate::new(t0);
        g.record(500);
        g.record(500);
        let tick = g.poll(t0 + Duration::from_millis(500), INTERVAL).unwrap();
        assert_eq!(tick.bytes, 1000);
        assert_eq!(tick.bytes_per_sec, 2000);

        // Accumulator reset; next report needs fresh bytes and a fresh interval.
        let t1 = t0 + Duration::from_millis(500);
        assert_eq!(g.poll(t1 + INTERVAL, INTERVAL), None);
        g.record(10);
        assert_eq!(g.poll(t1 + Duration::from_millis(200), INTERVAL), None);
        assert!(g.poll(t1 + INTERVAL, INTERVAL).is_some());
    }

    #[test]
    fn reports_never_closer_than_interval() {
        let t0 = Instant::now();
        let mut g = ProgressGate::new(t0);
        let mut emitted = Vec::new();
        for ms in (0..3000).step_by(10) {
            g.record(64);
            let now = t0 + Duration::from_millis(ms);
            if g.poll(now, INTERVAL).is_some() {
                emitted.push(now);
            }
        }
        assert!(!emitted.is_empty());
        for pair in emitted.windows(2) {
            assert!(pair[1] - pair[0] >= INTERVAL);
        }
    }
}
