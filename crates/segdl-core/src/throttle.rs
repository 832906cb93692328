//! Writer-side throughput cap.
//!
//! After each flush the writer asks the limiter how long to sleep so that the
//! bytes written in the current one-second window do not exceed the cap:
//! `max(0, window_bytes / cap - window_elapsed)`. One limiter can be shared by
//! every task (global cap) and each task may add its own.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

const WINDOW: Duration = Duration::from_secs(1);
const STOP_POLL: Duration = Duration::from_millis(50);

struct Window {
    started: Instant,
    bytes: u64,
}

pub struct SpeedLimiter {
    /// Bytes per second; 0 means unlimited.
    cap: AtomicU64,
    window: Mutex<Window>,
}

impl SpeedLimiter {
    pub fn new(cap: Option<u64>) -> Self {
        Self {
            cap: AtomicU64::new(cap.unwrap_or(0)),
            window: Mutex::new(Window {
                started: Instant::now(),
                bytes: 0,
            }),
        }
    }

    pub fn unlimited() -> Self {
        Self::new(None)
    }

    pub fn cap(&self) -> Option<u64> {
        match self.cap.load(Ordering::Relaxed) {
            0 => None,
            c => Some(c),
        }
    }

    /// Takes effect on the next flush.
    pub fn set_cap(&self, cap: Option<u64>) {
        self.cap.store(cap.unwrap_or(0), Ordering::Relaxed);
    }

    /// Records `bytes` just flushed and returns how long the writer should pause.
    pub fn delay_for(&self, bytes: u64) -> Duration {
        self.delay_at(bytes, Instant::now())
    }

    fn delay_at(&self, bytes: u64, now: Instant) -> Duration {
        let Some(cap) = self.cap() else {
            return Duration::ZERO;
        };
        let mut w = self.window.lock().unwrap();
        if now.saturating_duration_since(w.started) >= WINDOW {
            w.started = now;
            w.bytes = 0;
        }
        w.bytes += bytes;
        let budgeted = Duration::from_secs_f64(w.bytes as f64 / cap as f64);
        budgeted.saturating_sub(now.saturating_duration_since(w.started))
    }

    /// Records `bytes` and sleeps if the cap is exceeded. The sleep ends
    /// early once `should_stop` turns true; returns false in that case.
    pub fn throttle(&self, bytes: u64, should_stop: &dyn Fn() -> bool) -> bool {
        let delay = self.delay_for(bytes);
        if delay.is_zero() {
            return true;
        }
        let deadline = Instant::now() + delay;
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
}
