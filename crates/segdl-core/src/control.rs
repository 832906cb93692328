//! Cooperative stop for running tasks, plus the control socket location.
//!
//! Each running task owns a [`StopToken`]. Workers check it between network
//! reads and while waiting for a free segment; the writer checks it between
//! segments. The reason decides what the task does once everything drained.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Why a running task was asked to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// User pause: end in Paused.
    Pause,
    /// Admission preemption: end in Waiting, back at the front of the queue.
    Requeue,
    /// Cancel: end in Canceled, temp file and chunks removed.
    Cancel,
}

impl StopReason {
    fn to_u8(self) -> u8 {
        match self {
            StopReason::Pause => 1,
            StopReason::Requeue => 2,
            StopReason::Cancel => 3,
        }
    }

    fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(StopReason::Pause),
            2 => Some(StopReason::Requeue),
            3 => Some(StopReason::Cancel),
            _ => None,
        }
    }
}

/// Shared, cloneable stop flag.
#[derive(Debug, Clone, Default)]
pub struct StopToken(Arc<AtomicU8>);

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a stop request. Cancel overrides an earlier pause or requeue;
    /// otherwise the first request wins.
    pub fn request(&self, reason: StopReason) {
        let new = reason.to_u8();
        let _ = self
            .0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cur| {
                if cur == 0 || (reason == StopReason::Cancel && cur != new) {
                    Some(new)
                } else {
                    None
                }
            });
    }

    pub fn reason(&self) -> Option<StopReason> {
        StopReason::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire) != 0
    }
}

/// Default path for the control socket (same XDG state dir as the DB).
pub fn default_control_socket_path() -> std::io::Result<PathBuf> {
    let dir = xdg::BaseDirectories::with_prefix("segdl")?.get_state_home();
    Ok(dir.join("control.sock"))
}
