//! Allowed task state transitions.

use crate::resume_db::TaskState;

impl TaskState {
    /// Whether a task in `self` may move to `to`.
    pub fn can_transition_to(self, to: TaskState) -> bool {
        use TaskState::*;
        match self {
            Pending => matches!(to, Preparing | Waiting | Canceled),
            Waiting => matches!(to, Preparing | Paused | Canceled),
            Preparing => matches!(
                to,
                Connecting | Pausing | Paused | Waiting | Error | FatalError | Canceled
            ),
            Connecting => matches!(
                to,
                Running | Pausing | Paused | Waiting | Error | FatalError | Canceled
            ),
            Running => matches!(to, Pausing | Finish | Waiting | Error | FatalError | Canceled),
            Pausing => matches!(to, Paused | Waiting | Finish | Error | FatalError | Canceled),
            Paused | Error => matches!(to, Waiting | Preparing | Canceled),
            FatalError | Finish | Canceled => to == Pending,
        }
    }
}
