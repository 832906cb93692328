//! Admission scheduler.
//!
//! Decides which tasks may run: at most `max_running` at once, the rest
//! queued FIFO in state Waiting. Lowering the limit preempts the most
//! recently started tasks back to the head of the queue.

mod admission;
mod queue;

pub use admission::{Admission, StartDecision};
pub use queue::UniqueQueue;
