//! Engine internals: task table, admission, run lifecycle.
//!
//! All bookkeeping sits behind one `std::sync::Mutex` that is never held
//! across I/O or `.await`. Runs are spawned on the tokio runtime; when one
//! ends, its slot is settled and waiting tasks are promoted under the same
//! lock, so `|running| <= max_running` holds at every release.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::watch;

use crate::control::{StopReason, StopToken};
use crate::events::{EngineEvent, EventDispatcher};
use crate::resume_db::{ResumeDb, TaskId, TaskRecord, TaskState};
use crate::scheduler::{Admission, StartDecision};
use crate::task::{remove_temp_file, TaskEnv, TaskOutcome, TaskRun, TaskSlot};

pub(super) struct RunningTask {
    pub stop: StopToken,
    pub downloaded: Arc<AtomicU64>,
}

pub(super) struct TaskEntry {
    pub slot: TaskSlot,
    pub running: Option<RunningTask>,
    /// Next run overwrites whatever is on disk.
    pub restart_on_start: bool,
    /// Set by `delete` on a running task: remove it once the run settles.
    /// The flag says whether a finished file goes too.
    pub delete_after: Option<bool>,
    /// Resume requested while a pause was still draining.
    pub resume_after: bool,
}

impl TaskEntry {
    pub fn new(record: TaskRecord) -> Self {
        Self {
            slot: Arc::new(Mutex::new(record)),
            running: None,
            restart_on_start: false,
            delete_after: None,
            resume_after: false,
        }
    }

    /// Record with the live byte count of an active run.
    pub fn view(&self) -> TaskRecord {
        let mut rec = self.slot.lock().unwrap().clone();
        if let Some(run) = &self.running {
            rec.downloaded_size = run.downloaded.load(Ordering::Acquire);
        }
        rec
    }
}

pub(super) struct EngineState {
    pub admission: Admission,
    pub tasks: HashMap<TaskId, TaskEntry>,
}

pub(super) struct EngineInner {
    pub db: ResumeDb,
    pub env: TaskEnv,
    pub state: Mutex<EngineState>,
    pub dispatcher: Arc<EventDispatcher>,
    /// Number of spawned runs that have not settled yet.
    pub active: watch::Sender<usize>,
    pub submit_lock: tokio::sync::Mutex<()>,
    pub shutting_down: AtomicBool,
}

impl EngineInner {
    pub fn emit(&self, event: EngineEvent) {
        self.dispatcher.send(event);
    }

    /// Admission request. Starts the run when a slot is free; a queued
    /// task is moved to Waiting before the lock is released.
    pub fn admit(self: &Arc<Self>, id: TaskId) -> StartDecision {
        let mut st = self.state.lock().unwrap();
        let decision = st.admission.request_start(id);
        match decision {
            StartDecision::Start => self.spawn_run(&mut st, id),
            StartDecision::Queued => {
                set_slot_state(&st, id, TaskState::Waiting);
            }
            StartDecision::AlreadyQueued | StartDecision::AlreadyRunning => {}
        }
        decision
    }

    /// Starts a run for a task that admission just let in.
    pub fn spawn_run(self: &Arc<Self>, st: &mut EngineState, id: TaskId) {
        let Some(entry) = st.tasks.get_mut(&id) else {
            st.admission.settle(id);
            return;
        };
        let stop = StopToken::new();
        let downloaded = Arc::new(AtomicU64::new(entry.slot.lock().unwrap().downloaded_size));
        entry.running = Some(RunningTask {
            stop: stop.clone(),
            downloaded: Arc::clone(&downloaded),
        });
        let run = TaskRun {
            env: self.env.clone(),
            slot: Arc::clone(&entry.slot),
            stop,
            downloaded,
            restart: std::mem::take(&mut entry.restart_on_start),
        };
        self.active.send_modify(|n| *n += 1);
        tracing::debug!(task_id = id, "run started");

        let inner = Arc::clone(self);
        tokio::spawn(async move {
            let outcome = run.run().await;
            inner.on_run_end(id, outcome).await;
        });
    }

    async fn on_run_end(self: Arc<Self>, id: TaskId, outcome: TaskOutcome) {
        tracing::debug!(task_id = id, ?outcome, "run settled");
        let (removed, requeued) = {
            let mut st = self.state.lock().unwrap();
            st.admission.settle(id);
            let (delete_after, resume_after) = match st.tasks.get_mut(&id) {
                Some(entry) => {
                    entry.running = None;
                    (
                        entry.delete_after.take(),
                        std::mem::take(&mut entry.resume_after),
                    )
                }
                None => (None, false),
            };
            let removed = match delete_after {
                Some(delete_file) => {
                    st.admission.remove(id);
                    st.tasks
                        .remove(&id)
                        .map(|entry| (entry.view(), delete_file))
                }
                None => {
                    if outcome == TaskOutcome::Requeued {
                        st.admission.requeue_front(id);
                    }
                    None
                }
            };
            let mut requeued = false;
            if !self.shutting_down.load(Ordering::Acquire) {
                for next in st.admission.promotions() {
                    self.spawn_run(&mut st, next);
                }
                if resume_after && removed.is_none() && outcome == TaskOutcome::Paused {
                    match st.admission.request_start(id) {
                        StartDecision::Start => self.spawn_run(&mut st, id),
                        StartDecision::Queued => {
                            requeued = set_slot_state(&st, id, TaskState::Waiting);
                        }
                        StartDecision::AlreadyQueued | StartDecision::AlreadyRunning => {}
                    }
                }
            }
            (removed, requeued)
        };

        if requeued {
            self.persist_state(id, TaskState::Waiting).await;
            self.emit(EngineEvent::Waiting(id));
        }
        if let Some((record, delete_file)) = removed {
            self.purge(&record, delete_file).await;
        }
        self.active.send_modify(|n| *n = n.saturating_sub(1));
    }

    /// Removes every trace of a task that is not running.
    pub async fn purge(&self, record: &TaskRecord, delete_file: bool) {
        remove_temp_file(record);
        if delete_file && record.state == TaskState::Finish {
            if let Some(dest) = record.destination() {
                if let Err(e) = crate::storage::remove_if_exists(&dest) {
                    tracing::warn!(task_id = record.id, error = %e, "remove downloaded file failed");
                }
            }
        }
        if let Err(e) = self.db.delete(record.id).await {
            tracing::warn!(task_id = record.id, error = %e, "delete task record failed");
        }
        self.emit(EngineEvent::TaskRemoved(record.id));
    }

    pub async fn persist_state(&self, id: TaskId, to: TaskState) {
        if let Err(e) = self.db.set_state(id, to).await {
            tracing::warn!(task_id = id, error = %e, "persist task state failed");
        }
    }

    /// Stops a running task. Returns false if it is not running.
    pub fn stop_running(&self, st: &mut EngineState, id: TaskId, reason: StopReason) -> bool {
        if !st.admission.is_running(id) {
            return false;
        }
        let Some(entry) = st.tasks.get(&id) else {
            return false;
        };
        let Some(run) = &entry.running else {
            return false;
        };
        run.stop.request(reason);
        st.admission.mark_stopping(id);
        if reason == StopReason::Pause {
            let mut rec = entry.slot.lock().unwrap();
            if rec.state.can_transition_to(TaskState::Pausing) {
                rec.state = TaskState::Pausing;
                drop(rec);
                self.emit(EngineEvent::Pausing(id));
            }
        }
        true
    }
}

/// Moves an idle task's record to `to` if the state machine allows it.
pub(super) fn set_slot_state(st: &EngineState, id: TaskId, to: TaskState) -> bool {
    let Some(entry) = st.tasks.get(&id) else {
        return false;
    };
    let mut rec = entry.slot.lock().unwrap();
    if rec.state == to {
        return true;
    }
    if !rec.state.can_transition_to(to) {
        return false;
    }
    rec.state = to;
    true
}
