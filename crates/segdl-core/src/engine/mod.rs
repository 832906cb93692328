//! Engine facade: the control surface applications talk to.
//!
//! An [`Engine`] owns the task table, admission and the event dispatcher.
//! Control calls return once the request is recorded; the work they trigger
//! (a run starting, draining, settling) is reported through listener events.

mod builder;
mod inner;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

pub use builder::EngineBuilder;

use self::inner::{set_slot_state, EngineInner, TaskEntry};
use crate::config::EngineConfig;
use crate::control::StopReason;
use crate::error::DownloadError;
use crate::events::{DownloadListener, EngineEvent, ListenerId};
use crate::resume_db::{NewTask, ResumeDb, TaskId, TaskRecord, TaskState};
use crate::scheduler::StartDecision;
use crate::task::remove_temp_file;
use crate::url_model;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("task {0} not found")]
    NotFound(TaskId),
    #[error("task {id} is {state}; restart it to download again")]
    NotResumable { id: TaskId, state: TaskState },
    #[error(transparent)]
    Rejected(#[from] DownloadError),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Handle to a running download engine. Cheap to clone.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    pub fn builder(db: ResumeDb, config: EngineConfig) -> EngineBuilder {
        EngineBuilder::new(db, config)
    }

    /// Opens the default database and builds an engine with production defaults.
    pub async fn open(config: EngineConfig) -> Result<Self> {
        let db = ResumeDb::open_default().await?;
        EngineBuilder::new(db, config).build().await
    }

    /// Stores a new task and asks admission to start it. Submitting the same
    /// target again while the first task is not terminal returns its id.
    pub async fn submit(&self, task: NewTask) -> Result<TaskId, EngineError> {
        url_model::validate_url(&task.url)?;
        let _guard = self.inner.submit_lock.lock().await;
        if let Some(id) = self.find_duplicate(&task) {
            tracing::debug!(task_id = id, url = %task.url, "duplicate submit");
            return Ok(id);
        }

        let db = &self.inner.db;
        let id = db
            .insert_task(&task, TaskState::Pending)
            .await
            .map_err(|e| DownloadError::CreateTask(format!("{e:#}")))?;
        let record = db
            .get_task(id)
            .await
            .map_err(|e| DownloadError::CreateTask(format!("{e:#}")))?
            .ok_or_else(|| DownloadError::CreateTask(format!("task {id} missing after insert")))?;
        tracing::debug!(task_id = id, url = %record.url, "task submitted");

        self.inner
            .state
            .lock()
            .unwrap()
            .tasks
            .insert(id, TaskEntry::new(record.clone()));
        self.inner.emit(EngineEvent::TaskAdded(record));
        self.start_task(id).await;
        Ok(id)
    }

    fn find_duplicate(&self, task: &NewTask) -> Option<TaskId> {
        let st = self.inner.state.lock().unwrap();
        st.tasks.values().find_map(|entry| {
            let rec = entry.slot.lock().unwrap();
            (!rec.state.is_terminal()
                && rec.same_target(&task.url, &task.dest_dir, task.filename.as_deref()))
            .then_some(rec.id)
        })
    }

    /// Starts or resumes a task. With `restart` the stored progress and any
    /// partial file are discarded first, which is also the only way out of
    /// Finish, Canceled and FatalError.
    pub async fn start_or_resume(&self, id: TaskId, restart: bool) -> Result<(), EngineError> {
        let record = self.query(id).ok_or(EngineError::NotFound(id))?;
        if record.state.is_terminal() && !restart {
            return Err(EngineError::NotResumable {
                id,
                state: record.state,
            });
        }
        {
            let mut st = self.inner.state.lock().unwrap();
            if st.admission.is_running(id) {
                if st.admission.is_stopping(id) {
                    if let Some(entry) = st.tasks.get_mut(&id) {
                        entry.resume_after = true;
                    }
                }
                tracing::debug!(task_id = id, "already running");
                return Ok(());
            }
        }
        if restart {
            self.reset(id).await?;
        }
        self.start_task(id).await;
        Ok(())
    }

    async fn reset(&self, id: TaskId) -> Result<(), EngineError> {
        let record = {
            let mut st = self.inner.state.lock().unwrap();
            let entry = st.tasks.get_mut(&id).ok_or(EngineError::NotFound(id))?;
            entry.restart_on_start = true;
            let mut rec = entry.slot.lock().unwrap();
            if rec.state.is_terminal() {
                rec.state = TaskState::Pending;
            }
            rec.downloaded_size = 0;
            rec.total_size = None;
            rec.resumable = false;
            rec.etag = None;
            rec.last_modified = None;
            rec.finished_at = None;
            rec.clear_error();
            rec.clone()
        };
        remove_temp_file(&record);
        self.inner.db.save(&record, &[]).await?;
        tracing::debug!(task_id = id, "progress discarded for restart");
        self.inner.emit(EngineEvent::RecordUpdated(record));
        Ok(())
    }

    pub(crate) async fn start_task(&self, id: TaskId) {
        if self.inner.admit(id) == StartDecision::Queued {
            self.inner.persist_state(id, TaskState::Waiting).await;
            self.inner.emit(EngineEvent::Waiting(id));
        }
    }

    /// A running task drains and lands in Paused; a waiting one leaves the
    /// queue. Anything else is left alone.
    pub async fn pause(&self, id: TaskId) -> Result<(), EngineError> {
        let paused = {
            let mut st = self.inner.state.lock().unwrap();
            let Some(entry) = st.tasks.get_mut(&id) else {
                return Err(EngineError::NotFound(id));
            };
            entry.resume_after = false;
            if self.inner.stop_running(&mut st, id, StopReason::Pause) {
                false
            } else {
                st.admission.dequeue(id) && set_slot_state(&st, id, TaskState::Paused)
            }
        };
        if paused {
            self.inner.persist_state(id, TaskState::Paused).await;
            self.inner.emit(EngineEvent::Paused(id));
        }
        Ok(())
    }

    /// Stops the task and discards its progress and partial file. The record
    /// stays, in Canceled, until deleted.
    pub async fn cancel(&self, id: TaskId) -> Result<(), EngineError> {
        let canceled = {
            let mut st = self.inner.state.lock().unwrap();
            if !st.tasks.contains_key(&id) {
                return Err(EngineError::NotFound(id));
            }
            if self.inner.stop_running(&mut st, id, StopReason::Cancel) {
                None
            } else {
                st.admission.dequeue(id);
                st.tasks.get(&id).and_then(|entry| {
                    let mut rec = entry.slot.lock().unwrap();
                    if rec.state.is_terminal() || !rec.state.can_transition_to(TaskState::Canceled) {
                        return None;
                    }
                    rec.state = TaskState::Canceled;
                    rec.downloaded_size = 0;
                    Some(rec.clone())
                })
            }
        };
        if let Some(record) = canceled {
            remove_temp_file(&record);
            self.inner.db.save(&record, &[]).await?;
            self.inner.emit(EngineEvent::Canceled(id));
        }
        Ok(())
    }

    /// Removes the task and its record. A running task is canceled first and
    /// removed once it settles. `delete_file` also removes a finished download.
    pub async fn delete(&self, id: TaskId, delete_file: bool) -> Result<(), EngineError> {
        let removed = {
            let mut st = self.inner.state.lock().unwrap();
            let entry = st.tasks.get_mut(&id).ok_or(EngineError::NotFound(id))?;
            if entry.running.is_some() {
                entry.delete_after = Some(delete_file);
                self.inner.stop_running(&mut st, id, StopReason::Cancel);
                None
            } else {
                st.admission.remove(id);
                st.tasks.remove(&id).map(|entry| entry.view())
            }
        };
        if let Some(record) = removed {
            self.inner.purge(&record, delete_file).await;
        }
        Ok(())
    }

    /// Resumes every task that is neither running nor terminal, oldest first.
    pub async fn start_all(&self) {
        let ids: Vec<TaskId> = {
            let st = self.inner.state.lock().unwrap();
            let mut idle: Vec<TaskRecord> = st
                .tasks
                .values()
                .filter(|entry| entry.running.is_none())
                .map(|entry| entry.view())
                .filter(|rec| !rec.state.is_terminal())
                .collect();
            idle.sort_by_key(|rec| (rec.created_at, rec.id));
            idle.into_iter().map(|rec| rec.id).collect()
        };
        for id in ids {
            if let Err(e) = self.start_or_resume(id, false).await {
                tracing::debug!(task_id = id, error = %e, "start skipped");
            }
        }
    }

    /// Pauses every running task and empties the waiting queue.
    pub async fn pause_all(&self) {
        self.stop_all(StopReason::Pause).await;
    }

    async fn stop_all(&self, reason: StopReason) {
        let paused = {
            let mut st = self.inner.state.lock().unwrap();
            let paused: Vec<TaskId> = if reason == StopReason::Pause {
                st.admission
                    .clear_waiting()
                    .into_iter()
                    .filter(|id| set_slot_state(&st, *id, TaskState::Paused))
                    .collect()
            } else {
                Vec::new()
            };
            let running = st.admission.running().to_vec();
            for id in running {
                self.inner.stop_running(&mut st, id, reason);
            }
            paused
        };
        for id in paused {
            self.inner.persist_state(id, TaskState::Paused).await;
            self.inner.emit(EngineEvent::Paused(id));
        }
    }

    /// Current record, with the live byte count of a running task.
    pub fn query(&self, id: TaskId) -> Option<TaskRecord> {
        let st = self.inner.state.lock().unwrap();
        st.tasks.get(&id).map(TaskEntry::view)
    }

    /// Every task that is not finished or canceled, newest first.
    pub fn query_active(&self) -> Vec<TaskRecord> {
        let mut out = self.collect(|s| !matches!(s, TaskState::Finish | TaskState::Canceled));
        out.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        out
    }

    /// Finished tasks, most recently finished first.
    pub fn query_finished(&self) -> Vec<TaskRecord> {
        let mut out = self.collect(|s| s == TaskState::Finish);
        out.sort_by(|a, b| (b.finished_at, b.id).cmp(&(a.finished_at, a.id)));
        out
    }

    /// Canceled tasks, newest first.
    pub fn query_deleted(&self) -> Vec<TaskRecord> {
        let mut out = self.collect(|s| s == TaskState::Canceled);
        out.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        out
    }

    fn collect(&self, keep: impl Fn(TaskState) -> bool) -> Vec<TaskRecord> {
        let st = self.inner.state.lock().unwrap();
        st.tasks
            .values()
            .map(TaskEntry::view)
            .filter(|rec| keep(rec.state))
            .collect()
    }

    pub fn max_running_tasks(&self) -> usize {
        self.inner.state.lock().unwrap().admission.max_running()
    }

    /// Raising the limit starts waiting tasks; lowering it sends the most
    /// recently started ones back to the head of the queue.
    pub async fn set_max_running_tasks(&self, max_running: usize) {
        let mut st = self.inner.state.lock().unwrap();
        let preempted = st.admission.set_max_running(max_running);
        for id in &preempted {
            if let Some(run) = st.tasks.get(id).and_then(|e| e.running.as_ref()) {
                run.stop.request(StopReason::Requeue);
            }
        }
        if !preempted.is_empty() {
            tracing::debug!(?preempted, max_running, "preempting tasks over the limit");
        }
        for id in st.admission.promotions() {
            self.inner.spawn_run(&mut st, id);
        }
    }

    /// Engine-wide cap in bytes per second, shared by all tasks.
    pub fn speed_limit(&self) -> Option<u64> {
        self.inner.env.limiter.cap()
    }

    pub fn set_speed_limit(&self, bytes_per_sec: Option<u64>) {
        self.inner.env.limiter.set_cap(bytes_per_sec);
    }

    pub fn progress_interval(&self) -> Duration {
        self.inner.env.settings.progress_interval()
    }

    pub fn set_progress_interval(&self, interval: Duration) {
        self.inner.env.settings.set_progress_interval(interval);
    }

    pub fn allow_metered(&self) -> bool {
        self.inner.env.settings.allow_metered()
    }

    /// Applies to tasks that start after the change.
    pub fn set_allow_metered(&self, allow: bool) {
        self.inner.env.settings.set_allow_metered(allow);
    }

    pub fn add_listener(&self, listener: Arc<dyn DownloadListener>) -> ListenerId {
        self.inner.dispatcher.add_listener(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.inner.dispatcher.remove_listener(id)
    }

    /// Waits until no run is active and every event so far was delivered.
    pub async fn wait_idle(&self) {
        let mut rx = self.inner.active.subscribe();
        // The sender lives as long as `inner`.
        let _ = rx.wait_for(|active| *active == 0).await;
        let dispatcher = Arc::clone(&self.inner.dispatcher);
        if tokio::task::spawn_blocking(move || dispatcher.flush())
            .await
            .is_err()
        {
            tracing::warn!("event flush panicked");
        }
    }

    /// Stops every running task and waits for them to settle. They are
    /// stored as Waiting, so the next engine opened on this database picks
    /// them up again. Waiting tasks stay queued in the database.
    pub async fn shutdown(&self) {
        self.inner.shutting_down.store(true, Ordering::Release);
        self.stop_all(StopReason::Requeue).await;
        self.wait_idle().await;
        tracing::debug!("engine shut down");
    }
}
