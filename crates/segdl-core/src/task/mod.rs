//! One run of a download task: prepare, transfer, settle.
//!
//! A run starts when admission lets the task in and ends in exactly one
//! [`TaskOutcome`]. The task's record lives in a shared slot so the engine
//! can answer queries while the run updates it; the run is the only writer
//! of the record's persisted state while it is active.

mod finish;
mod prepare;
mod progress;
mod progress_worker;
mod state;
mod worker;
mod writer;

use std::sync::atomic::AtomicU64;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use crate::config::{EngineConfig, RuntimeSettings};
use crate::control::{StopReason, StopToken};
use crate::error::DownloadError;
use crate::events::{EngineEvent, EventSender};
use crate::http::HttpClient;
use crate::network::NetworkMonitor;
use crate::resume_db::{ChunkRecord, ResumeDb, TaskId, TaskRecord, TaskState};
use crate::storage::TempFile;
use crate::throttle::SpeedLimiter;
use crate::url_model::FilenamePolicy;

use self::writer::{Transfer, TransferReport};

/// Shared, live view of one task's record.
pub type TaskSlot = Arc<Mutex<TaskRecord>>;

/// Engine-wide collaborators a task run needs.
#[derive(Clone)]
pub(crate) struct TaskEnv {
    pub db: ResumeDb,
    pub client: Arc<dyn HttpClient>,
    pub network: Arc<dyn NetworkMonitor>,
    pub filenames: Arc<dyn FilenamePolicy>,
    pub config: Arc<EngineConfig>,
    pub settings: Arc<RuntimeSettings>,
    pub limiter: Arc<SpeedLimiter>,
    pub events: EventSender,
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Finished,
    Paused,
    /// Preempted by admission; back to Waiting.
    Requeued,
    Canceled,
    Failed(DownloadError),
}

pub(crate) struct TaskRun {
    pub env: TaskEnv,
    pub slot: TaskSlot,
    pub stop: StopToken,
    /// Live byte count for queries and progress.
    pub downloaded: Arc<AtomicU64>,
    /// Overwrite intended: an existing destination is not an error.
    pub restart: bool,
}

impl TaskRun {
    pub async fn run(self) -> TaskOutcome {
        let id = self.id();
        let prepared = prepare::prepare(&self).await;

        let (chunks, file, failure, all_complete) = match prepared {
            Err(e) => (None, None, Some(e), false),
            // A plan with nothing left to fetch still goes through the writer to finish.
            Ok(p) if self.stop.is_set() && !p.chunks.iter().all(|c| c.is_complete()) => {
                (Some(p.chunks), Some(p.file), None, false)
            }
            Ok(p) => {
                if self.transition(TaskState::Running) {
                    if let Err(e) = self.env.db.set_state(id, TaskState::Running).await {
                        tracing::warn!(task_id = id, error = %e, "persist running state failed");
                    }
                    self.env.events.send(EngineEvent::Started(self.snapshot()));
                }
                let before = p.chunks.clone();
                match self.transfer(p.chunks, p.file).await {
                    Ok(r) => (Some(r.chunks), Some(r.file), r.failure, r.all_complete),
                    Err(e) => (Some(before), None, Some(e), false),
                }
            }
        };

        let outcome = decide(self.stop.reason(), failure, all_complete);
        finish::finish(&self, outcome, chunks, file).await
    }

    async fn transfer(
        &self,
        chunks: Vec<ChunkRecord>,
        file: TempFile,
    ) -> Result<TransferReport, DownloadError> {
        let env = &self.env;
        let record = self.snapshot();
        let (tx, rx) = mpsc::channel(4);
        let persist = tokio::spawn(progress_worker::run_checkpoint_loop(
            rx,
            env.db.clone(),
            record.id,
        ));

        let transfer = Transfer {
            task_id: record.id,
            url: record.url.clone(),
            headers: record.headers.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            resumable: record.resumable,
            total_size: record.total_size,
            chunks,
            file,
            client: Arc::clone(&env.client),
            stop: self.stop.clone(),
            downloaded: Arc::clone(&self.downloaded),
            global_limit: Arc::clone(&env.limiter),
            task_limit: record.speed_limit,
            settings: Arc::clone(&env.settings),
            buffers: env.config.threads_per_task,
            buffer_bytes: env.config.buffer_bytes,
            acquire_timeout: env.config.acquire_timeout(),
            checkpoint_interval: env.config.checkpoint_interval(),
            retry: env.config.retry_policy(),
            events: env.events.clone(),
            checkpoints: tx,
        };
        let report = tokio::task::spawn_blocking(move || transfer.run()).await;
        // The sender went away with the transfer; drain what is queued.
        if persist.await.is_err() {
            tracing::warn!(task_id = record.id, "checkpoint loop panicked");
        }
        report.map_err(|e| DownloadError::DownloadFailed(format!("writer thread: {e}")))
    }

    pub fn id(&self) -> TaskId {
        self.slot.lock().unwrap().id
    }

    pub fn snapshot(&self) -> TaskRecord {
        self.slot.lock().unwrap().clone()
    }

    /// Applies `f` to the shared record and returns the updated copy.
    pub fn update<F: FnOnce(&mut TaskRecord)>(&self, f: F) -> TaskRecord {
        let mut rec = self.slot.lock().unwrap();
        f(&mut rec);
        rec.clone()
    }

    /// Moves the shared record to `to` if the state machine allows it.
    pub fn transition(&self, to: TaskState) -> bool {
        let mut rec = self.slot.lock().unwrap();
        if rec.state == to {
            return true;
        }
        if rec.state.can_transition_to(to) {
            rec.state = to;
            true
        } else {
            tracing::debug!(task_id = rec.id, from = %rec.state, to = %to, "transition skipped");
            false
        }
    }
}

/// Removes the task's temp file, if it has one. Failures are logged.
pub(crate) fn remove_temp_file(record: &TaskRecord) {
    if let Some(temp) = record.temp_path() {
        if let Err(e) = crate::storage::remove_if_exists(&temp) {
            tracing::warn!(task_id = record.id, error = %e, "remove temp file failed");
        }
    }
}

/// Cancel beats failure, failure beats completion, completion beats pause.
fn decide(
    reason: Option<StopReason>,
    failure: Option<DownloadError>,
    all_complete: bool,
) -> TaskOutcome {
    match (reason, failure) {
        (Some(StopReason::Cancel), _) => TaskOutcome::Canceled,
        (_, Some(e)) => TaskOutcome::Failed(e),
        _ if all_complete => TaskOutcome::Finished,
        (Some(StopReason::Pause), None) => TaskOutcome::Paused,
        (Some(StopReason::Requeue), None) => TaskOutcome::Requeued,
        (None, None) => TaskOutcome::Failed(DownloadError::DownloadFailed(
            "workers stopped before every chunk completed".into(),
        )),
    }
}
