//! Single writer per task: drains the ready queue into the temp file.
//!
//! The writer owns the temp file and the authoritative chunk progress. It
//! spawns one [`ChunkWorker`] per unfinished chunk, then loops until every
//! worker has reported its exit: positioned writes, progress ticks,
//! throttling, and periodic durable checkpoints (data synced first, then the
//! chunk snapshot handed to the persistence loop).

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use super::progress::ProgressGate;
use super::worker::ChunkWorker;
use crate::config::RuntimeSettings;
use crate::control::StopToken;
use crate::error::DownloadError;
use crate::events::{EngineEvent, EventSender};
use crate::http::HttpClient;
use crate::pipeline::{Ready, SegmentPipeline, WorkerExit};
use crate::resume_db::{ChunkRecord, TaskId};
use crate::retry::RetryPolicy;
use crate::storage::TempFile;
use crate::throttle::SpeedLimiter;

const READY_POLL: Duration = Duration::from_millis(100);

/// Chunk progress at a point where the bytes it describes are on disk.
#[derive(Debug, Clone)]
pub(crate) struct Checkpoint {
    pub chunks: Vec<ChunkRecord>,
    pub downloaded: u64,
}

pub(super) struct Transfer {
    pub task_id: TaskId,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub resumable: bool,
    pub total_size: Option<u64>,
    pub chunks: Vec<ChunkRecord>,
    pub file: TempFile,
    pub client: Arc<dyn HttpClient>,
    pub stop: StopToken,
    pub downloaded: Arc<AtomicU64>,
    pub global_limit: Arc<SpeedLimiter>,
    pub task_limit: Option<u64>,
    pub settings: Arc<RuntimeSettings>,
    /// Segments per task; at least one per unfinished chunk.
    pub buffers: usize,
    pub buffer_bytes: usize,
    pub acquire_timeout: Duration,
    pub checkpoint_interval: Duration,
    pub retry: RetryPolicy,
    pub events: EventSender,
    pub checkpoints: mpsc::Sender<Checkpoint>,
}

/// What the writer saw once every worker exited.
pub(super) struct TransferReport {
    pub chunks: Vec<ChunkRecord>,
    pub file: TempFile,
    /// First failure, from a worker or from the disk.
    pub failure: Option<DownloadError>,
    pub all_complete: bool,
}

impl Transfer {
    pub fn run(self) -> TransferReport {
        let Transfer {
            task_id,
            url,
            headers,
            resumable,
            total_size,
            mut chunks,
            file,
            client,
            stop,
            downloaded,
            global_limit,
            task_limit,
            settings,
            buffers,
            buffer_bytes,
            acquire_timeout,
            checkpoint_interval,
            retry,
            events,
            checkpoints,
        } = self;

        let pending: Vec<usize> = (0..chunks.len())
            .filter(|&i| !chunks[i].is_complete())
            .collect();
        downloaded.store(chunks.iter().map(|c| c.downloaded).sum(), Ordering::Release);

        let pipeline = Arc::new(SegmentPipeline::new(
            buffers.max(pending.len()),
            buffer_bytes,
            pending.len(),
        ));
        let abort = Arc::new(AtomicBool::new(false));
        let mut failure: Option<DownloadError> = None;
        let mut live = 0usize;
        let mut completed = 0usize;

        for &slot in &pending {
            let worker = ChunkWorker {
                task_id,
                slot,
                chunk: chunks[slot],
                url: url.clone(),
                headers: headers.clone(),
                resumable,
                total_size,
                client: Arc::clone(&client),
                pipeline: Arc::clone(&pipeline),
                stop: stop.clone(),
                abort: Arc::clone(&abort),
                retry,
                acquire_timeout,
            };
            match worker.spawn() {
                Ok(_) => live += 1,
                Err(e) => {
                    failure.get_or_insert(DownloadError::DownloadFailed(format!(
                        "spawn chunk worker: {e}"
                    )));
                    abort.store(true, Ordering::Release);
                    break;
                }
            }
        }
        tracing::debug!(task_id, workers = live, "transfer started");

        let task_limiter = SpeedLimiter::new(task_limit);
        let mut gate = ProgressGate::new(Instant::now());
        let mut last_checkpoint = Instant::now();
        let mut dirty = false;

        while live > 0 {
            match pipeline.next_ready(READY_POLL) {
                Some(Ready::Data(seg)) => {
                    if failure.is_none() {
                        match file.write_at(seg.offset, seg.data()) {
                            Ok(()) => {
                                let n = seg.len() as u64;
                                chunks[seg.chunk].downloaded += n;
                                downloaded.fetch_add(n, Ordering::AcqRel);
                                gate.record(n);
                                dirty = true;
                                // A stopping task drains at full speed.
                                let stopping = || stop.is_set() || abort.load(Ordering::Acquire);
                                if global_limit.throttle(n, &stopping) {
                                    task_limiter.throttle(n, &stopping);
                                }
                            }
                            Err(e) => {
                                let err = DownloadError::from_storage(&e);
                                tracing::debug!(task_id, error = %err, "write failed");
                                failure = Some(err);
                                abort.store(true, Ordering::Release);
                            }
                        }
                    }
                    pipeline.recycle(seg);
                }
                Some(Ready::Exit { chunk, exit }) => {
                    live -= 1;
                    match exit {
                        WorkerExit::Completed => {
                            completed += 1;
                            let c = &mut chunks[chunk];
                            if c.length.is_none() {
                                // Stream of unknown size ends at EOF.
                                c.length = Some(c.downloaded);
                            }
                        }
                        WorkerExit::Stopped => {}
                        WorkerExit::Failed(e) => {
                            if failure.is_none() {
                                failure = Some(e);
                                abort.store(true, Ordering::Release);
                            }
                        }
                    }
                }
                None => {}
            }

            let now = Instant::now();
            if let Some(tick) = gate.poll(now, settings.progress_interval()) {
                events.send(EngineEvent::Progress {
                    id: task_id,
                    total: total_size,
                    current: downloaded.load(Ordering::Acquire),
                    bytes_per_sec: tick.bytes_per_sec,
                });
            }
            if dirty && now.saturating_duration_since(last_checkpoint) >= checkpoint_interval {
                last_checkpoint = now;
                dirty = false;
                match file.sync_data() {
                    Ok(()) => {
                        let snapshot = Checkpoint {
                            chunks: chunks.clone(),
                            downloaded: downloaded.load(Ordering::Acquire),
                        };
                        // A full queue means the loop is behind; the next checkpoint supersedes this one.
                        let _ = checkpoints.try_send(snapshot);
                    }
                    Err(e) => tracing::warn!(task_id, error = %e, "sync before checkpoint failed"),
                }
            }
        }

        let all_complete = failure.is_none()
            && completed == pending.len()
            && chunks.iter().all(ChunkRecord::is_complete);
        if let Err(e) = file.sync_data() {
            failure.get_or_insert(DownloadError::from_storage(&e));
        }
        tracing::debug!(task_id, all_complete, failed = failure.is_some(), "transfer drained");

        TransferReport {
            chunks,
            file,
            failure,
            all_complete,
        }
    }
}
