//! Chunk worker: one connection streaming one chunk into pipeline segments.

use std::cell::Cell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::control::StopToken;
use crate::error::DownloadError;
use crate::http::{HttpClient, HttpRequest};
use crate::pipeline::{Fill, Segment, SegmentPipeline, WorkerExit};
use crate::resume_db::{ChunkRecord, TaskId};
use crate::retry::{run_with_retry, AttemptError, RetryPolicy};

/// Everything a worker needs; moved onto its thread.
pub(super) struct ChunkWorker {
    pub task_id: TaskId,
    /// Position of the chunk in the plan; tags every segment.
    pub slot: usize,
    pub chunk: ChunkRecord,
    pub url: String,
    pub headers: Vec<(String, String)>,
    /// Server honours ranges; without it the only chunk is fetched whole.
    pub resumable: bool,
    pub total_size: Option<u64>,
    pub client: Arc<dyn HttpClient>,
    pub pipeline: Arc<SegmentPipeline>,
    pub stop: StopToken,
    /// Raised by the writer when the task already failed.
    pub abort: Arc<AtomicBool>,
    pub retry: RetryPolicy,
    pub acquire_timeout: Duration,
}

/// Reports the worker's exit on drop, so a panic still reaches the writer.
struct ExitGuard {
    pipeline: Arc<SegmentPipeline>,
    slot: usize,
    exit: Option<WorkerExit>,
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        let exit = self.exit.take().unwrap_or_else(|| {
            WorkerExit::Failed(DownloadError::DownloadFailed("chunk worker panicked".into()))
        });
        self.pipeline.report_exit(self.slot, exit);
    }
}

impl ChunkWorker {
    pub fn spawn(self) -> std::io::Result<JoinHandle<()>> {
        let name = format!("segdl-{}-{}", self.task_id, self.slot);
        thread::Builder::new().name(name).spawn(move || {
            let mut guard = ExitGuard {
                pipeline: Arc::clone(&self.pipeline),
                slot: self.slot,
                exit: None,
            };
            guard.exit = Some(self.run());
        })
    }

    fn should_stop(&self) -> bool {
        self.stop.is_set() || self.abort.load(Ordering::Acquire)
    }

    fn end(&self) -> Option<u64> {
        self.chunk.length.map(|len| self.chunk.start + len)
    }

    fn run(&self) -> WorkerExit {
        if self.chunk.is_complete() {
            return WorkerExit::Completed;
        }
        let offset = Cell::new(self.chunk.next_offset());
        let should_stop = || self.should_stop();
        let position = || offset.get();
        let result = run_with_retry(&self.retry, &should_stop, &position, |attempt| {
            if attempt > 1 {
                tracing::debug!(
                    task_id = self.task_id,
                    chunk = self.slot,
                    offset = offset.get(),
                    attempt,
                    "reconnecting"
                );
            }
            self.attempt(&offset)
        });
        match result {
            Ok(exit) => exit,
            Err(_) if self.should_stop() => WorkerExit::Stopped,
            Err(e) => {
                tracing::debug!(task_id = self.task_id, chunk = self.slot, error = %e, "chunk failed");
                WorkerExit::Failed(e.into())
            }
        }
    }

    /// One request from `offset` to the end of the chunk. `offset` advances
    /// with every segment handed to the writer, so a retry resumes there.
    fn attempt(&self, offset: &Cell<u64>) -> Result<WorkerExit, AttemptError> {
        if self.should_stop() {
            return Ok(WorkerExit::Stopped);
        }
        let end = self.end();
        let from = offset.get();
        if !self.resumable && from > self.chunk.start {
            return Err(AttemptError::Rejected(DownloadError::DownloadFailed(
                "connection lost and the server does not support resuming".into(),
            )));
        }

        let mut request = HttpRequest::get(&self.url);
        request.headers.extend(self.headers.iter().cloned());
        if self.resumable {
            let rest = ChunkRecord {
                downloaded: from - self.chunk.start,
                ..self.chunk
            };
            request = request.with_range(rest.request_range());
        }
        let response = self
            .client
            .execute(&request)
            .map_err(AttemptError::Transport)?;

        match response.status {
            206 => {
                if let Some(cr) = response.headers.content_range() {
                    if let (Some(remote), Some(expected)) = (cr.total, self.total_size) {
                        if remote != expected {
                            return Err(AttemptError::Rejected(DownloadError::ContentExpired(
                                format!("server now reports {remote} bytes, expected {expected}"),
                            )));
                        }
                    }
                    if cr.start != from {
                        return Err(AttemptError::Rejected(DownloadError::DownloadFailed(
                            format!("asked for offset {from} but got {}", cr.start),
                        )));
                    }
                }
            }
            200 if from > 0 => {
                return Err(AttemptError::Rejected(DownloadError::DownloadFailed(
                    "server ignored the range request".into(),
                )));
            }
            200 => {}
            code => {
                return Err(AttemptError::Status {
                    code,
                    retry_after: response.headers.retry_after(),
                })
            }
        }

        let mut body = response.body;
        let should_stop = || self.should_stop();
        loop {
            let at = offset.get();
            let remaining = end.map(|e| e.saturating_sub(at));
            if remaining == Some(0) {
                return Ok(WorkerExit::Completed);
            }
            let Some(mut seg) = self.acquire() else {
                return Ok(WorkerExit::Stopped);
            };
            seg.begin(self.slot, at);
            let limit = remaining.map_or(usize::MAX, |r| usize::try_from(r).unwrap_or(usize::MAX));
            let fill = seg.fill_from(&mut *body, limit, &should_stop);
            let n = seg.len() as u64;
            if n > 0 {
                offset.set(at + n);
                self.pipeline.submit(seg);
            } else {
                self.pipeline.recycle(seg);
            }
            match fill {
                Fill::Full => {}
                Fill::Stopped => return Ok(WorkerExit::Stopped),
                Fill::Eof => {
                    let at = offset.get();
                    return match end {
                        Some(e) if at < e => Err(AttemptError::PartialTransfer {
                            expected: e - self.chunk.start,
                            received: at - self.chunk.start,
                        }),
                        _ => Ok(WorkerExit::Completed),
                    };
                }
                Fill::Failed(err) => return Err(AttemptError::Interrupted(err)),
            }
        }
    }

    /// Waits for a free segment, re-checking the stop token every `acquire_timeout`.
    fn acquire(&self) -> Option<Segment> {
        loop {
            if self.should_stop() {
                return None;
            }
            if let Some(seg) = self.pipeline.acquire(self.acquire_timeout) {
                return Some(seg);
            }
        }
    }
}
