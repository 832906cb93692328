//! Settling a run: rename or keep the temp file, persist, report.

use super::{remove_temp_file, TaskOutcome, TaskRun};
use crate::error::DownloadError;
use crate::events::EngineEvent;
use crate::resume_db::{unix_millis, ChunkRecord, TaskState};
use crate::storage::TempFile;

/// Applies `outcome` to the task record and storage. Returns the outcome
/// actually reached (a failed rename turns Finished into Failed).
///
/// `chunks` is None when the run never loaded a plan; stored chunks are then
/// left as they are.
pub(super) async fn finish(
    run: &TaskRun,
    outcome: TaskOutcome,
    chunks: Option<Vec<ChunkRecord>>,
    file: Option<TempFile>,
) -> TaskOutcome {
    let id = run.id();
    let outcome = match (outcome, file) {
        (TaskOutcome::Finished, Some(file)) => match finalize(run, file).await {
            Ok(()) => TaskOutcome::Finished,
            Err(e) => TaskOutcome::Failed(e),
        },
        (TaskOutcome::Finished, None) => TaskOutcome::Failed(DownloadError::DownloadFailed(
            "temp file lost before finalize".into(),
        )),
        (other, file) => {
            drop(file);
            other
        }
    };
    let downloaded = chunks
        .as_ref()
        .map(|cs| cs.iter().map(|c| c.downloaded).sum::<u64>());

    let (state, keep_chunks) = match &outcome {
        TaskOutcome::Finished => (TaskState::Finish, false),
        TaskOutcome::Paused => (TaskState::Paused, true),
        TaskOutcome::Requeued => (TaskState::Waiting, true),
        TaskOutcome::Canceled => (TaskState::Canceled, false),
        TaskOutcome::Failed(DownloadError::ContentExpired(_)) => (TaskState::FatalError, false),
        TaskOutcome::Failed(e) if e.is_fatal() => (TaskState::FatalError, true),
        TaskOutcome::Failed(_) => (TaskState::Error, true),
    };

    if !keep_chunks && outcome != TaskOutcome::Finished {
        remove_temp_file(&run.snapshot());
    }

    run.transition(state);
    let record = run.update(|r| {
        match &outcome {
            TaskOutcome::Finished => {
                let size = downloaded.unwrap_or(r.downloaded_size);
                r.total_size = Some(r.total_size.unwrap_or(size));
                r.downloaded_size = size;
                r.finished_at = Some(unix_millis());
                r.clear_error();
            }
            TaskOutcome::Failed(e) => {
                r.error_code = Some(e.code());
                r.error_message = Some(e.to_string());
                if let Some(d) = downloaded.filter(|_| keep_chunks) {
                    r.downloaded_size = d;
                }
            }
            TaskOutcome::Canceled => {
                r.downloaded_size = 0;
            }
            TaskOutcome::Paused | TaskOutcome::Requeued => {
                if let Some(d) = downloaded {
                    r.downloaded_size = d;
                }
            }
        }
    });

    let saved = match (&chunks, keep_chunks) {
        (Some(cs), true) => run.env.db.save(&record, cs).await,
        (None, true) => run.env.db.save_record(&record).await,
        (_, false) => run.env.db.save(&record, &[]).await,
    };
    if let Err(e) = saved {
        tracing::warn!(task_id = id, error = %e, "persist final task state failed");
    }

    let events = &run.env.events;
    match &outcome {
        TaskOutcome::Finished => {
            tracing::info!(
                task_id = id,
                bytes = record.downloaded_size,
                "download finished: {}",
                record.destination().unwrap_or_default().display()
            );
            events.send(EngineEvent::Finished(record));
        }
        TaskOutcome::Paused => events.send(EngineEvent::Paused(id)),
        TaskOutcome::Requeued => events.send(EngineEvent::Waiting(id)),
        TaskOutcome::Canceled => events.send(EngineEvent::Canceled(id)),
        TaskOutcome::Failed(e) => {
            tracing::debug!(task_id = id, code = e.code(), error = %e, "task failed");
            events.send(EngineEvent::Error {
                id,
                code: e.code(),
                message: e.to_string(),
                fatal: e.is_fatal(),
            });
        }
    }
    outcome
}

async fn finalize(run: &TaskRun, file: TempFile) -> Result<(), DownloadError> {
    let Some(dest) = run.snapshot().destination() else {
        return Err(DownloadError::DownloadFailed("no destination filename".into()));
    };
    tokio::task::spawn_blocking(move || file.finalize(&dest))
        .await
        .map_err(|e| DownloadError::DownloadFailed(format!("finalize thread: {e}")))?
        .map_err(|e| DownloadError::from_storage(&e))
}
