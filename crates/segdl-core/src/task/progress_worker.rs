//! Background task that persists chunk checkpoints for one running task.

use tokio::sync::mpsc;

use super::writer::Checkpoint;
use crate::resume_db::{ResumeDb, TaskId};

/// Persists checkpoints in arrival order until the writer drops its sender.
/// Failures are logged and skipped: the next checkpoint (or the final save)
/// covers the same bytes. Spawn this with tokio::spawn.
pub(super) async fn run_checkpoint_loop(
    mut checkpoints: mpsc::Receiver<Checkpoint>,
    db: ResumeDb,
    task_id: TaskId,
) {
    let mut saved = 0u64;
    while let Some(cp) = checkpoints.recv().await {
        match db.save_progress(task_id, &cp.chunks, cp.downloaded).await {
            Ok(()) => saved += 1,
            Err(e) => tracing::warn!(task_id, error = %e, "durable progress update failed"),
        }
    }
    tracing::debug!(task_id, saved, "checkpoint loop finished");
}
