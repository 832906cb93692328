//! `segdl remove <id>` – remove a download; optionally delete its file with --delete-files.

use anyhow::{bail, Result};
use segdl_core::resume_db::{ResumeDb, TaskRecord, TaskState};
use segdl_core::storage;

use super::via_engine;
use crate::cli::control_socket::ControlCommand;

pub async fn run_remove(db: &ResumeDb, id: i64, delete_files: bool) -> Result<()> {
    if via_engine(ControlCommand::Remove { id, delete_files }).await? {
        println!("Removed task {id}");
        return Ok(());
    }
    let Some(task) = db.get_task(id).await? else {
        bail!("task {id} not found");
    };
    remove_partial(&task);
    if delete_files && task.state == TaskState::Finish {
        if let Some(path) = task.destination() {
            match storage::remove_if_exists(&path) {
                Ok(true) => tracing::debug!(path = %path.display(), "deleted file"),
                Ok(false) => {}
                Err(e) => tracing::warn!("could not delete file: {:#}", e),
            }
        }
    }
    db.delete(id).await?;
    println!("Removed task {id}");
    Ok(())
}

/// Deletes the task's `.part` file, if any.
pub(super) fn remove_partial(task: &TaskRecord) {
    if let Some(path) = task.temp_path() {
        if let Err(e) = storage::remove_if_exists(&path) {
            tracing::warn!("could not delete partial file: {:#}", e);
        }
    }
}
