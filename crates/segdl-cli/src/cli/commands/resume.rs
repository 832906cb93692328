//! `segdl resume <id>` – queue a paused or failed download again.

use anyhow::{bail, Result};
use segdl_core::resume_db::{ResumeDb, TaskState};

use super::via_engine;
use crate::cli::control_socket::ControlCommand;

pub async fn run_resume(db: &ResumeDb, id: i64, restart: bool) -> Result<()> {
    if via_engine(ControlCommand::Resume { id, restart }).await? {
        println!("Resumed task {id}");
        return Ok(());
    }
    let Some(mut task) = db.get_task(id).await? else {
        bail!("task {id} not found");
    };
    if task.state.is_terminal() && !restart {
        bail!("task {id} is {}; use --restart to download it again", task.state);
    }

    if restart {
        super::remove::remove_partial(&task);
        task.downloaded_size = 0;
        task.total_size = None;
        task.resumable = false;
        task.etag = None;
        task.last_modified = None;
        task.finished_at = None;
        task.clear_error();
        task.state = TaskState::Waiting;
        db.save(&task, &[]).await?;
    } else {
        db.set_state(id, TaskState::Waiting).await?;
    }
    println!("Queued task {id}; it starts with the next `segdl run`");
    Ok(())
}
