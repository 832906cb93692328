//! `segdl cancel <id>` – stop a download and discard its partial file.

use anyhow::{bail, Result};
use segdl_core::resume_db::{ResumeDb, TaskState};

use super::via_engine;
use crate::cli::control_socket::ControlCommand;

pub async fn run_cancel(db: &ResumeDb, id: i64) -> Result<()> {
    if via_engine(ControlCommand::Cancel(id)).await? {
        println!("Canceled task {id}");
        return Ok(());
    }
    let Some(mut task) = db.get_task(id).await? else {
        bail!("task {id} not found");
    };
    if task.state.is_terminal() {
        println!("Task {id} is already {}", task.state);
        return Ok(());
    }
    super::remove::remove_partial(&task);
    task.state = TaskState::Canceled;
    task.downloaded_size = 0;
    db.save(&task, &[]).await?;
    println!("Canceled task {id}");
    Ok(())
}
