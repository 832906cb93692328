//! `segdl pause <id>` – pause a download. If `segdl run` is active, it stops the transfer.

use anyhow::{bail, Result};
use segdl_core::resume_db::{ResumeDb, TaskState};

use super::via_engine;
use crate::cli::control_socket::ControlCommand;

pub async fn run_pause(db: &ResumeDb, id: i64) -> Result<()> {
    if via_engine(ControlCommand::Pause(id)).await? {
        println!("Pausing task {id}");
        return Ok(());
    }
    let Some(task) = db.get_task(id).await? else {
        bail!("task {id} not found");
    };
    match task.state {
        TaskState::Pending | TaskState::Waiting | TaskState::Error => {
            db.set_state(id, TaskState::Paused).await?;
            println!("Paused task {id}");
        }
        state => println!("Task {id} is {state}; nothing to pause"),
    }
    Ok(())
}
