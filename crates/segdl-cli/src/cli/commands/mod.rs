//! CLI command handlers. Each command is in its own file.
//!
//! One-shot commands that change a task (pause, resume, cancel, remove) go
//! through the control socket when `segdl run` is active, so the running
//! engine stays the only writer. Otherwise they edit the database directly.

mod add;
mod cancel;
mod completions;
mod pause;
mod remove;
mod resume;
mod run;
mod status;

use anyhow::{bail, Result};

use super::control_socket::{self, ControlCommand};

pub use add::{run_add, AddArgs};
pub use cancel::run_cancel;
pub use completions::run_completions;
pub use pause::run_pause;
pub use remove::run_remove;
pub use resume::run_resume;
pub use run::run_engine;
pub use status::run_status;

/// Hands `cmd` to a running engine. Ok(false) when none is listening.
async fn via_engine(cmd: ControlCommand) -> Result<bool> {
    let Some(path) = control_socket::socket_path() else {
        return Ok(false);
    };
    match control_socket::send_command(&path, cmd).await? {
        None => Ok(false),
        Some(reply) if reply.trim() == "ok" => Ok(true),
        Some(reply) => bail!("{}", reply.trim().trim_start_matches("error: ")),
    }
}
