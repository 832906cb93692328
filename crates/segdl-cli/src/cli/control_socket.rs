//! Control socket: server (during `segdl run`) and client (for `segdl pause` etc.).
//! Protocol: one line per command, `pause <id>`, `resume <id>`, `restart <id>`,
//! `cancel <id>`, `remove <id>` or `purge <id>`; the server answers each with
//! `ok` or `error: <message>`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use segdl_core::{Engine, EngineError, TaskId};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    Pause(TaskId),
    Resume { id: TaskId, restart: bool },
    Cancel(TaskId),
    Remove { id: TaskId, delete_files: bool },
}

impl ControlCommand {
    pub fn parse(line: &str) -> Option<Self> {
        let (verb, id) = line.trim().split_once(' ')?;
        let id = id.trim().parse::<TaskId>().ok()?;
        Some(match verb {
            "pause" => ControlCommand::Pause(id),
            "resume" => ControlCommand::Resume { id, restart: false },
            "restart" => ControlCommand::Resume { id, restart: true },
            "cancel" => ControlCommand::Cancel(id),
            "remove" => ControlCommand::Remove {
                id,
                delete_files: false,
            },
            "purge" => ControlCommand::Remove {
                id,
                delete_files: true,
            },
            _ => return None,
        })
    }

    pub fn to_line(self) -> String {
        match self {
            ControlCommand::Pause(id) => format!("pause {id}\n"),
            ControlCommand::Resume { id, restart: false } => format!("resume {id}\n"),
            ControlCommand::Resume { id, restart: true } => format!("restart {id}\n"),
            ControlCommand::Cancel(id) => format!("cancel {id}\n"),
            ControlCommand::Remove {
                id,
                delete_files: false,
            } => format!("remove {id}\n"),
            ControlCommand::Remove {
                id,
                delete_files: true,
            } => format!("purge {id}\n"),
        }
    }

    async fn apply(self, engine: &Engine) -> Result<(), EngineError> {
        match self {
            ControlCommand::Pause(id) => engine.pause(id).await,
            ControlCommand::Resume { id, restart } => engine.start_or_resume(id, restart).await,
            ControlCommand::Cancel(id) => engine.cancel(id).await,
            ControlCommand::Remove { id, delete_files } => engine.delete(id, delete_files).await,
        }
    }
}

/// Binds `path` (replacing a stale socket) and serves commands against `engine`.
pub fn spawn_control_listener(
    engine: Engine,
    path: impl AsRef<Path>,
) -> Result<tokio::task::JoinHandle<()>> {
    let path = path.as_ref().to_path_buf();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create {}", parent.display()))?;
    }
    let _ = std::fs::remove_file(&path);
    let listener =
        UnixListener::bind(&path).with_context(|| format!("bind {}", path.display()))?;
    let handle = tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let engine = engine.clone();
                    tokio::spawn(serve(stream, engine));
                }
                Err(e) => tracing::debug!("control socket accept: {}", e),
            }
        }
    });
    Ok(handle)
}

async fn serve(stream: UnixStream, engine: Engine) {
    let (read, mut write) = stream.into_split();
    let mut lines = BufReader::new(read).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let reply = match ControlCommand::parse(&line) {
            Some(cmd) => match cmd.apply(&engine).await {
                Ok(()) => "ok\n".to_string(),
                Err(e) => format!("error: {e}\n"),
            },
            None => format!("error: unknown command {:?}\n", line.trim()),
        };
        if write.write_all(reply.as_bytes()).await.is_err() {
            break;
        }
    }
}

/// Sends one command to a running engine. Returns None when no engine is
/// listening (no socket, or a stale one), otherwise the server's reply.
pub async fn send_command(socket_path: &Path, cmd: ControlCommand) -> Result<Option<String>> {
    if !socket_path.exists() {
        return Ok(None);
    }
    let stream = match UnixStream::connect(socket_path).await {
        Ok(s) => s,
        Err(e) => {
            tracing::debug!(path = %socket_path.display(), "control socket connect: {}", e);
            return Ok(None);
        }
    };
    let (read, mut write) = stream.into_split();
    write.write_all(cmd.to_line().as_bytes()).await?;
    write.shutdown().await?;
    let reply = BufReader::new(read)
        .lines()
        .next_line()
        .await?
        .unwrap_or_default();
    Ok(Some(reply))
}

/// Socket path used by `run` and the one-shot commands.
pub fn socket_path() -> Option<PathBuf> {
    segdl_core::control::default_control_socket_path().ok()
}
