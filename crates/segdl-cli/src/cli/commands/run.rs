//! `segdl run` – run the engine until every queued download settles.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use segdl_core::config::EngineConfig;
use segdl_core::resume_db::{ResumeDb, TaskState};
use segdl_core::{DownloadListener, Engine, EngineEvent};

use crate::cli::control_socket;

const PROGRESS_INTERVAL: Duration = Duration::from_millis(500);

pub async fn run_engine(db: ResumeDb, cfg: EngineConfig, all: bool) -> Result<()> {
    let engine = Engine::builder(db, cfg).build().await?;
    engine.set_progress_interval(PROGRESS_INTERVAL);
    engine.add_listener(Arc::new(ConsoleListener));

    let socket = control_socket::socket_path();
    let server = match &socket {
        Some(path) => match control_socket::spawn_control_listener(engine.clone(), path) {
            Ok(handle) => {
                tracing::debug!(path = %path.display(), "control socket listening");
                Some(handle)
            }
            Err(e) => {
                tracing::warn!("control socket unavailable: {:#}", e);
                None
            }
        },
        None => None,
    };

    if all {
        engine.start_all().await;
    }
    let queued = engine
        .query_active()
        .iter()
        .any(|t| t.state == TaskState::Waiting || t.state.is_in_flight());
    if !queued {
        println!("No queued downloads.");
    }

    tokio::select! {
        _ = engine.wait_idle() => {}
        _ = tokio::signal::ctrl_c() => {
            println!("Interrupted; saving progress...");
            engine.shutdown().await;
        }
    }

    if let Some(handle) = server {
        handle.abort();
    }
    if let Some(path) = socket {
        let _ = std::fs::remove_file(path);
    }
    let finished = engine.query_finished().len();
    tracing::info!(finished, "run completed");
    Ok(())
}

/// Prints one line per lifecycle event.
struct ConsoleListener;

impl DownloadListener for ConsoleListener {
    fn on_event(&self, event: &EngineEvent) {
        match event {
            EngineEvent::Started(t) => println!(
                "[{}] downloading {} -> {}",
                t.id,
                t.url,
                t.filename.as_deref().unwrap_or("?")
            ),
            EngineEvent::Progress {
                id,
                total,
                current,
                bytes_per_sec,
            } => {
                let done_mib = *current as f64 / 1_048_576.0;
                let rate_mib = *bytes_per_sec as f64 / 1_048_576.0;
                match total {
                    Some(total) if *total > 0 => println!(
                        "[{id}] {:.1} / {:.1} MiB ({:.1}%)  {:.2} MiB/s",
                        done_mib,
                        *total as f64 / 1_048_576.0,
                        *current as f64 * 100.0 / *total as f64,
                        rate_mib
                    ),
                    _ => println!("[{id}] {:.1} MiB  {:.2} MiB/s", done_mib, rate_mib),
                }
            }
            EngineEvent::Waiting(id) => println!("[{id}] waiting for a free slot"),
            EngineEvent::Paused(id) => println!("[{id}] paused"),
            EngineEvent::Canceled(id) => println!("[{id}] canceled"),
            EngineEvent::Finished(t) => match t.destination() {
                Some(path) => println!("[{}] finished: {}", t.id, path.display()),
                None => println!("[{}] finished", t.id),
            },
            EngineEvent::Error {
                id,
                code,
                message,
                fatal,
            } => {
                let kind = if *fatal { "failed" } else { "error" };
                println!("[{id}] {kind} ({code}): {message}");
            }
            _ => {}
        }
    }
}
