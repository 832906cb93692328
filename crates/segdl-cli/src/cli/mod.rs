//! CLI for the segdl download engine.

mod commands;
mod control_socket;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use segdl_core::config;
use segdl_core::resume_db::ResumeDb;

use commands::{
    run_add, run_cancel, run_completions, run_engine, run_pause, run_remove, run_resume,
    run_status, AddArgs,
};

/// Top-level CLI for segdl.
#[derive(Debug, Parser)]
#[command(name = "segdl")]
#[command(about = "segdl: resumable multi-connection downloader", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Queue a download; `segdl run` picks it up.
    Add {
        /// Direct HTTP/HTTPS URL to download.
        url: String,
        /// Directory to save into (default: config `download_dir`, else the current directory).
        #[arg(long, value_name = "DIR")]
        download_dir: Option<PathBuf>,
        /// Destination filename (default: derived from the response).
        #[arg(long, short = 'o', value_name = "NAME")]
        filename: Option<String>,
        /// Extra request header, `Name: value`. Repeatable.
        #[arg(long = "header", short = 'H', value_name = "HEADER")]
        headers: Vec<String>,
        /// Per-task speed cap in bytes per second.
        #[arg(long, value_name = "BYTES")]
        limit: Option<u64>,
    },

    /// Run the engine until every queued download settles.
    Run {
        /// Also resume paused and failed downloads.
        #[arg(long)]
        all: bool,
        /// Override `max_running_tasks` for this run.
        #[arg(long, value_name = "N")]
        max_running: Option<usize>,
    },

    /// Show status of all downloads.
    Status,

    /// Pause a download by its ID.
    Pause {
        /// Task identifier.
        id: i64,
    },

    /// Resume a paused or failed download by its ID.
    Resume {
        /// Task identifier.
        id: i64,
        /// Discard stored progress and download from scratch.
        #[arg(long)]
        restart: bool,
    },

    /// Cancel a download and discard its partial file.
    Cancel {
        /// Task identifier.
        id: i64,
    },

    /// Remove a download from the list.
    Remove {
        /// Task identifier.
        id: i64,
        /// Also delete the downloaded file if it finished.
        #[arg(long)]
        delete_files: bool,
    },

    /// Print shell completions to stdout.
    Completions {
        shell: Shell,
    },
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        if let CliCommand::Completions { shell } = cli.command {
            run_completions(shell);
            return Ok(());
        }

        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);
        let db = ResumeDb::open_default().await?;

        match cli.command {
            CliCommand::Add {
                url,
                download_dir,
                filename,
                headers,
                limit,
            } => {
                let dir = match download_dir.or_else(|| cfg.download_dir.clone()) {
                    Some(dir) => dir,
                    None => std::env::current_dir()?,
                };
                let args = AddArgs {
                    url,
                    dir,
                    filename,
                    headers,
                    limit,
                };
                run_add(&db, args).await?;
            }
            CliCommand::Run { all, max_running } => {
                let mut cfg = cfg;
                if let Some(n) = max_running {
                    cfg.max_running_tasks = n;
                }
                run_engine(db, cfg, all).await?;
            }
            CliCommand::Status => run_status(&db).await?,
            CliCommand::Pause { id } => run_pause(&db, id).await?,
            CliCommand::Resume { id, restart } => run_resume(&db, id, restart).await?,
            CliCommand::Cancel { id } => run_cancel(&db, id).await?,
            CliCommand::Remove { id, delete_files } => run_remove(&db, id, delete_files).await?,
            CliCommand::Completions { .. } => {}
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
