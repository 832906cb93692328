//! Preparing → Connecting: network check, probe, resume validation, chunk plan.

use std::path::Path;

use super::{remove_temp_file, TaskRun};
use crate::chunker;
use crate::error::DownloadError;
use crate::events::EngineEvent;
use crate::network::check_network;
use crate::probe::{self, ProbeResult};
use crate::resume_db::{ChunkRecord, TaskRecord, TaskState};
use crate::safe_resume::validate_for_resume;
use crate::storage::{self, TempFile, TempFileBuilder};
use crate::url_model::unique_filename;

/// A consistent, persisted chunk plan and the temp file it describes.
pub(super) struct Prepared {
    pub chunks: Vec<ChunkRecord>,
    pub file: TempFile,
}

pub(super) async fn prepare(run: &TaskRun) -> Result<Prepared, DownloadError> {
    let env = &run.env;
    run.transition(TaskState::Preparing);
    let record = run.update(|r| r.clear_error());
    let id = record.id;
    if let Err(e) = env.db.save_record(&record).await {
        tracing::warn!(task_id = id, error = %e, "persist preparing state failed");
    }
    env.events.send(EngineEvent::Preparing(id));

    check_network(env.network.current(), env.settings.allow_metered())?;

    let mut chunks = env
        .db
        .load_chunks(id)
        .await
        .map_err(|e| DownloadError::CreateTask(format!("load chunk plan: {e:#}")))?;

    let probed = probe_blocking(run, &record).await?;

    if !chunks.is_empty() && record.filename.is_some() {
        if let Err(e) = validate_for_resume(&record, &chunks, &probed) {
            tracing::info!(task_id = id, "{e}; discarding stored progress");
            discard_progress(run, &record).await;
            return Err(e.into());
        }
        if !probed.resumable {
            tracing::debug!(task_id = id, "server does not honour ranges; starting over");
            chunks.clear();
        }
    } else {
        chunks.clear();
    }

    let (filename, chunks, file) = if chunks.is_empty() {
        fresh_plan(run, &record, &probed).await?
    } else {
        let filename = record.filename.clone().unwrap_or_default();
        let temp = storage::temp_path(&record.dest_dir.join(&filename));
        let (chunks, file) = reopen(run, chunks, &temp, probed.total_size).await?;
        (filename, chunks, file)
    };

    run.transition(TaskState::Connecting);
    let downloaded: u64 = chunks.iter().map(|c| c.downloaded).sum();
    let record = run.update(|r| {
        r.filename = Some(filename);
        r.total_size = probed.total_size;
        r.resumable = probed.resumable;
        r.etag = probed.etag.clone();
        r.last_modified = probed.last_modified.clone();
        r.downloaded_size = downloaded;
    });
    env.db
        .save(&record, &chunks)
        .await
        .map_err(|e| DownloadError::CreateTask(format!("persist chunk plan: {e:#}")))?;
    env.events.send(EngineEvent::RecordUpdated(record.clone()));
    tracing::debug!(
        task_id = id,
        chunks = chunks.len(),
        total = ?record.total_size,
        resumable = record.resumable,
        downloaded,
        "task prepared"
    );
    Ok(Prepared { chunks, file })
}

async fn probe_blocking(run: &TaskRun, record: &TaskRecord) -> Result<ProbeResult, DownloadError> {
    let client = std::sync::Arc::clone(&run.env.client);
    let url = record.url.clone();
    let headers = record.headers.clone();
    tokio::task::spawn_blocking(move || probe::probe(&*client, &url, &headers))
        .await
        .map_err(|e| DownloadError::DownloadFailed(format!("probe thread: {e}")))?
}

/// New plan: directory, filename, temp file sized to the total.
async fn fresh_plan(
    run: &TaskRun,
    record: &TaskRecord,
    probed: &ProbeResult,
) -> Result<(String, Vec<ChunkRecord>, TempFile), DownloadError> {
    let dir = record.dest_dir.clone();
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|e| DownloadError::CreateDir(format!("{}: {e}", dir.display())))?;

    let filename = match &record.filename {
        Some(name) => {
            let dest = dir.join(name);
            if !run.restart && dest.exists() {
                return Err(DownloadError::FileExists(dest.display().to_string()));
            }
            name.clone()
        }
        None => {
            let derived = run
                .env
                .filenames
                .derive(&record.url, probed.content_disposition.as_deref());
            unique_filename(&dir, &derived)
        }
    };

    let cfg = &run.env.config;
    let chunks = chunker::plan_chunks(
        probed.total_size,
        probed.resumable,
        cfg.threads_per_task,
        cfg.min_chunk_bytes,
    );
    let temp = storage::temp_path(&dir.join(&filename));
    let file = create_temp(temp, probed.total_size).await?;
    Ok((filename, chunks, file))
}

/// Opens the temp file of a stored plan. A missing temp file invalidates the
/// recorded progress, so the plan restarts from zero.
async fn reopen(
    run: &TaskRun,
    mut chunks: Vec<ChunkRecord>,
    temp: &Path,
    total_size: Option<u64>,
) -> Result<(Vec<ChunkRecord>, TempFile), DownloadError> {
    if temp.exists() {
        let path = temp.to_path_buf();
        let opened = tokio::task::spawn_blocking(move || TempFile::open_existing(&path))
            .await
            .map_err(|e| DownloadError::DownloadFailed(format!("open thread: {e}")))?;
        match opened {
            Ok(file) => return Ok((chunks, file)),
            Err(e) => return Err(DownloadError::from_storage(&e)),
        }
    }
    tracing::debug!(task_id = run.id(), path = %temp.display(), "temp file missing; restarting chunks");
    for c in &mut chunks {
        c.downloaded = 0;
    }
    let file = create_temp(temp.to_path_buf(), total_size).await?;
    Ok((chunks, file))
}

async fn create_temp(
    path: std::path::PathBuf,
    total_size: Option<u64>,
) -> Result<TempFile, DownloadError> {
    tokio::task::spawn_blocking(move || {
        let mut builder = TempFileBuilder::create(&path)?;
        if let Some(size) = total_size {
            builder.preallocate(size)?;
        }
        Ok::<_, anyhow::Error>(builder.build())
    })
    .await
    .map_err(|e| DownloadError::DownloadFailed(format!("create thread: {e}")))?
    .map_err(|e| DownloadError::from_storage(&e))
}

/// Drops stored chunks and the temp file after the remote content changed.
pub(super) async fn discard_progress(run: &TaskRun, record: &TaskRecord) {
    if let Err(e) = run.env.db.delete_chunks(record.id).await {
        tracing::warn!(task_id = record.id, error = %e, "delete chunk records failed");
    }
    remove_temp_file(record);
    run.update(|r| r.downloaded_size = 0);
}
