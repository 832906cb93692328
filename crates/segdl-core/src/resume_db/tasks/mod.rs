//! Task and chunk CRUD, split into read and write halves.

mod read;
mod write;

use anyhow::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::collections::BTreeMap;
use std::path::PathBuf;

use super::types::{ChunkRecord, TaskRecord, TaskState};

pub(super) const TASK_COLUMNS: &str = "id, url, dest_dir, filename, headers_json, total_size, \
     downloaded_size, state, resumable, etag, last_modified, speed_limit, created_at, \
     finished_at, error_code, error_message";

fn size_to_db(size: Option<u64>) -> i64 {
    size.map(|s| s as i64).unwrap_or(-1)
}

fn size_from_db(v: i64) -> Option<u64> {
    (v >= 0).then_some(v as u64)
}

pub(super) fn task_from_row(row: &SqliteRow) -> Result<TaskRecord> {
    let headers_json: String = row.get("headers_json");
    let headers: BTreeMap<String, String> = if headers_json.is_empty() {
        BTreeMap::new()
    } else {
        serde_json::from_str(&headers_json)?
    };
    let dest_dir: String = row.get("dest_dir");
    let state: String = row.get("state");
    let speed_limit: Option<i64> = row.get("speed_limit");
    let error_code: Option<i64> = row.get("error_code");

    Ok(TaskRecord {
        id: row.get("id"),
        url: row.get("url"),
        dest_dir: PathBuf::from(dest_dir),
        filename: row.get("filename"),
        headers,
        total_size: size_from_db(row.get("total_size")),
        downloaded_size: row.get::<i64, _>("downloaded_size").max(0) as u64,
        state: TaskState::from_str(&state),
        resumable: row.get::<i64, _>("resumable") != 0,
        etag: row.get("etag"),
        last_modified: row.get("last_modified"),
        speed_limit: speed_limit.map(|v| v.max(0) as u64),
        created_at: row.get("created_at"),
        finished_at: row.get("finished_at"),
        error_code: error_code.map(|c| c as u32),
        error_message: row.get("error_message"),
    })
}

pub(super) fn chunk_from_row(row: &SqliteRow) -> ChunkRecord {
    ChunkRecord {
        index: row.get::<i64, _>("chunk_index") as u32,
        start: row.get::<i64, _>("start_offset") as u64,
        downloaded: row.get::<i64, _>("downloaded").max(0) as u64,
        length: size_from_db(row.get("length")),
    }
}
