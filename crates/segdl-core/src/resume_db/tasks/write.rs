//! Task write operations: insert, checkpoint, state, remove.

use anyhow::Result;
use sqlx::{Sqlite, Transaction};

use super::super::db::{unix_millis, ResumeDb};
use super::super::types::{ChunkRecord, NewTask, TaskId, TaskRecord, TaskState};
use super::size_to_db;

impl ResumeDb {
    /// Insert a new task in `state` and return its id. Everything the probe
    /// learns is filled in later by `save`.
    pub async fn insert_task(&self, task: &NewTask, state: TaskState) -> Result<TaskId> {
        let headers_json = serde_json::to_string(&task.headers)?;
        let dest_dir = task.dest_dir.to_string_lossy().into_owned();

        let row_id = sqlx::query(
            r#"
            INSERT INTO tasks (
                url, dest_dir, filename, headers_json, total_size,
                downloaded_size, state, resumable, speed_limit, created_at
            ) VALUES (?1, ?2, ?3, ?4, -1, 0, ?5, 0, ?6, ?7)
            "#,
        )
        .bind(&task.url)
        .bind(dest_dir)
        .bind(task.filename.as_deref())
        .bind(headers_json)
        .bind(state.as_str())
        .bind(task.speed_limit.map(|v| v as i64))
        .bind(unix_millis())
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        Ok(row_id)
    }

    /// Replace the task row and its whole chunk plan in one transaction.
    pub async fn save(&self, record: &TaskRecord, chunks: &[ChunkRecord]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        update_task(&mut tx, record).await?;
        sqlx::query("DELETE FROM chunks WHERE task_id = ?1")
            .bind(record.id)
            .execute(&mut *tx)
            .await?;
        for chunk in chunks {
            sqlx::query(
                r#"
                INSERT INTO chunks (task_id, chunk_index, start_offset, downloaded, length)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
            )
            .bind(record.id)
            .bind(chunk.index as i64)
            .bind(chunk.start as i64)
            .bind(chunk.downloaded as i64)
            .bind(size_to_db(chunk.length))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Update the task row only; chunks are left untouched.
    pub async fn save_record(&self, record: &TaskRecord) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        update_task(&mut tx, record).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Checkpoint: per-chunk `downloaded` plus the task's running total.
    /// Only called after the bytes it describes have been synced to disk.
    pub async fn save_progress(
        &self,
        id: TaskId,
        chunks: &[ChunkRecord],
        downloaded: u64,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for chunk in chunks {
            sqlx::query(
                r#"
                UPDATE chunks
                SET downloaded = ?1, length = ?2
                WHERE task_id = ?3 AND chunk_index = ?4
                "#,
            )
            .bind(chunk.downloaded as i64)
            .bind(size_to_db(chunk.length))
            .bind(id)
            .bind(chunk.index as i64)
            .execute(&mut *tx)
            .await?;
        }
        sqlx::query("UPDATE tasks SET downloaded_size = ?1 WHERE id = ?2")
            .bind(downloaded as i64)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Change only the state column.
    pub async fn set_state(&self, id: TaskId, state: TaskState) -> Result<()> {
        sqlx::query("UPDATE tasks SET state = ?1 WHERE id = ?2")
            .bind(state.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Drop the chunk plan, e.g. after the remote content changed.
    pub async fn delete_chunks(&self, id: TaskId) -> Result<()> {
        sqlx::query("DELETE FROM chunks WHERE task_id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Remove a task and its chunks.
    pub async fn delete(&self, id: TaskId) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM chunks WHERE task_id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM tasks WHERE id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Tasks left in flight by a crash or kill. Pausing tasks become Paused,
    /// the rest go back to Waiting. Returns how many rows changed.
    pub async fn recover_interrupted(&self) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let paused = sqlx::query("UPDATE tasks SET state = ?1 WHERE state = ?2")
            .bind(TaskState::Paused.as_str())
            .bind(TaskState::Pausing.as_str())
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let requeued = sqlx::query(
            r#"
            UPDATE tasks SET state = ?1
            WHERE state IN (?2, ?3, ?4, ?5)
            "#,
        )
        .bind(TaskState::Waiting.as_str())
        .bind(TaskState::Pending.as_str())
        .bind(TaskState::Preparing.as_str())
        .bind(TaskState::Connecting.as_str())
        .bind(TaskState::Running.as_str())
        .execute(&mut *tx)
        .await?
        .rows_affected();
        tx.commit().await?;
        Ok(paused + requeued)
    }
}

async fn update_task(tx: &mut Transaction<'_, Sqlite>, record: &TaskRecord) -> Result<()> {
    let headers_json = serde_json::to_string(&record.headers)?;
    sqlx::query(
        r#"
        UPDATE tasks
        SET url = ?1,
            dest_dir = ?2,
            filename = ?3,
            headers_json = ?4,
            total_size = ?5,
            downloaded_size = ?6,
            state = ?7,
            resumable = ?8,
            etag = ?9,
            last_modified = ?10,
            speed_limit = ?11,
            finished_at = ?12,
            error_code = ?13,
            error_message = ?14
        WHERE id = ?15
        "#,
    )
    .bind(&record.url)
    .bind(record.dest_dir.to_string_lossy().into_owned())
    .bind(record.filename.as_deref())
    .bind(headers_json)
    .bind(size_to_db(record.total_size))
    .bind(record.downloaded_size as i64)
    .bind(record.state.as_str())
    .bind(record.resumable as i64)
    .bind(record.etag.as_deref())
    .bind(record.last_modified.as_deref())
    .bind(record.speed_limit.map(|v| v as i64))
    .bind(record.finished_at)
    .bind(record.error_code.map(|c| c as i64))
    .bind(record.error_message.as_deref())
    .bind(record.id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}
