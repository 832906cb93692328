//! Task read operations: load, list, filter.

use anyhow::Result;

use super::super::db::ResumeDb;
use super::super::types::{ChunkRecord, TaskId, TaskRecord, TaskState};
use super::{chunk_from_row, task_from_row, TASK_COLUMNS};

impl ResumeDb {
    /// Fetch a task record without its chunks.
    pub async fn get_task(&self, id: TaskId) -> Result<Option<TaskRecord>> {
        let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(task_from_row).transpose()
    }

    /// Chunk records of a task, in plan order.
    pub async fn load_chunks(&self, id: TaskId) -> Result<Vec<ChunkRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT chunk_index, start_offset, downloaded, length
            FROM chunks
            WHERE task_id = ?1
            ORDER BY chunk_index ASC
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(chunk_from_row).collect())
    }

    /// Task record and its chunks, read in one transaction.
    pub async fn load(&self, id: TaskId) -> Result<Option<(TaskRecord, Vec<ChunkRecord>)>> {
        let mut tx = self.pool.begin().await?;
        let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1");
        let Some(row) = sqlx::query(&sql).bind(id).fetch_optional(&mut *tx).await? else {
            tx.commit().await?;
            return Ok(None);
        };
        let record = task_from_row(&row)?;
        let rows = sqlx::query(
            r#"
            SELECT chunk_index, start_offset, downloaded, length
            FROM chunks
            WHERE task_id = ?1
            ORDER BY chunk_index ASC
            "#,
        )
        .bind(id)
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(Some((record, rows.iter().map(chunk_from_row).collect())))
    }

    /// All tasks, oldest first.
    pub async fn list_tasks(&self) -> Result<Vec<TaskRecord>> {
        let sql = format!("SELECT {TASK_COLUMNS} FROM tasks ORDER BY created_at ASC, id ASC");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(task_from_row).collect()
    }

    /// Tasks whose state is one of `states`, newest first.
    pub async fn list_in_states(&self, states: &[TaskState]) -> Result<Vec<TaskRecord>> {
        if states.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = (1..=states.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE state IN ({placeholders}) \
             ORDER BY created_at DESC, id DESC"
        );
        let mut query = sqlx::query(&sql);
        for st in states {
            query = query.bind(st.as_str());
        }
        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(task_from_row).collect()
    }

    /// Finished tasks, most recently finished first.
    pub async fn list_finished(&self) -> Result<Vec<TaskRecord>> {
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE state = ?1 \
             ORDER BY finished_at DESC, id DESC"
        );
        let rows = sqlx::query(&sql)
            .bind(TaskState::Finish.as_str())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(task_from_row).collect()
    }
}
