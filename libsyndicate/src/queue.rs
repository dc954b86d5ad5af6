//! Durable execution queue
//!
//! Workers pull execution tasks from a shared table; delivery is
//! at-least-once, so the executor carries its own duplicate guard. A task
//! that faults is re-queued with fixed backoff; once the retry budget is
//! spent the task is removed and the caller runs the terminal handler.
//! Completed tasks are deleted — publish_attempts rows are the audit trail.

use sqlx::Row;
use std::sync::Arc;

use crate::db::Database;
use crate::error::Result;

/// Backoff, in seconds, applied before each task re-run.
pub const RETRY_DELAYS: [i64; 3] = [60, 300, 900];

/// One unit of work: execute the referenced publish attempt.
#[derive(Debug, Clone)]
pub struct ExecutionTask {
    pub id: i64,
    pub attempt_id: String,
    pub run_at: i64,
    pub retry_count: i64,
}

#[derive(Clone)]
pub struct ExecutionQueue {
    db: Arc<Database>,
}

impl ExecutionQueue {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Admit one execution task for an attempt.
    pub async fn enqueue(&self, attempt_id: &str, run_at: i64) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO execution_tasks (attempt_id, run_at, retry_count, status, created_at)
            VALUES (?, ?, 0, 'queued', ?)
            "#,
        )
        .bind(attempt_id)
        .bind(run_at)
        .bind(run_at)
        .execute(self.db.pool())
        .await
        .map_err(crate::error::DbError::SqlxError)?;

        Ok(())
    }

    /// Claim the oldest due task, or None when the queue is drained.
    ///
    /// The claim is a conditional UPDATE on the pre-transition status; losing
    /// it to another worker just moves on to the next candidate.
    pub async fn claim_next(&self, now: i64) -> Result<Option<ExecutionTask>> {
        loop {
            let row = sqlx::query(
                r#"
                SELECT id, attempt_id, run_at, retry_count
                FROM execution_tasks
                WHERE status = 'queued' AND run_at <= ?
                ORDER BY run_at ASC, id ASC
                LIMIT 1
                "#,
            )
            .bind(now)
            .fetch_optional(self.db.pool())
            .await
            .map_err(crate::error::DbError::SqlxError)?;

            let Some(row) = row else {
                return Ok(None);
            };

            let task = ExecutionTask {
                id: row.get("id"),
                attempt_id: row.get("attempt_id"),
                run_at: row.get("run_at"),
                retry_count: row.get("retry_count"),
            };

            let claimed = sqlx::query(
                r#"
                UPDATE execution_tasks
                SET status = 'running', claimed_at = ?
                WHERE id = ? AND status = 'queued'
                "#,
            )
            .bind(now)
            .bind(task.id)
            .execute(self.db.pool())
            .await
            .map_err(crate::error::DbError::SqlxError)?;

            if claimed.rows_affected() == 1 {
                return Ok(Some(task));
            }
            // Another worker took it; try the next candidate.
        }
    }

    /// Remove a finished task.
    pub async fn complete(&self, task_id: i64) -> Result<()> {
        sqlx::query("DELETE FROM execution_tasks WHERE id = ?")
            .bind(task_id)
            .execute(self.db.pool())
            .await
            .map_err(crate::error::DbError::SqlxError)?;

        Ok(())
    }

    /// Re-queue a faulted task with the next fixed delay.
    ///
    /// Returns the new run_at, or None once the retry budget is spent — the
    /// task row is removed and the caller must resolve the attempt
    /// terminally.
    pub async fn retry_later(&self, task: &ExecutionTask, now: i64) -> Result<Option<i64>> {
        let retries_used = task.retry_count as usize;

        if retries_used < RETRY_DELAYS.len() {
            let run_at = now + RETRY_DELAYS[retries_used];
            sqlx::query(
                r#"
                UPDATE execution_tasks
                SET status = 'queued', retry_count = retry_count + 1,
                    run_at = ?, claimed_at = NULL
                WHERE id = ?
                "#,
            )
            .bind(run_at)
            .bind(task.id)
            .execute(self.db.pool())
            .await
            .map_err(crate::error::DbError::SqlxError)?;

            Ok(Some(run_at))
        } else {
            self.complete(task.id).await?;
            Ok(None)
        }
    }

    /// Return running tasks whose worker died to the queue.
    ///
    /// The retry counter is left alone: a lost worker is not a publish
    /// fault. Returns how many tasks were released.
    pub async fn requeue_stale_running(&self, cutoff: i64, now: i64) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE execution_tasks
            SET status = 'queued', run_at = ?, claimed_at = NULL
            WHERE status = 'running' AND claimed_at < ?
            "#,
        )
        .bind(now)
        .bind(cutoff)
        .execute(self.db.pool())
        .await
        .map_err(crate::error::DbError::SqlxError)?;

        Ok(result.rows_affected())
    }

    /// Outstanding task count (queued plus running), for dashboards.
    pub async fn depth(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM execution_tasks")
            .fetch_one(self.db.pool())
            .await
            .map_err(crate::error::DbError::SqlxError)?;

        Ok(row.get("count"))
    }
}
