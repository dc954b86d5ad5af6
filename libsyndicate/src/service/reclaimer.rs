//! Retry reclaimer
//!
//! Re-admits failed attempts that are still worth another try: under the
//! retry ceiling and failed within the reclaim window. Older failures are
//! abandoned and only come back through explicit operator re-scheduling.
//!
//! The reclaimer also runs the staleness sweep: admissions that lost their
//! execution task (a worker died mid-run, or the admitting process died
//! between claim and enqueue) are returned to the queue without touching
//! the attempt counter — that admission was already counted.

use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::SchedulerConfig;
use crate::db::Database;
use crate::error::Result;
use crate::queue::ExecutionQueue;
use crate::types::PublishAttempt;

#[derive(Clone)]
pub struct RetryReclaimer {
    db: Arc<Database>,
    queue: ExecutionQueue,
    batch: u32,
    window: i64,
    stale_after: i64,
}

impl RetryReclaimer {
    pub fn new(db: Arc<Database>, queue: ExecutionQueue, scheduler: &SchedulerConfig) -> Self {
        Self {
            db,
            queue,
            batch: scheduler.reclaim_batch,
            window: scheduler.reclaim_window,
            stale_after: scheduler.stale_after,
        }
    }

    /// One reclaimer pass. Returns the number of attempts re-admitted.
    pub async fn tick(&self, now: i64) -> Result<usize> {
        let candidates = self.db.reclaim_candidates(now, self.window, self.batch).await?;

        let mut readmitted = 0;
        for attempt in candidates {
            match self.readmit(&attempt, now).await {
                Ok(true) => readmitted += 1,
                Ok(false) => {}
                Err(e) => error!("Failed to reclaim attempt {}: {}", attempt.id, e),
            }
        }

        if let Err(e) = self.sweep_stale(now).await {
            error!("Staleness sweep failed: {}", e);
        }

        Ok(readmitted)
    }

    async fn readmit(&self, attempt: &PublishAttempt, now: i64) -> Result<bool> {
        if !self.db.reclaim_failed(&attempt.id, now).await? {
            return Ok(false);
        }

        self.queue.enqueue(&attempt.id, now).await?;

        info!(
            "Reclaimed failed attempt {} for {} (try {}/{})",
            attempt.id,
            attempt.platform,
            attempt.attempt_count + 1,
            attempt.max_attempts
        );

        Ok(true)
    }

    /// Recover admissions whose execution task went missing.
    ///
    /// Runs in two steps: stalled running tasks are released back to the
    /// queue first, then any publishing attempt with no task row at all is
    /// given a fresh one. Returns the number of recoveries.
    pub async fn sweep_stale(&self, now: i64) -> Result<usize> {
        let cutoff = now - self.stale_after;

        let released = self.queue.requeue_stale_running(cutoff, now).await?;
        if released > 0 {
            warn!("Released {} stalled task(s) back to the queue", released);
        }

        let orphans = self.db.orphaned_publishing(cutoff, self.batch).await?;
        let mut requeued = 0;
        for attempt in orphans {
            warn!(
                "Attempt {} stuck in publishing with no execution task; re-enqueueing",
                attempt.id
            );
            if let Err(e) = self.requeue_orphan(&attempt.id, now).await {
                error!("Failed to re-enqueue attempt {}: {}", attempt.id, e);
                continue;
            }
            requeued += 1;
        }

        Ok(released as usize + requeued)
    }

    async fn requeue_orphan(&self, attempt_id: &str, now: i64) -> Result<()> {
        self.queue.enqueue(attempt_id, now).await?;
        // Refresh the claim stamp so the next sweep does not pick it again
        // while the new task waits its turn.
        self.db.touch_attempt(attempt_id, now).await?;
        Ok(())
    }
}
