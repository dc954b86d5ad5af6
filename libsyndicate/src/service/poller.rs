//! Schedule poller
//!
//! Finds pending attempts whose due time has passed and admits them to the
//! execution queue. The claim (status flip plus counter increment in one
//! statement) happens before the enqueue, so a crash in between cannot lead
//! to a duplicate admission on the next tick — the row is simply no longer
//! pending. Unadmitted attempts stay pending and due, so a missed tick
//! recovers by itself.

use std::sync::Arc;
use tracing::{debug, error, info};

use crate::db::Database;
use crate::error::Result;
use crate::queue::ExecutionQueue;
use crate::types::PublishAttempt;

#[derive(Clone)]
pub struct SchedulePoller {
    db: Arc<Database>,
    queue: ExecutionQueue,
    batch: u32,
}

impl SchedulePoller {
    pub fn new(db: Arc<Database>, queue: ExecutionQueue, batch: u32) -> Self {
        Self { db, queue, batch }
    }

    /// One poller pass. Returns the number of attempts admitted.
    ///
    /// A failure on one attempt never blocks the others in the same tick.
    pub async fn tick(&self, now: i64) -> Result<usize> {
        let due = self.db.due_attempts(now, self.batch).await?;
        if due.is_empty() {
            return Ok(0);
        }

        debug!("Found {} due attempt(s)", due.len());

        let mut admitted = 0;
        for attempt in due {
            match self.admit(&attempt, now).await {
                Ok(true) => admitted += 1,
                Ok(false) => {
                    // Another poller claimed it between the select and our
                    // claim; nothing to do.
                }
                Err(e) => error!("Failed to admit attempt {}: {}", attempt.id, e),
            }
        }

        Ok(admitted)
    }

    async fn admit(&self, attempt: &PublishAttempt, now: i64) -> Result<bool> {
        if !self.db.claim_pending(&attempt.id, now).await? {
            return Ok(false);
        }

        // First admission moves the owning item out of "scheduled".
        self.db.mark_item_publishing(&attempt.content_item_id).await?;
        self.queue.enqueue(&attempt.id, now).await?;

        info!(
            "Admitted attempt {} for {} (try {}/{})",
            attempt.id,
            attempt.platform,
            attempt.attempt_count + 1,
            attempt.max_attempts
        );

        Ok(true)
    }
}
