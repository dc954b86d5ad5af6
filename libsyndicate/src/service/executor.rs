//! Attempt execution and the queue worker loop
//!
//! The executor carries out exactly one publish attempt end-to-end: re-read
//! state fresh, call the platform publisher under a timeout, record the
//! outcome, and hand the content item to the aggregator. The queue worker
//! wraps it with the task-layer retry policy: publisher faults re-queue the
//! task with fixed backoff, and exhaustion resolves the attempt terminally.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::db::Database;
use crate::error::{PlatformError, Result};
use crate::platforms::PublisherRegistry;
use crate::queue::{ExecutionQueue, RETRY_DELAYS};
use crate::service::aggregator::CompletionAggregator;
use crate::types::{AttemptStatus, PublishResult};

/// How one execution ended, for callers that want to log or count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionOutcome {
    Delivered,
    Rejected,
    /// Nothing to do: entities vanished or the attempt was already
    /// published (duplicate task delivery).
    Skipped,
}

#[derive(Clone)]
pub struct PublishExecutor {
    db: Arc<Database>,
    registry: Arc<PublisherRegistry>,
    aggregator: CompletionAggregator,
    timeout: Duration,
}

impl PublishExecutor {
    pub fn new(db: Arc<Database>, registry: Arc<PublisherRegistry>, timeout: Duration) -> Self {
        let aggregator = CompletionAggregator::new(Arc::clone(&db));
        Self {
            db,
            registry,
            aggregator,
            timeout,
        }
    }

    /// Execute one publish attempt.
    ///
    /// Task payloads may be stale, so everything is re-read first. Missing
    /// entities and already-published attempts are silent no-ops. A
    /// structured rejection is recorded on the attempt and absorbed here; an
    /// infrastructure fault propagates as `Err` for the task queue to retry.
    pub async fn execute(&self, attempt_id: &str) -> Result<ExecutionOutcome> {
        let Some(attempt) = self.db.get_attempt(attempt_id).await? else {
            debug!("Attempt {} no longer exists; skipping", attempt_id);
            return Ok(ExecutionOutcome::Skipped);
        };

        let Some(item) = self.db.get_content_item(&attempt.content_item_id).await? else {
            debug!(
                "Content item {} no longer exists; skipping attempt {}",
                attempt.content_item_id, attempt_id
            );
            return Ok(ExecutionOutcome::Skipped);
        };

        if attempt.status == AttemptStatus::Published {
            debug!("Attempt {} already published; duplicate delivery", attempt_id);
            return Ok(ExecutionOutcome::Skipped);
        }

        let now = chrono::Utc::now().timestamp();
        let result = match self.db.get_target_account(&attempt.target_account_id).await? {
            None => PublishResult::Rejected {
                reason: format!("target account {} not found", attempt.target_account_id),
            },
            Some(account) if !account.is_usable(now) => PublishResult::Rejected {
                reason: format!("target account {} is inactive or expired", account.id),
            },
            Some(account) => match self.registry.get(&attempt.platform) {
                None => PublishResult::Rejected {
                    reason: format!("no publisher registered for platform {}", attempt.platform),
                },
                Some(publisher) => {
                    match tokio::time::timeout(self.timeout, publisher.publish(&item, &account))
                        .await
                    {
                        // A fault from the publisher propagates to the worker.
                        Ok(result) => result?,
                        Err(_) => {
                            return Err(PlatformError::Timeout(self.timeout.as_secs()).into());
                        }
                    }
                }
            },
        };

        let resolved_at = chrono::Utc::now().timestamp();
        let outcome = match &result {
            PublishResult::Delivered {
                platform_content_id,
                platform_content_url,
            } => {
                self.db
                    .mark_published(
                        &attempt.id,
                        platform_content_id,
                        platform_content_url.as_deref(),
                        resolved_at,
                    )
                    .await?;
                info!(
                    "Attempt {} delivered to {} as {}",
                    attempt.id, attempt.platform, platform_content_id
                );
                ExecutionOutcome::Delivered
            }
            PublishResult::Rejected { reason } => {
                self.db.mark_failed(&attempt.id, reason, resolved_at).await?;
                warn!(
                    "Attempt {} rejected by {} (try {}/{}): {}",
                    attempt.id, attempt.platform, attempt.attempt_count, attempt.max_attempts,
                    reason
                );
                ExecutionOutcome::Rejected
            }
        };

        self.aggregator.resolve(&attempt.content_item_id).await?;
        Ok(outcome)
    }

    /// Resolve an attempt whose execution retries are spent.
    ///
    /// The aggregator still runs so the parent item does not wait forever on
    /// an attempt that will never come back.
    pub async fn fail_terminally(&self, attempt_id: &str, reason: &str) -> Result<()> {
        let Some(attempt) = self.db.get_attempt(attempt_id).await? else {
            return Ok(());
        };

        let now = chrono::Utc::now().timestamp();
        self.db.mark_failed(&attempt.id, reason, now).await?;
        self.aggregator.resolve(&attempt.content_item_id).await?;
        Ok(())
    }
}

/// Pulls execution tasks off the shared queue and runs them.
///
/// Many workers may run concurrently; the queue claim keeps any task on a
/// single worker at a time.
#[derive(Clone)]
pub struct QueueWorker {
    queue: ExecutionQueue,
    executor: Arc<PublishExecutor>,
}

impl QueueWorker {
    pub fn new(queue: ExecutionQueue, executor: Arc<PublishExecutor>) -> Self {
        Self { queue, executor }
    }

    /// Claim and run one due task. Returns false when the queue is drained.
    pub async fn run_once(&self, now: i64) -> Result<bool> {
        let Some(task) = self.queue.claim_next(now).await? else {
            return Ok(false);
        };

        match self.executor.execute(&task.attempt_id).await {
            Ok(_) => {
                self.queue.complete(task.id).await?;
            }
            Err(e) => match self.queue.retry_later(&task, now).await? {
                Some(next_run) => {
                    warn!(
                        "Execution of attempt {} faulted ({}); task retry {}/{} at {}",
                        task.attempt_id,
                        e,
                        task.retry_count + 1,
                        RETRY_DELAYS.len(),
                        next_run
                    );
                }
                None => {
                    warn!(
                        "Execution of attempt {} faulted with all task retries spent: {}",
                        task.attempt_id, e
                    );
                    let reason =
                        format!("gave up after {} execution retries: {}", RETRY_DELAYS.len(), e);
                    self.executor.fail_terminally(&task.attempt_id, &reason).await?;
                }
            },
        }

        Ok(true)
    }

    /// Run every task currently due. Returns the number processed.
    pub async fn drain(&self, now: i64) -> Result<usize> {
        let mut processed = 0;
        while self.run_once(now).await? {
            processed += 1;
        }
        Ok(processed)
    }
}
