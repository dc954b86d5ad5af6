//! Service layer for the publishing pipeline
//!
//! The pipeline is driven entirely by cadence and queue, with no network
//! listener of its own:
//!
//! - `SchedulePoller`: admits due pending attempts to the execution queue
//! - `QueueWorker` + `PublishExecutor`: carry out one attempt per task
//! - `RetryReclaimer`: re-admits retryable failures and sweeps lost
//!   admissions
//! - `CompletionAggregator`: reconciles sibling outcomes into the parent
//!   content item's status
//!
//! `PublishPipeline` wires all of them over one shared database and
//! publisher registry.

pub mod aggregator;
pub mod executor;
pub mod poller;
pub mod reclaimer;

pub use aggregator::CompletionAggregator;
pub use executor::{ExecutionOutcome, PublishExecutor, QueueWorker};
pub use poller::SchedulePoller;
pub use reclaimer::RetryReclaimer;

use std::sync::Arc;
use std::time::Duration;

use crate::config::{Config, SchedulerConfig};
use crate::db::Database;
use crate::error::Result;
use crate::platforms::PublisherRegistry;
use crate::queue::ExecutionQueue;

/// Summary of one full pipeline pass
#[derive(Debug, Clone, Copy, Default)]
pub struct CycleSummary {
    pub admitted: usize,
    pub reclaimed: usize,
    pub executed: usize,
}

/// All pipeline components wired over one database and registry
pub struct PublishPipeline {
    db: Arc<Database>,
    queue: ExecutionQueue,
    poller: SchedulePoller,
    reclaimer: RetryReclaimer,
    worker: QueueWorker,
}

impl PublishPipeline {
    /// Build the pipeline from configuration, opening the database.
    pub async fn from_config(config: &Config, registry: PublisherRegistry) -> Result<Self> {
        let db_path = crate::config::resolve_db_path(&config.database.path);
        let db = Arc::new(Database::new(&db_path).await?);
        Ok(Self::with_database(db, &config.scheduler, registry))
    }

    /// Build the pipeline over an already-open database. Useful for tests
    /// and embedders that manage the connection themselves.
    pub fn with_database(
        db: Arc<Database>,
        scheduler: &SchedulerConfig,
        registry: PublisherRegistry,
    ) -> Self {
        let queue = ExecutionQueue::new(Arc::clone(&db));
        let executor = Arc::new(PublishExecutor::new(
            Arc::clone(&db),
            Arc::new(registry),
            Duration::from_secs(scheduler.task_timeout),
        ));
        let poller = SchedulePoller::new(Arc::clone(&db), queue.clone(), scheduler.poll_batch);
        let reclaimer = RetryReclaimer::new(Arc::clone(&db), queue.clone(), scheduler);
        let worker = QueueWorker::new(queue.clone(), executor);

        Self {
            db,
            queue,
            poller,
            reclaimer,
            worker,
        }
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    pub fn queue(&self) -> &ExecutionQueue {
        &self.queue
    }

    pub fn poller(&self) -> &SchedulePoller {
        &self.poller
    }

    pub fn reclaimer(&self) -> &RetryReclaimer {
        &self.reclaimer
    }

    pub fn worker(&self) -> &QueueWorker {
        &self.worker
    }

    /// One full pass: poll, reclaim, then drain every due task. Used by the
    /// daemon's `--once` mode and by tests.
    pub async fn run_cycle(&self, now: i64) -> Result<CycleSummary> {
        let admitted = self.poller.tick(now).await?;
        let reclaimed = self.reclaimer.tick(now).await?;
        let executed = self.worker.drain(now).await?;

        Ok(CycleSummary {
            admitted,
            reclaimed,
            executed,
        })
    }
}
