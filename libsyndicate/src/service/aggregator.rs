//! Completion aggregation across sibling attempts
//!
//! After any attempt resolves, the aggregator inspects every sibling of the
//! same content item and decides whether the parent has reached a terminal
//! state. It never assumes a resolution order: workers resolving attempts
//! near-simultaneously may each run it, and re-running with the same attempt
//! set always produces the same answer.

use std::sync::Arc;
use tracing::{debug, info};

use crate::db::Database;
use crate::error::Result;
use crate::types::{AttemptStatus, ContentStatus, PublishAttempt};

#[derive(Clone)]
pub struct CompletionAggregator {
    db: Arc<Database>,
}

impl CompletionAggregator {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Re-evaluate the aggregate status of a content item.
    ///
    /// A missing item or an empty attempt set is a no-op, as is any state
    /// where work is still outstanding.
    pub async fn resolve(&self, content_item_id: &str) -> Result<()> {
        let Some(item) = self.db.get_content_item(content_item_id).await? else {
            debug!("Content item {} vanished; nothing to aggregate", content_item_id);
            return Ok(());
        };

        let attempts = self.db.attempts_for_item(content_item_id).await?;
        if attempts.is_empty() {
            return Ok(());
        }

        let Some(outcome) = aggregate(&attempts) else {
            return Ok(());
        };

        let now = chrono::Utc::now().timestamp();
        self.db.resolve_item(&item.id, outcome, now).await?;

        info!(
            "Content item {} resolved to {} ({} attempt(s))",
            item.id,
            outcome,
            attempts.len()
        );

        Ok(())
    }
}

/// Decide the aggregate outcome for a set of sibling attempts.
///
/// Returns None while any attempt is still in flight or any failure is
/// still automatically reclaimable. Partial success is surfaced as
/// published so one bad target cannot hold a multi-platform post hostage;
/// the per-attempt rows keep the detail of which targets failed.
pub fn aggregate(attempts: &[PublishAttempt]) -> Option<ContentStatus> {
    if attempts.iter().any(|a| {
        matches!(
            a.status,
            AttemptStatus::Pending | AttemptStatus::Publishing
        )
    }) {
        return None;
    }

    let total = attempts.len();
    let published = attempts
        .iter()
        .filter(|a| a.status == AttemptStatus::Published)
        .count();
    let exhausted = attempts
        .iter()
        .filter(|a| a.status == AttemptStatus::Failed && a.attempt_count >= a.max_attempts)
        .count();

    if published == total {
        Some(ContentStatus::Published)
    } else if published > 0 && exhausted > 0 && published + exhausted == total {
        Some(ContentStatus::Published)
    } else if exhausted == total {
        Some(ContentStatus::Failed)
    } else {
        // Some failures are still under the retry ceiling; wait for them.
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attempt(status: AttemptStatus, attempt_count: i64, max_attempts: i64) -> PublishAttempt {
        let mut a = PublishAttempt::new(
            "item-1".to_string(),
            "acct-1".to_string(),
            "pixelgram".to_string(),
            0,
        );
        a.status = status;
        a.attempt_count = attempt_count;
        a.max_attempts = max_attempts;
        a
    }

    #[test]
    fn test_in_flight_attempts_block_resolution() {
        let attempts = vec![
            attempt(AttemptStatus::Published, 1, 3),
            attempt(AttemptStatus::Pending, 0, 3),
        ];
        assert_eq!(aggregate(&attempts), None);

        let attempts = vec![
            attempt(AttemptStatus::Published, 1, 3),
            attempt(AttemptStatus::Publishing, 1, 3),
        ];
        assert_eq!(aggregate(&attempts), None);
    }

    #[test]
    fn test_all_published() {
        let attempts = vec![
            attempt(AttemptStatus::Published, 1, 3),
            attempt(AttemptStatus::Published, 2, 3),
        ];
        assert_eq!(aggregate(&attempts), Some(ContentStatus::Published));
    }

    #[test]
    fn test_partial_success_is_published() {
        let attempts = vec![
            attempt(AttemptStatus::Published, 1, 3),
            attempt(AttemptStatus::Failed, 3, 3),
        ];
        assert_eq!(aggregate(&attempts), Some(ContentStatus::Published));
    }

    #[test]
    fn test_all_exhausted_is_failed() {
        let attempts = vec![
            attempt(AttemptStatus::Failed, 3, 3),
            attempt(AttemptStatus::Failed, 3, 3),
            attempt(AttemptStatus::Failed, 3, 3),
        ];
        assert_eq!(aggregate(&attempts), Some(ContentStatus::Failed));
    }

    #[test]
    fn test_reclaimable_failure_defers_resolution() {
        // One published, one failed but under the ceiling: the reclaimer may
        // still turn the failure around, so nothing resolves yet.
        let attempts = vec![
            attempt(AttemptStatus::Published, 1, 3),
            attempt(AttemptStatus::Failed, 1, 3),
        ];
        assert_eq!(aggregate(&attempts), None);

        // Same when every attempt is a reclaimable failure.
        let attempts = vec![attempt(AttemptStatus::Failed, 2, 3)];
        assert_eq!(aggregate(&attempts), None);
    }

    #[test]
    fn test_order_independence() {
        let a = attempt(AttemptStatus::Published, 1, 3);
        let b = attempt(AttemptStatus::Failed, 3, 3);
        let c = attempt(AttemptStatus::Published, 2, 3);

        let orderings: [Vec<PublishAttempt>; 6] = [
            vec![a.clone(), b.clone(), c.clone()],
            vec![a.clone(), c.clone(), b.clone()],
            vec![b.clone(), a.clone(), c.clone()],
            vec![b.clone(), c.clone(), a.clone()],
            vec![c.clone(), a.clone(), b.clone()],
            vec![c, b, a],
        ];

        for ordering in &orderings {
            assert_eq!(aggregate(ordering), Some(ContentStatus::Published));
        }
    }

    #[test]
    fn test_single_attempt_outcomes() {
        assert_eq!(
            aggregate(&[attempt(AttemptStatus::Published, 1, 3)]),
            Some(ContentStatus::Published)
        );
        assert_eq!(
            aggregate(&[attempt(AttemptStatus::Failed, 3, 3)]),
            Some(ContentStatus::Failed)
        );
    }
}
