//! Reclaimer and staleness-sweep tests: the slower retry layer.

use std::sync::Arc;

use libsyndicate::config::SchedulerConfig;
use libsyndicate::platforms::{mock::MockPublisher, PublisherRegistry};
use libsyndicate::service::PublishPipeline;
use libsyndicate::{
    AttemptStatus, ContentItem, ContentStatus, Database, PublishAttempt, TargetAccount,
};
use tempfile::TempDir;

const NOW: i64 = 1_700_000_000;
const HOUR: i64 = 3600;

async fn setup_db() -> (TempDir, Arc<Database>) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");
    let db = Database::new(db_path.to_str().unwrap()).await.unwrap();
    (temp_dir, Arc::new(db))
}

fn pipeline_with(db: &Arc<Database>, publishers: Vec<MockPublisher>) -> PublishPipeline {
    let mut registry = PublisherRegistry::new();
    for publisher in publishers {
        registry.register(Box::new(publisher));
    }
    PublishPipeline::with_database(Arc::clone(db), &SchedulerConfig::default(), registry)
}

/// A scheduled item with one attempt on `platform`, plus an active account.
async fn seed_attempt(
    db: &Database,
    platform: &str,
    due_at: i64,
    max_attempts: i64,
) -> (ContentItem, PublishAttempt) {
    let mut item = ContentItem::new("body/1".to_string(), vec![platform.to_string()]);
    item.status = ContentStatus::Scheduled;
    db.create_content_item(&item).await.unwrap();

    let account = TargetAccount {
        id: format!("acct-{}", platform),
        platform: platform.to_string(),
        credential: "token".to_string(),
        expires_at: None,
        active: true,
    };
    db.create_target_account(&account).await.unwrap();

    let mut attempt = PublishAttempt::new(
        item.id.clone(),
        account.id,
        platform.to_string(),
        due_at,
    );
    attempt.max_attempts = max_attempts;
    db.create_attempt(&attempt).await.unwrap();

    (item, attempt)
}

#[tokio::test]
async fn test_recent_failure_is_readmitted() {
    let (_temp, db) = setup_db().await;
    let (_item, attempt) = seed_attempt(&db, "chirper", NOW - 10, 3).await;

    let pipeline = pipeline_with(&db, vec![MockPublisher::rejecting("chirper", "rate limited")]);

    // First try fails at NOW: attempt_count 1, last_attempted_at NOW.
    pipeline.run_cycle(NOW).await.unwrap();
    let failed = db.get_attempt(&attempt.id).await.unwrap().unwrap();
    assert_eq!(failed.status, AttemptStatus::Failed);
    assert_eq!(failed.attempt_count, 1);

    // Twenty hours later the failure is still inside the 24h window.
    let readmitted = pipeline.reclaimer().tick(NOW + 20 * HOUR).await.unwrap();
    assert_eq!(readmitted, 1);

    let reclaimed = db.get_attempt(&attempt.id).await.unwrap().unwrap();
    assert_eq!(reclaimed.status, AttemptStatus::Publishing);
    assert_eq!(reclaimed.attempt_count, 2);
    assert_eq!(pipeline.queue().depth().await.unwrap(), 1);
}

#[tokio::test]
async fn test_old_failure_is_abandoned() {
    let (_temp, db) = setup_db().await;
    let (_item, attempt) = seed_attempt(&db, "chirper", NOW - 10, 3).await;

    let pipeline = pipeline_with(&db, vec![MockPublisher::rejecting("chirper", "rate limited")]);
    pipeline.run_cycle(NOW).await.unwrap();

    // Twenty-five hours later the failure fell out of the 24h window:
    // automatic reclaim abandons it.
    let readmitted = pipeline.reclaimer().tick(NOW + 25 * HOUR).await.unwrap();
    assert_eq!(readmitted, 0);

    let untouched = db.get_attempt(&attempt.id).await.unwrap().unwrap();
    assert_eq!(untouched.status, AttemptStatus::Failed);
    assert_eq!(untouched.attempt_count, 1);
    assert_eq!(pipeline.queue().depth().await.unwrap(), 0);
}

#[tokio::test]
async fn test_attempt_budget_is_never_exceeded() {
    let (_temp, db) = setup_db().await;
    let (item, attempt) = seed_attempt(&db, "chirper", NOW - 10, 2).await;

    let mock = MockPublisher::rejecting("chirper", "account flagged");
    let probe = mock.clone();
    let pipeline = pipeline_with(&db, vec![mock]);

    // Try 1 via the poller, try 2 via the reclaimer.
    pipeline.run_cycle(NOW).await.unwrap();
    pipeline.reclaimer().tick(NOW + HOUR).await.unwrap();
    pipeline.worker().drain(NOW + HOUR).await.unwrap();

    let spent = db.get_attempt(&attempt.id).await.unwrap().unwrap();
    assert_eq!(spent.status, AttemptStatus::Failed);
    assert_eq!(spent.attempt_count, 2);

    // Ceiling reached: further reclaimer passes never touch it.
    for tick in 2..5 {
        pipeline.reclaimer().tick(NOW + tick * HOUR).await.unwrap();
    }
    let still_spent = db.get_attempt(&attempt.id).await.unwrap().unwrap();
    assert_eq!(still_spent.attempt_count, 2, "counter must not pass max_attempts");
    assert_eq!(probe.call_count(), 2);

    // And the exhausted attempt resolved the parent.
    let item = db.get_content_item(&item.id).await.unwrap().unwrap();
    assert_eq!(item.status, ContentStatus::Failed);
}

#[tokio::test]
async fn test_reclaimed_attempt_can_still_succeed() {
    let (_temp, db) = setup_db().await;
    let (item, attempt) = seed_attempt(&db, "chirper", NOW - 10, 3).await;

    let pipeline = pipeline_with(
        &db,
        vec![MockPublisher::rejecting_then_delivering(
            "chirper",
            1,
            "temporarily throttled",
        )],
    );

    pipeline.run_cycle(NOW).await.unwrap();
    let failed = db.get_attempt(&attempt.id).await.unwrap().unwrap();
    assert_eq!(failed.status, AttemptStatus::Failed);
    assert_eq!(failed.last_error.as_deref(), Some("temporarily throttled"));

    pipeline.reclaimer().tick(NOW + HOUR).await.unwrap();
    pipeline.worker().drain(NOW + HOUR).await.unwrap();

    let recovered = db.get_attempt(&attempt.id).await.unwrap().unwrap();
    assert_eq!(recovered.status, AttemptStatus::Published);
    assert_eq!(recovered.attempt_count, 2);
    assert_eq!(recovered.last_error, None);

    let item = db.get_content_item(&item.id).await.unwrap().unwrap();
    assert_eq!(item.status, ContentStatus::Published);
}

#[tokio::test]
async fn test_claim_crash_gap_is_not_reselected_and_is_swept() {
    let (_temp, db) = setup_db().await;
    let (_item, attempt) = seed_attempt(&db, "pixelgram", NOW - 10, 3).await;

    let mock = MockPublisher::delivering("pixelgram");
    let probe = mock.clone();
    let pipeline = pipeline_with(&db, vec![mock]);

    // The admitting process claims the attempt, then dies before the
    // enqueue: claimed but no execution task exists.
    assert!(db.claim_pending(&attempt.id, NOW).await.unwrap());
    assert_eq!(pipeline.queue().depth().await.unwrap(), 0);

    // A later poller tick must not re-admit it; it is no longer pending.
    let admitted = pipeline.poller().tick(NOW + 60).await.unwrap();
    assert_eq!(admitted, 0);
    let stuck = db.get_attempt(&attempt.id).await.unwrap().unwrap();
    assert_eq!(stuck.status, AttemptStatus::Publishing);
    assert_eq!(stuck.attempt_count, 1);

    // The staleness sweep hands it a fresh task once the claim is old
    // enough, without consuming more of the attempt budget.
    let stale_after = SchedulerConfig::default().stale_after;
    let recovered = pipeline.reclaimer().sweep_stale(NOW + stale_after + 1).await.unwrap();
    assert_eq!(recovered, 1);

    pipeline.worker().drain(NOW + stale_after + 1).await.unwrap();
    let delivered = db.get_attempt(&attempt.id).await.unwrap().unwrap();
    assert_eq!(delivered.status, AttemptStatus::Published);
    assert_eq!(delivered.attempt_count, 1);
    assert_eq!(probe.call_count(), 1);
}

#[tokio::test]
async fn test_sweep_leaves_live_admissions_alone() {
    let (_temp, db) = setup_db().await;
    let (_item, _attempt) = seed_attempt(&db, "pixelgram", NOW - 10, 3).await;

    let pipeline = pipeline_with(&db, vec![MockPublisher::delivering("pixelgram")]);

    // Admitted normally: a queued task exists, nothing is orphaned no
    // matter how old the claim looks.
    pipeline.poller().tick(NOW).await.unwrap();
    let stale_after = SchedulerConfig::default().stale_after;
    let recovered = pipeline
        .reclaimer()
        .sweep_stale(NOW + stale_after + HOUR)
        .await
        .unwrap();
    assert_eq!(recovered, 0);
    assert_eq!(pipeline.queue().depth().await.unwrap(), 1);
}

#[tokio::test]
async fn test_sweep_releases_task_of_dead_worker() {
    let (_temp, db) = setup_db().await;
    let (_item, attempt) = seed_attempt(&db, "pixelgram", NOW - 10, 3).await;

    let pipeline = pipeline_with(&db, vec![MockPublisher::delivering("pixelgram")]);
    pipeline.poller().tick(NOW).await.unwrap();

    // A worker claims the task and never comes back.
    let task = pipeline.queue().claim_next(NOW).await.unwrap().unwrap();
    assert_eq!(task.attempt_id, attempt.id);

    let stale_after = SchedulerConfig::default().stale_after;
    let recovered = pipeline.reclaimer().sweep_stale(NOW + stale_after + 1).await.unwrap();
    assert_eq!(recovered, 1);

    // The released task runs to completion on a healthy worker.
    pipeline.worker().drain(NOW + stale_after + 1).await.unwrap();
    let delivered = db.get_attempt(&attempt.id).await.unwrap().unwrap();
    assert_eq!(delivered.status, AttemptStatus::Published);
}

#[tokio::test]
async fn test_one_bad_candidate_does_not_block_the_tick() {
    let (_temp, db) = setup_db().await;

    // Two failed attempts, one on a platform nobody serves. Both are
    // re-admitted; the unserved one fails again at execution time, the
    // healthy one delivers.
    let (_item_a, attempt_a) = seed_attempt(&db, "ghostnet", NOW - 10, 3).await;
    let (_item_b, attempt_b) = seed_attempt(&db, "pixelgram", NOW - 10, 3).await;

    let pipeline = pipeline_with(&db, vec![MockPublisher::delivering("pixelgram")]);
    pipeline.run_cycle(NOW).await.unwrap();

    let a = db.get_attempt(&attempt_a.id).await.unwrap().unwrap();
    let b = db.get_attempt(&attempt_b.id).await.unwrap().unwrap();
    assert_eq!(a.status, AttemptStatus::Failed);
    assert_eq!(b.status, AttemptStatus::Published);

    let readmitted = pipeline.reclaimer().tick(NOW + HOUR).await.unwrap();
    assert_eq!(readmitted, 1, "only the unserved platform needs another try");
}
