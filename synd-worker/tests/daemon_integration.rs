//! Integration tests for the synd-worker daemon

use assert_cmd::Command;
use libsyndicate::{
    AttemptStatus, ContentItem, ContentStatus, Database, PublishAttempt, TargetAccount,
};
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Setup test environment with config and database
async fn setup_test_env(sandbox_platforms: &[&str]) -> (TempDir, String, String) {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    let db_path = temp_dir.path().join("test.db");

    let sandbox_list = sandbox_platforms
        .iter()
        .map(|p| format!("\"{}\"", p))
        .collect::<Vec<_>>()
        .join(", ");

    let config_content = format!(
        r#"
[database]
path = "{}"

[scheduler]
poll_interval = 1
reclaim_interval = 1
workers = 1

[platforms]
sandbox = [{}]
"#,
        db_path.display().to_string().replace('\\', "/"),
        sandbox_list
    );

    fs::write(&config_path, config_content).unwrap();

    // Initialize the schema up front so seeding helpers can run.
    let _db = Database::new(db_path.to_str().unwrap()).await.unwrap();

    (
        temp_dir,
        config_path.to_str().unwrap().to_string(),
        db_path.to_str().unwrap().to_string(),
    )
}

/// Create a scheduled content item with one due attempt on `platform`
async fn create_due_attempt(db_path: &str, platform: &str) -> (String, String) {
    let db = Database::new(db_path).await.unwrap();
    let now = chrono::Utc::now().timestamp();

    let mut item = ContentItem::new("body/launch-teaser".to_string(), vec![platform.to_string()]);
    item.status = ContentStatus::Scheduled;
    db.create_content_item(&item).await.unwrap();

    let account = TargetAccount {
        id: format!("acct-{}", platform),
        platform: platform.to_string(),
        credential: "sandbox-token".to_string(),
        expires_at: None,
        active: true,
    };
    db.create_target_account(&account).await.unwrap();

    let attempt = PublishAttempt::new(
        item.id.clone(),
        account.id,
        platform.to_string(),
        now - 10,
    );
    let attempt_id = attempt.id.clone();
    db.create_attempt(&attempt).await.unwrap();

    (item.id, attempt_id)
}

#[tokio::test]
async fn test_once_with_empty_queue_exits_cleanly() {
    let (_temp_dir, config_path, _db_path) = setup_test_env(&["pixelgram"]).await;

    let mut cmd = Command::cargo_bin("synd-worker").unwrap();
    cmd.env("SYNDICATE_CONFIG", &config_path)
        .arg("--once")
        .assert()
        .success();
}

#[tokio::test]
async fn test_once_publishes_due_attempt() {
    let (_temp_dir, config_path, db_path) = setup_test_env(&["pixelgram"]).await;
    let (item_id, attempt_id) = create_due_attempt(&db_path, "pixelgram").await;

    let mut cmd = Command::cargo_bin("synd-worker").unwrap();
    cmd.env("SYNDICATE_CONFIG", &config_path)
        .arg("--once")
        .assert()
        .success();

    let db = Database::new(&db_path).await.unwrap();

    let attempt = db.get_attempt(&attempt_id).await.unwrap().unwrap();
    assert_eq!(attempt.status, AttemptStatus::Published);
    assert!(attempt.platform_content_id.is_some());

    let item = db.get_content_item(&item_id).await.unwrap().unwrap();
    assert_eq!(item.status, ContentStatus::Published);
    assert!(item.published_at.is_some());
}

#[tokio::test]
async fn test_once_records_failure_for_unserved_platform() {
    // "chirper" is not in the sandbox list, so no publisher serves it.
    let (_temp_dir, config_path, db_path) = setup_test_env(&["pixelgram"]).await;
    let (_item_id, attempt_id) = create_due_attempt(&db_path, "chirper").await;

    let mut cmd = Command::cargo_bin("synd-worker").unwrap();
    cmd.env("SYNDICATE_CONFIG", &config_path)
        .arg("--once")
        .assert()
        .success();

    let db = Database::new(&db_path).await.unwrap();
    let attempt = db.get_attempt(&attempt_id).await.unwrap().unwrap();
    assert_eq!(attempt.status, AttemptStatus::Failed);
    assert!(attempt
        .last_error
        .unwrap()
        .contains("no publisher registered"));
}

#[tokio::test]
async fn test_invalid_config_exits_with_config_code() {
    let temp_dir = TempDir::new().unwrap();
    let invalid_config = temp_dir.path().join("invalid.toml");
    fs::write(&invalid_config, "invalid toml content [[[").unwrap();

    let mut cmd = Command::cargo_bin("synd-worker").unwrap();
    cmd.env("SYNDICATE_CONFIG", invalid_config.to_str().unwrap())
        .arg("--once")
        .assert()
        .failure()
        .code(2);
}

#[tokio::test]
async fn test_missing_config_fails() {
    let mut cmd = Command::cargo_bin("synd-worker").unwrap();
    cmd.env("SYNDICATE_CONFIG", "/nonexistent/syndicate/config.toml")
        .arg("--once")
        .assert()
        .failure();
}

#[tokio::test]
async fn test_help_shows_usage() {
    let mut cmd = Command::cargo_bin("synd-worker").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Publishing pipeline daemon"))
        .stdout(predicate::str::contains("--once"));
}
