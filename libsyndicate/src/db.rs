//! Database operations for Syndicate
//!
//! Every mutation is a single-row round trip. Claims are conditional
//! UPDATEs filtered on the pre-transition status, so `rows_affected == 0`
//! means another worker won the row.

use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use std::path::Path;

use crate::error::Result;
use crate::types::{AttemptStatus, ContentItem, ContentStatus, PublishAttempt, TargetAccount};

/// A content item with all of its publish attempts
#[derive(Debug, Clone)]
pub struct ItemWithAttempts {
    pub item: ContentItem,
    pub attempts: Vec<PublishAttempt>,
}

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new database connection
    pub async fn new(db_path: &str) -> Result<Self> {
        let db_url = if db_path == ":memory:" {
            "sqlite::memory:".to_string()
        } else {
            let expanded_path = shellexpand::tilde(db_path).to_string();
            let path = Path::new(&expanded_path);

            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(crate::error::DbError::IoError)?;
                }
            }

            // Forward slashes work on both Windows and Unix; mode=rwc creates
            // the file if it does not exist.
            format!("sqlite://{}?mode=rwc", expanded_path.replace('\\', "/"))
        };

        let pool = SqlitePool::connect(&db_url)
            .await
            .map_err(crate::error::DbError::SqlxError)?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(crate::error::DbError::MigrationError)?;

        Ok(Self { pool })
    }

    /// Access the underlying connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ------------------------------------------------------------------
    // Content items
    // ------------------------------------------------------------------

    /// Create a new content item
    pub async fn create_content_item(&self, item: &ContentItem) -> Result<()> {
        let platforms_json = serde_json::to_string(&item.platforms)
            .map_err(|e| crate::error::SyndicateError::InvalidInput(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO content_items (id, body_ref, platforms, status, created_at, published_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&item.id)
        .bind(&item.body_ref)
        .bind(platforms_json)
        .bind(item.status.as_str())
        .bind(item.created_at)
        .bind(item.published_at)
        .execute(&self.pool)
        .await
        .map_err(crate::error::DbError::SqlxError)?;

        Ok(())
    }

    /// Get a content item by ID
    pub async fn get_content_item(&self, item_id: &str) -> Result<Option<ContentItem>> {
        let row = sqlx::query(
            r#"
            SELECT id, body_ref, platforms, status, created_at, published_at
            FROM content_items WHERE id = ?
            "#,
        )
        .bind(item_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(crate::error::DbError::SqlxError)?;

        Ok(row.map(item_from_row))
    }

    /// Move a scheduled item into publishing when its first attempt starts.
    ///
    /// Returns false when the item was already past "scheduled".
    pub async fn mark_item_publishing(&self, item_id: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE content_items SET status = 'publishing'
            WHERE id = ? AND status = 'scheduled'
            "#,
        )
        .bind(item_id)
        .execute(&self.pool)
        .await
        .map_err(crate::error::DbError::SqlxError)?;

        Ok(result.rows_affected() == 1)
    }

    /// Record the aggregate outcome for a content item.
    ///
    /// `published_at` is only stamped once; re-running with the same attempt
    /// set leaves an earlier stamp untouched.
    pub async fn resolve_item(&self, item_id: &str, status: ContentStatus, now: i64) -> Result<()> {
        let published_at = if status == ContentStatus::Published {
            Some(now)
        } else {
            None
        };

        sqlx::query(
            r#"
            UPDATE content_items
            SET status = ?, published_at = COALESCE(published_at, ?)
            WHERE id = ?
            "#,
        )
        .bind(status.as_str())
        .bind(published_at)
        .bind(item_id)
        .execute(&self.pool)
        .await
        .map_err(crate::error::DbError::SqlxError)?;

        Ok(())
    }

    // ------------------------------------------------------------------
    // Publish attempts
    // ------------------------------------------------------------------

    /// Create a publish attempt
    pub async fn create_attempt(&self, attempt: &PublishAttempt) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO publish_attempts (
                id, content_item_id, target_account_id, platform, status,
                attempt_count, max_attempts, due_at, last_attempted_at, resolved_at,
                platform_content_id, platform_content_url, last_error, metadata
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&attempt.id)
        .bind(&attempt.content_item_id)
        .bind(&attempt.target_account_id)
        .bind(&attempt.platform)
        .bind(attempt.status.as_str())
        .bind(attempt.attempt_count)
        .bind(attempt.max_attempts)
        .bind(attempt.due_at)
        .bind(attempt.last_attempted_at)
        .bind(attempt.resolved_at)
        .bind(&attempt.platform_content_id)
        .bind(&attempt.platform_content_url)
        .bind(&attempt.last_error)
        .bind(&attempt.metadata)
        .execute(&self.pool)
        .await
        .map_err(crate::error::DbError::SqlxError)?;

        Ok(())
    }

    /// Get a publish attempt by ID
    pub async fn get_attempt(&self, attempt_id: &str) -> Result<Option<PublishAttempt>> {
        let row = sqlx::query(
            r#"
            SELECT * FROM publish_attempts WHERE id = ?
            "#,
        )
        .bind(attempt_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(crate::error::DbError::SqlxError)?;

        Ok(row.map(|r| attempt_from_row(&r)))
    }

    /// All attempts belonging to one content item
    pub async fn attempts_for_item(&self, item_id: &str) -> Result<Vec<PublishAttempt>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM publish_attempts
            WHERE content_item_id = ?
            ORDER BY due_at ASC, id ASC
            "#,
        )
        .bind(item_id)
        .fetch_all(&self.pool)
        .await
        .map_err(crate::error::DbError::SqlxError)?;

        Ok(rows.iter().map(attempt_from_row).collect())
    }

    /// Pending attempts whose due_at has passed, oldest first.
    ///
    /// The limit bounds burst size when a backlog has accumulated.
    pub async fn due_attempts(&self, now: i64, limit: u32) -> Result<Vec<PublishAttempt>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM publish_attempts
            WHERE status = 'pending' AND due_at <= ?
            ORDER BY due_at ASC
            LIMIT ?
            "#,
        )
        .bind(now)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(crate::error::DbError::SqlxError)?;

        Ok(rows.iter().map(attempt_from_row).collect())
    }

    /// Claim a pending attempt for execution.
    ///
    /// The status flip and the counter increment happen in the same
    /// statement, before the execution task exists, so a duplicate admission
    /// is impossible even if the admitting process dies right after.
    pub async fn claim_pending(&self, attempt_id: &str, now: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE publish_attempts
            SET status = 'publishing',
                attempt_count = attempt_count + 1,
                last_attempted_at = ?
            WHERE id = ? AND status = 'pending'
            "#,
        )
        .bind(now)
        .bind(attempt_id)
        .execute(&self.pool)
        .await
        .map_err(crate::error::DbError::SqlxError)?;

        Ok(result.rows_affected() == 1)
    }

    /// Failed attempts still eligible for automatic reclaim: under the retry
    /// ceiling and last attempted within `window` seconds.
    pub async fn reclaim_candidates(
        &self,
        now: i64,
        window: i64,
        limit: u32,
    ) -> Result<Vec<PublishAttempt>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM publish_attempts
            WHERE status = 'failed'
              AND attempt_count < max_attempts
              AND last_attempted_at >= ?
            ORDER BY last_attempted_at ASC
            LIMIT ?
            "#,
        )
        .bind(now - window)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(crate::error::DbError::SqlxError)?;

        Ok(rows.iter().map(attempt_from_row).collect())
    }

    /// Re-admit a failed attempt for another try.
    pub async fn reclaim_failed(&self, attempt_id: &str, now: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE publish_attempts
            SET status = 'publishing',
                attempt_count = attempt_count + 1,
                last_attempted_at = ?,
                resolved_at = NULL
            WHERE id = ? AND status = 'failed' AND attempt_count < max_attempts
            "#,
        )
        .bind(now)
        .bind(attempt_id)
        .execute(&self.pool)
        .await
        .map_err(crate::error::DbError::SqlxError)?;

        Ok(result.rows_affected() == 1)
    }

    /// Publishing attempts that have no execution task left and were claimed
    /// before `cutoff` — an admission that died between the claim and the
    /// enqueue, or whose task rows were lost.
    pub async fn orphaned_publishing(&self, cutoff: i64, limit: u32) -> Result<Vec<PublishAttempt>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM publish_attempts a
            WHERE a.status = 'publishing'
              AND a.last_attempted_at < ?
              AND NOT EXISTS (
                  SELECT 1 FROM execution_tasks t WHERE t.attempt_id = a.id
              )
            ORDER BY a.last_attempted_at ASC
            LIMIT ?
            "#,
        )
        .bind(cutoff)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(crate::error::DbError::SqlxError)?;

        Ok(rows.iter().map(attempt_from_row).collect())
    }

    /// Refresh last_attempted_at so a re-queued admission is not swept twice.
    pub async fn touch_attempt(&self, attempt_id: &str, now: i64) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE publish_attempts SET last_attempted_at = ? WHERE id = ?
            "#,
        )
        .bind(now)
        .bind(attempt_id)
        .execute(&self.pool)
        .await
        .map_err(crate::error::DbError::SqlxError)?;

        Ok(())
    }

    /// Record a successful delivery.
    pub async fn mark_published(
        &self,
        attempt_id: &str,
        platform_content_id: &str,
        platform_content_url: Option<&str>,
        now: i64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE publish_attempts
            SET status = 'published',
                platform_content_id = ?,
                platform_content_url = ?,
                last_error = NULL,
                resolved_at = ?
            WHERE id = ?
            "#,
        )
        .bind(platform_content_id)
        .bind(platform_content_url)
        .bind(now)
        .bind(attempt_id)
        .execute(&self.pool)
        .await
        .map_err(crate::error::DbError::SqlxError)?;

        Ok(())
    }

    /// Record a failed execution.
    pub async fn mark_failed(&self, attempt_id: &str, error: &str, now: i64) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE publish_attempts
            SET status = 'failed',
                last_error = ?,
                resolved_at = ?
            WHERE id = ?
            "#,
        )
        .bind(error)
        .bind(now)
        .bind(attempt_id)
        .execute(&self.pool)
        .await
        .map_err(crate::error::DbError::SqlxError)?;

        Ok(())
    }

    /// Operator re-scheduling of an abandoned failed attempt: back to
    /// pending with a fresh due_at and a fresh retry budget.
    pub async fn reschedule_failed(&self, attempt_id: &str, due_at: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE publish_attempts
            SET status = 'pending',
                due_at = ?,
                attempt_count = 0,
                resolved_at = NULL
            WHERE id = ? AND status = 'failed'
            "#,
        )
        .bind(due_at)
        .bind(attempt_id)
        .execute(&self.pool)
        .await
        .map_err(crate::error::DbError::SqlxError)?;

        Ok(result.rows_affected() == 1)
    }

    // ------------------------------------------------------------------
    // Target accounts
    // ------------------------------------------------------------------

    /// Store a target account record (normally done by credential management)
    pub async fn create_target_account(&self, account: &TargetAccount) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO target_accounts (id, platform, credential, expires_at, active)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&account.id)
        .bind(&account.platform)
        .bind(&account.credential)
        .bind(account.expires_at)
        .bind(if account.active { 1 } else { 0 })
        .execute(&self.pool)
        .await
        .map_err(crate::error::DbError::SqlxError)?;

        Ok(())
    }

    /// Get a target account by ID
    pub async fn get_target_account(&self, account_id: &str) -> Result<Option<TargetAccount>> {
        let row = sqlx::query(
            r#"
            SELECT id, platform, credential, expires_at, active
            FROM target_accounts WHERE id = ?
            "#,
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(crate::error::DbError::SqlxError)?;

        Ok(row.map(|r| TargetAccount {
            id: r.get("id"),
            platform: r.get("platform"),
            credential: r.get("credential"),
            expires_at: r.get("expires_at"),
            active: r.get::<i64, _>("active") != 0,
        }))
    }

    // ------------------------------------------------------------------
    // Dashboard queries
    // ------------------------------------------------------------------

    /// Attempt counts grouped by status
    pub async fn attempt_status_counts(&self) -> Result<Vec<(String, i64)>> {
        let rows = sqlx::query(
            r#"
            SELECT status, COUNT(*) as count
            FROM publish_attempts
            GROUP BY status
            ORDER BY status
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(crate::error::DbError::SqlxError)?;

        Ok(rows
            .iter()
            .map(|r| (r.get("status"), r.get("count")))
            .collect())
    }

    /// Content item counts grouped by status
    pub async fn item_status_counts(&self) -> Result<Vec<(String, i64)>> {
        let rows = sqlx::query(
            r#"
            SELECT status, COUNT(*) as count
            FROM content_items
            GROUP BY status
            ORDER BY status
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(crate::error::DbError::SqlxError)?;

        Ok(rows
            .iter()
            .map(|r| (r.get("status"), r.get("count")))
            .collect())
    }

    /// List attempts, optionally filtered by platform and/or status
    pub async fn list_attempts(
        &self,
        platform: Option<&str>,
        status: Option<AttemptStatus>,
        limit: u32,
    ) -> Result<Vec<PublishAttempt>> {
        let mut where_clauses = vec!["1=1"];
        if platform.is_some() {
            where_clauses.push("platform = ?");
        }
        if status.is_some() {
            where_clauses.push("status = ?");
        }

        let query_str = format!(
            r#"
            SELECT * FROM publish_attempts
            WHERE {}
            ORDER BY due_at DESC
            LIMIT ?
            "#,
            where_clauses.join(" AND ")
        );

        let mut query = sqlx::query(&query_str);
        if let Some(plat) = platform {
            query = query.bind(plat);
        }
        if let Some(st) = status {
            query = query.bind(st.as_str());
        }
        query = query.bind(limit as i64);

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(crate::error::DbError::SqlxError)?;

        Ok(rows.iter().map(attempt_from_row).collect())
    }

    /// A content item together with all of its attempts
    pub async fn get_item_with_attempts(&self, item_id: &str) -> Result<Option<ItemWithAttempts>> {
        let Some(item) = self.get_content_item(item_id).await? else {
            return Ok(None);
        };
        let attempts = self.attempts_for_item(item_id).await?;
        Ok(Some(ItemWithAttempts { item, attempts }))
    }
}

fn item_from_row(r: sqlx::sqlite::SqliteRow) -> ContentItem {
    let platforms: Vec<String> =
        serde_json::from_str(&r.get::<String, _>("platforms")).unwrap_or_default();

    ContentItem {
        id: r.get("id"),
        body_ref: r.get("body_ref"),
        platforms,
        status: ContentStatus::parse(&r.get::<String, _>("status"))
            .unwrap_or(ContentStatus::Draft),
        created_at: r.get("created_at"),
        published_at: r.get("published_at"),
    }
}

fn attempt_from_row(r: &sqlx::sqlite::SqliteRow) -> PublishAttempt {
    PublishAttempt {
        id: r.get("id"),
        content_item_id: r.get("content_item_id"),
        target_account_id: r.get("target_account_id"),
        platform: r.get("platform"),
        status: AttemptStatus::parse(&r.get::<String, _>("status"))
            .unwrap_or(AttemptStatus::Pending),
        attempt_count: r.get("attempt_count"),
        max_attempts: r.get("max_attempts"),
        due_at: r.get("due_at"),
        last_attempted_at: r.get("last_attempted_at"),
        resolved_at: r.get("resolved_at"),
        platform_content_id: r.get("platform_content_id"),
        platform_content_url: r.get("platform_content_url"),
        last_error: r.get("last_error"),
        metadata: r.get("metadata"),
    }
}
