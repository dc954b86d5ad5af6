//! Core types for Syndicate

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default retry ceiling for a publish attempt.
pub const DEFAULT_MAX_ATTEMPTS: i64 = 3;

/// The authored unit of content, fanned out to one or more platforms.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: String,
    /// Reference to the authored body (owned by the authoring flow).
    pub body_ref: String,
    /// Platform tags this item targets.
    pub platforms: Vec<String>,
    pub status: ContentStatus,
    pub created_at: i64,
    pub published_at: Option<i64>,
}

impl ContentItem {
    pub fn new(body_ref: String, platforms: Vec<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            body_ref,
            platforms,
            status: ContentStatus::Draft,
            created_at: chrono::Utc::now().timestamp(),
            published_at: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ContentStatus {
    Draft,
    Scheduled,
    Publishing,
    Published,
    Failed,
}

impl ContentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Scheduled => "scheduled",
            Self::Publishing => "publishing",
            Self::Published => "published",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(Self::Draft),
            "scheduled" => Some(Self::Scheduled),
            "publishing" => Some(Self::Publishing),
            "published" => Some(Self::Published),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for ContentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One platform-specific execution record tied to a content item and a
/// target account.
///
/// Attempts are created at scheduling time (one per chosen platform) and are
/// never deleted. The status transitions are strictly ordered within one
/// attempt: pending -> publishing -> {published | failed}, with
/// failed -> publishing repeatable up to `max_attempts`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishAttempt {
    pub id: String,
    pub content_item_id: String,
    pub target_account_id: String,
    pub platform: String,
    pub status: AttemptStatus,
    pub attempt_count: i64,
    pub max_attempts: i64,
    pub due_at: i64,
    pub last_attempted_at: Option<i64>,
    pub resolved_at: Option<i64>,
    pub platform_content_id: Option<String>,
    pub platform_content_url: Option<String>,
    pub last_error: Option<String>,
    pub metadata: Option<String>,
}

impl PublishAttempt {
    pub fn new(
        content_item_id: String,
        target_account_id: String,
        platform: String,
        due_at: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            content_item_id,
            target_account_id,
            platform,
            status: AttemptStatus::Pending,
            attempt_count: 0,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            due_at,
            last_attempted_at: None,
            resolved_at: None,
            platform_content_id: None,
            platform_content_url: None,
            last_error: None,
            metadata: None,
        }
    }

    /// Whether this attempt has reached a state the aggregator treats as
    /// final: delivered, or failed with the retry ceiling spent.
    pub fn is_terminal(&self) -> bool {
        match self.status {
            AttemptStatus::Published => true,
            AttemptStatus::Failed => self.attempt_count >= self.max_attempts,
            AttemptStatus::Pending | AttemptStatus::Publishing => false,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AttemptStatus {
    Pending,
    Publishing,
    Published,
    Failed,
}

impl AttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Publishing => "publishing",
            Self::Published => "published",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "publishing" => Some(Self::Publishing),
            "published" => Some(Self::Published),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An externally issued credential bound to one platform.
///
/// Account records are read-only here; their lifecycle belongs to credential
/// management.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetAccount {
    pub id: String,
    pub platform: String,
    /// Opaque credential material handed to the publisher.
    pub credential: String,
    pub expires_at: Option<i64>,
    pub active: bool,
}

impl TargetAccount {
    /// An account is usable when it is active and not past its expiry.
    pub fn is_usable(&self, now: i64) -> bool {
        self.active && self.expires_at.is_none_or(|t| t > now)
    }
}

/// Outcome of one publisher invocation.
///
/// Expected platform rejections come back as `Rejected`; raised errors are
/// reserved for infrastructure faults (network, timeout), which the task
/// queue retries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum PublishResult {
    Delivered {
        platform_content_id: String,
        platform_content_url: Option<String>,
    },
    Rejected {
        reason: String,
    },
}
