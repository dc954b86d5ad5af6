//! Syndicate - scheduled multi-platform publishing engine
//!
//! This library decides when each platform-specific publish attempt is due,
//! executes it effectively-once despite at-least-once task delivery, retries
//! transient failures with bounded backoff, and reconciles divergent
//! per-platform outcomes into one consistent status for the parent content
//! item.

pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod platforms;
pub mod queue;
pub mod scheduling;
pub mod service;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use db::{Database, ItemWithAttempts};
pub use error::{Result, SyndicateError};
pub use service::PublishPipeline;
pub use types::{
    AttemptStatus, ContentItem, ContentStatus, PublishAttempt, PublishResult, TargetAccount,
};
