//! Error types for Syndicate

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SyndicateError>;

#[derive(Error, Debug)]
pub enum SyndicateError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Platform fault: {0}")]
    Platform(#[from] PlatformError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl SyndicateError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            SyndicateError::InvalidInput(_) => 3,
            SyndicateError::Config(_) => 2,
            SyndicateError::Database(_) => 1,
            SyndicateError::Platform(_) => 1,
        }
    }

}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database operation failed: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Infrastructure faults raised by a publisher.
///
/// Expected platform rejections are not errors; publishers report those as
/// `PublishResult::Rejected`. These variants cover the unexpected cases the
/// task queue retries.
#[derive(Error, Debug, Clone)]
pub enum PlatformError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Publish timed out after {0}s")]
    Timeout(u64),

    #[error("Platform unavailable: {0}")]
    Unavailable(String),
}
