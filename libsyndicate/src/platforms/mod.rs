//! Publisher abstraction and registry
//!
//! One publisher per distribution platform, behind a single capability
//! trait. The executor only relies on the contract: a call either returns a
//! `PublishResult` (delivered, or a structured rejection) or raises a
//! `PlatformError` for an infrastructure fault, and never outlives the
//! enforced execution timeout.

use async_trait::async_trait;
use std::collections::HashMap;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::types::{ContentItem, PublishResult, TargetAccount};

// Mock publisher is available for all builds (not just tests) so
// integration tests and sandbox deployments can run the full pipeline.
pub mod mock;

/// Capability contract for delivering content to one platform.
///
/// Implementations must treat expected platform rejections (validation,
/// policy, revoked authorization) as `PublishResult::Rejected` and reserve
/// `Err` strictly for faults worth retrying at the task layer.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Attempt delivery of the item using the given account's credentials.
    async fn publish(
        &self,
        item: &ContentItem,
        account: &TargetAccount,
    ) -> Result<PublishResult>;

    /// Lowercase platform tag this publisher serves (e.g. "pixelgram").
    fn platform(&self) -> &str;
}

/// Pure mapping from platform tag to publisher implementation.
pub struct PublisherRegistry {
    publishers: HashMap<String, Box<dyn Publisher>>,
}

impl PublisherRegistry {
    pub fn new() -> Self {
        Self {
            publishers: HashMap::new(),
        }
    }

    /// Register a publisher under its platform tag. A later registration
    /// for the same tag replaces the earlier one.
    pub fn register(&mut self, publisher: Box<dyn Publisher>) {
        self.publishers
            .insert(publisher.platform().to_string(), publisher);
    }

    pub fn get(&self, platform: &str) -> Option<&dyn Publisher> {
        self.publishers.get(platform).map(|p| p.as_ref())
    }

    pub fn platforms(&self) -> Vec<&str> {
        self.publishers.keys().map(|k| k.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.publishers.is_empty()
    }
}

impl Default for PublisherRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the registry a deployment configured.
///
/// Real platform publishers are wired in by the embedding deployment; the
/// configuration only controls which tags the built-in sandbox publisher
/// serves.
pub fn registry_from_config(config: &Config) -> PublisherRegistry {
    let mut registry = PublisherRegistry::new();

    for tag in &config.platforms.sandbox {
        info!("Registering sandbox publisher for platform: {}", tag);
        registry.register(Box::new(mock::MockPublisher::delivering(tag)));
    }

    if registry.is_empty() {
        warn!("No publishers configured; due attempts will fail until one is registered");
    }

    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, DatabaseConfig, PlatformsConfig, SchedulerConfig};

    #[test]
    fn test_registry_lookup_by_tag() {
        let mut registry = PublisherRegistry::new();
        registry.register(Box::new(mock::MockPublisher::delivering("pixelgram")));
        registry.register(Box::new(mock::MockPublisher::delivering("chirper")));

        assert!(registry.get("pixelgram").is_some());
        assert!(registry.get("chirper").is_some());
        assert!(registry.get("unknown").is_none());
        assert_eq!(registry.platforms().len(), 2);
    }

    #[test]
    fn test_registry_replaces_same_tag() {
        let mut registry = PublisherRegistry::new();
        registry.register(Box::new(mock::MockPublisher::delivering("pixelgram")));
        registry.register(Box::new(mock::MockPublisher::rejecting(
            "pixelgram",
            "maintenance",
        )));

        assert_eq!(registry.platforms().len(), 1);
    }

    #[test]
    fn test_registry_from_config_sandbox_tags() {
        let config = Config {
            database: DatabaseConfig {
                path: ":memory:".to_string(),
            },
            scheduler: SchedulerConfig::default(),
            platforms: PlatformsConfig {
                sandbox: vec!["pixelgram".to_string()],
            },
        };

        let registry = registry_from_config(&config);
        assert!(registry.get("pixelgram").is_some());
        assert!(registry.get("chirper").is_none());

        let empty = registry_from_config(&Config {
            platforms: PlatformsConfig::default(),
            ..config
        });
        assert!(empty.is_empty());
    }
}
