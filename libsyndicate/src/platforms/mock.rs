//! Mock publisher implementation for testing
//!
//! A configurable publisher that can deliver, reject, fault, or stall. Used
//! by integration tests to drive the pipeline without platform credentials
//! or network access, and by sandbox deployments as a stand-in delivery
//! target.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;
use uuid::Uuid;

use crate::error::{PlatformError, Result};
use crate::platforms::Publisher;
use crate::types::{ContentItem, PublishResult, TargetAccount};

/// What the mock does when invoked.
#[derive(Debug, Clone)]
enum Behavior {
    /// Return a delivered result with a generated platform id.
    Deliver,
    /// Return a structured rejection.
    Reject(String),
    /// Raise an infrastructure fault.
    Fault(PlatformError),
    /// Fault for the first N calls, then deliver.
    FaultThenDeliver(usize),
    /// Reject for the first N calls, then deliver.
    RejectThenDeliver(usize, String),
}

/// Mock publisher for one platform tag
///
/// Clones share the call counter and delivery log, so a test can keep a
/// probe handle after moving the publisher into a registry.
#[derive(Clone)]
pub struct MockPublisher {
    platform: String,
    behavior: Behavior,
    delay: Duration,
    /// Number of times publish has been called
    calls: Arc<Mutex<usize>>,
    /// (item id, account id) pairs seen, for verification
    deliveries: Arc<Mutex<Vec<(String, String)>>>,
}

impl MockPublisher {
    fn with_behavior(platform: &str, behavior: Behavior) -> Self {
        Self {
            platform: platform.to_string(),
            behavior,
            delay: Duration::from_millis(0),
            calls: Arc::new(Mutex::new(0)),
            deliveries: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A publisher that always delivers
    pub fn delivering(platform: &str) -> Self {
        Self::with_behavior(platform, Behavior::Deliver)
    }

    /// A publisher that always rejects with the given reason
    pub fn rejecting(platform: &str, reason: &str) -> Self {
        Self::with_behavior(platform, Behavior::Reject(reason.to_string()))
    }

    /// A publisher that always raises a network fault
    pub fn faulting(platform: &str, message: &str) -> Self {
        Self::with_behavior(
            platform,
            Behavior::Fault(PlatformError::Network(message.to_string())),
        )
    }

    /// A publisher that faults `n` times, then delivers
    pub fn faulting_then_delivering(platform: &str, n: usize) -> Self {
        Self::with_behavior(platform, Behavior::FaultThenDeliver(n))
    }

    /// A publisher that rejects `n` times, then delivers
    pub fn rejecting_then_delivering(platform: &str, n: usize, reason: &str) -> Self {
        Self::with_behavior(platform, Behavior::RejectThenDeliver(n, reason.to_string()))
    }

    /// Add latency before every call completes
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// How many times publish was invoked
    pub fn call_count(&self) -> usize {
        *self.calls.lock().unwrap()
    }

    /// The (item id, account id) pairs that were delivered
    pub fn deliveries(&self) -> Vec<(String, String)> {
        self.deliveries.lock().unwrap().clone()
    }
}

#[async_trait]
impl Publisher for MockPublisher {
    async fn publish(
        &self,
        item: &ContentItem,
        account: &TargetAccount,
    ) -> Result<PublishResult> {
        let call_number = {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            *calls
        };

        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }

        let deliver = |deliveries: &Arc<Mutex<Vec<(String, String)>>>| {
            deliveries
                .lock()
                .unwrap()
                .push((item.id.clone(), account.id.clone()));
            let content_id = format!("{}-{}", self.platform, Uuid::new_v4());
            Ok(PublishResult::Delivered {
                platform_content_url: Some(format!(
                    "https://{}.example/p/{}",
                    self.platform, content_id
                )),
                platform_content_id: content_id,
            })
        };

        match &self.behavior {
            Behavior::Deliver => deliver(&self.deliveries),
            Behavior::Reject(reason) => Ok(PublishResult::Rejected {
                reason: reason.clone(),
            }),
            Behavior::Fault(error) => Err(error.clone().into()),
            Behavior::FaultThenDeliver(n) => {
                if call_number <= *n {
                    Err(PlatformError::Network(format!(
                        "connection reset (call {})",
                        call_number
                    ))
                    .into())
                } else {
                    deliver(&self.deliveries)
                }
            }
            Behavior::RejectThenDeliver(n, reason) => {
                if call_number <= *n {
                    Ok(PublishResult::Rejected {
                        reason: reason.clone(),
                    })
                } else {
                    deliver(&self.deliveries)
                }
            }
        }
    }

    fn platform(&self) -> &str {
        &self.platform
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_item() -> ContentItem {
        ContentItem::new("body/1".to_string(), vec!["pixelgram".to_string()])
    }

    fn test_account() -> TargetAccount {
        TargetAccount {
            id: "acct-1".to_string(),
            platform: "pixelgram".to_string(),
            credential: "token".to_string(),
            expires_at: None,
            active: true,
        }
    }

    #[tokio::test]
    async fn test_delivering_mock() {
        let publisher = MockPublisher::delivering("pixelgram");

        let result = publisher
            .publish(&test_item(), &test_account())
            .await
            .unwrap();

        match result {
            PublishResult::Delivered {
                platform_content_id,
                platform_content_url,
            } => {
                assert!(platform_content_id.starts_with("pixelgram-"));
                assert!(platform_content_url.unwrap().contains("pixelgram.example"));
            }
            other => panic!("expected delivery, got {:?}", other),
        }

        assert_eq!(publisher.call_count(), 1);
        assert_eq!(publisher.deliveries().len(), 1);
    }

    #[tokio::test]
    async fn test_rejecting_mock() {
        let publisher = MockPublisher::rejecting("chirper", "media type not supported");

        let result = publisher
            .publish(&test_item(), &test_account())
            .await
            .unwrap();

        assert_eq!(
            result,
            PublishResult::Rejected {
                reason: "media type not supported".to_string()
            }
        );
        assert!(publisher.deliveries().is_empty());
    }

    #[tokio::test]
    async fn test_faulting_mock() {
        let publisher = MockPublisher::faulting("chirper", "connection refused");

        let result = publisher.publish(&test_item(), &test_account()).await;
        assert!(matches!(
            result,
            Err(crate::error::SyndicateError::Platform(_))
        ));
    }

    #[tokio::test]
    async fn test_fault_then_deliver() {
        let publisher = MockPublisher::faulting_then_delivering("pixelgram", 2);
        let item = test_item();
        let account = test_account();

        assert!(publisher.publish(&item, &account).await.is_err());
        assert!(publisher.publish(&item, &account).await.is_err());
        assert!(publisher.publish(&item, &account).await.is_ok());
        assert_eq!(publisher.call_count(), 3);
    }

    #[tokio::test]
    async fn test_reject_then_deliver() {
        let publisher = MockPublisher::rejecting_then_delivering("chirper", 1, "rate limited");
        let item = test_item();
        let account = test_account();

        let first = publisher.publish(&item, &account).await.unwrap();
        assert!(matches!(first, PublishResult::Rejected { .. }));

        let second = publisher.publish(&item, &account).await.unwrap();
        assert!(matches!(second, PublishResult::Delivered { .. }));
    }

    #[tokio::test]
    async fn test_clone_shares_counters() {
        let publisher = MockPublisher::delivering("pixelgram");
        let probe = publisher.clone();

        publisher
            .publish(&test_item(), &test_account())
            .await
            .unwrap();

        assert_eq!(probe.call_count(), 1);
        assert_eq!(probe.deliveries().len(), 1);
    }

    #[tokio::test]
    async fn test_delay_is_applied() {
        let publisher =
            MockPublisher::delivering("pixelgram").with_delay(Duration::from_millis(50));

        let start = std::time::Instant::now();
        publisher
            .publish(&test_item(), &test_account())
            .await
            .unwrap();
        assert!(start.elapsed() >= Duration::from_millis(50));
    }
}
