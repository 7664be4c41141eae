use crate::behavior::Behavior;
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// Identifies the component that produced a behavior change.
///
/// Compared by value; every component receives its own tag at construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OriginTag(Arc<str>);

impl OriginTag {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(Arc::from(tag.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OriginTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OriginTag {
    fn from(tag: &str) -> Self {
        Self::new(tag)
    }
}

/// "Behavior of app X changed, originating from S"
#[derive(Debug, Clone, PartialEq)]
pub struct BehaviorChange {
    pub app_id: String,
    pub behavior: Behavior,
    pub origin: OriginTag,
}

impl BehaviorChange {
    pub fn new(app_id: impl Into<String>, behavior: Behavior, origin: OriginTag) -> Self {
        Self {
            app_id: app_id.into(),
            behavior,
            origin,
        }
    }
}

/// Publish/subscribe bus for behavior changes
#[derive(Debug, Clone)]
pub struct ChangeNotifier {
    sender: broadcast::Sender<BehaviorChange>,
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new(64)
    }
}

impl ChangeNotifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Announce a change to every current subscriber
    pub fn publish(&self, change: BehaviorChange) {
        trace!(app_id = %change.app_id, origin = %change.origin, "Publishing behavior change");
        // No subscribers is not an error
        let _ = self.sender.send(change);
    }

    pub fn subscribe(&self) -> BehaviorSubscription {
        BehaviorSubscription {
            receiver: self.sender.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// What a subscription yields when polled
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    Change(BehaviorChange),
    /// The subscriber fell behind and this many changes were dropped
    Lagged(u64),
    /// Every notifier handle is gone
    Closed,
}

/// A live subscription to a [`ChangeNotifier`]
#[derive(Debug)]
pub struct BehaviorSubscription {
    receiver: broadcast::Receiver<BehaviorChange>,
}

impl BehaviorSubscription {
    /// Wait for the next change. Cancel safe.
    pub async fn recv(&mut self) -> Delivery {
        match self.receiver.recv().await {
            Ok(change) => Delivery::Change(change),
            Err(broadcast::error::RecvError::Lagged(skipped)) => Delivery::Lagged(skipped),
            Err(broadcast::error::RecvError::Closed) => Delivery::Closed,
        }
    }

    pub fn unsubscribe(self) {
        debug!("Unsubscribing from behavior changes");
        drop(self.receiver);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_subscribers() {
        let notifier = ChangeNotifier::new(8);
        let mut first = notifier.subscribe();
        let mut second = notifier.subscribe();

        let change = BehaviorChange::new("com.example.editor", Behavior::Function, "prefs".into());
        notifier.publish(change.clone());

        assert_eq!(first.recv().await, Delivery::Change(change.clone()));
        assert_eq!(second.recv().await, Delivery::Change(change));
    }

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let notifier = ChangeNotifier::default();
        notifier.publish(BehaviorChange::new("a", Behavior::Media, "x".into()));
        assert_eq!(notifier.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_unsubscribe_and_close() {
        let notifier = ChangeNotifier::new(4);
        let sub = notifier.subscribe();
        assert_eq!(notifier.subscriber_count(), 1);
        sub.unsubscribe();
        assert_eq!(notifier.subscriber_count(), 0);

        let mut sub = notifier.subscribe();
        drop(notifier);
        assert_eq!(sub.recv().await, Delivery::Closed);
    }

    #[tokio::test]
    async fn test_lagged_subscriber() {
        let notifier = ChangeNotifier::new(2);
        let mut sub = notifier.subscribe();
        for i in 0..5 {
            notifier.publish(BehaviorChange::new(format!("app{i}"), Behavior::Media, "x".into()));
        }
        assert_eq!(sub.recv().await, Delivery::Lagged(3));
    }

    #[test]
    fn test_origin_compared_by_value() {
        assert_eq!(OriginTag::new("running-apps"), OriginTag::from("running-apps"));
        assert_ne!(OriginTag::new("running-apps"), OriginTag::new("rules"));
        assert_eq!(OriginTag::new("rules").to_string(), "rules");
    }
}
