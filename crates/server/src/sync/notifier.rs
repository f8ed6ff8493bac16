//! Coalescing of status notifications.

use std::time::Duration;

use moka::future::Cache;

use dispatch_sync_core::TrackingKey;

/// Admits at most one notification per tracking key per interval.
#[derive(Clone)]
pub struct StatusNotifier {
    recent: Cache<TrackingKey, ()>,
}

impl StatusNotifier {
    /// Create a notifier with a minimum re-notification interval.
    #[must_use]
    pub fn new(min_interval: Duration) -> Self {
        let recent = Cache::builder()
            .max_capacity(10_000)
            .time_to_live(min_interval)
            .build();
        Self { recent }
    }

    /// Whether a notification for `key` may go out now. Admitting a key
    /// starts its quiet interval.
    pub async fn admit(&self, key: &TrackingKey) -> bool {
        self.recent.entry(key.clone()).or_insert(()).await.is_fresh()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_second_notification_is_suppressed() {
        let notifier = StatusNotifier::new(Duration::from_secs(300));
        let key = TrackingKey::parse("RY-1").expect("key");

        assert!(notifier.admit(&key).await);
        assert!(!notifier.admit(&key).await);
        assert!(notifier.admit(&TrackingKey::parse("RY-2").expect("key")).await);
    }
}
