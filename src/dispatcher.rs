use std::sync::Arc;

use tracing::instrument;

use crate::error::Result;
use crate::listing::Listing;
use crate::notifier::{Message, Notifier};
use crate::rate_limiter::RateLimiter;

/// Turns admitted listings into outbound messages, one rate-limiter lease per
/// send. Delivery failures are surfaced to the caller untouched; there is no
/// retry here, so the watcher decides what a failed notification means.
pub struct Dispatcher {
    limiter: RateLimiter,
    notifier: Arc<dyn Notifier>,
}

impl Dispatcher {
    pub fn new(limiter: RateLimiter, notifier: Arc<dyn Notifier>) -> Self {
        Self { limiter, notifier }
    }

    /// Announce a newly-admitted listing.
    #[instrument(skip_all, fields(url = %listing.url))]
    pub async fn send(&self, listing: &Listing) -> Result<()> {
        let _lease = self.limiter.acquire().await?;
        self.notifier.deliver(&Message::for_listing(listing)).await
    }

    /// Operator-facing plain-text report, through the same lease and
    /// transport path as listing announcements.
    pub async fn send_notice(&self, text: &str) -> Result<()> {
        let _lease = self.limiter.acquire().await?;
        self.notifier.deliver(&Message::notice(text)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WatcherError;
    use async_trait::async_trait;
    use std::time::Duration;

    struct RecordingNotifier {
        delivered: Arc<tokio::sync::Mutex<Vec<Message>>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn deliver(&self, message: &Message) -> Result<()> {
            self.delivered.lock().await.push(message.clone());
            Ok(())
        }
    }

    fn recording() -> (Arc<RecordingNotifier>, Arc<tokio::sync::Mutex<Vec<Message>>>) {
        let delivered = Arc::new(tokio::sync::Mutex::new(Vec::new()));
        let notifier = Arc::new(RecordingNotifier {
            delivered: delivered.clone(),
        });
        (notifier, delivered)
    }

    #[tokio::test]
    async fn sends_listing_announcement() {
        let (notifier, delivered) = recording();
        let limiter = RateLimiter::new(10, 10, Duration::from_secs(1), 10);
        let dispatcher = Dispatcher::new(limiter, notifier);

        let listing = Listing::new(
            "Free couch",
            "https://example.com/item/1",
            "https://img/1.jpg",
        );
        dispatcher.send(&listing).await.unwrap();

        let delivered = delivered.lock().await;
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].content, "Free couch\nhttps://example.com/item/1");
    }

    #[tokio::test]
    async fn saturated_queue_surfaces_rate_limit_error() {
        let (notifier, delivered) = recording();
        // One token, no refill to speak of, no queue: the second send must
        // fail instead of waiting.
        let limiter = RateLimiter::new(1, 1, Duration::from_secs(3600), 0);
        let dispatcher = Dispatcher::new(limiter, notifier);

        let listing = Listing::new(
            "Free couch",
            "https://example.com/item/1",
            "https://img/1.jpg",
        );
        dispatcher.send(&listing).await.unwrap();

        match dispatcher.send_notice("second message").await {
            Err(WatcherError::RateLimitExceeded) => {}
            other => panic!("expected RateLimitExceeded, got {:?}", other),
        }
        assert_eq!(delivered.lock().await.len(), 1);
    }
}
