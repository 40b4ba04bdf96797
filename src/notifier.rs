use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use crate::error::{Result, WatcherError};
use crate::listing::Listing;

/// Outbound message bound for the notification sink.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub content: String,
    pub image_url: Option<String>,
}

impl Message {
    /// Announcement for a newly-admitted listing: title and link in the body,
    /// the listing photo attached as an embed.
    pub fn for_listing(listing: &Listing) -> Self {
        Self {
            content: format!("{}\n{}", listing.title, listing.url),
            image_url: Some(listing.image_url.clone()),
        }
    }

    /// Plain-text operator notice.
    pub fn notice(text: impl Into<String>) -> Self {
        Self {
            content: text.into(),
            image_url: None,
        }
    }
}

/// Transport boundary for outbound notifications.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, message: &Message) -> Result<()>;
}

/// Discord-style webhook transport.
pub struct WebhookNotifier {
    client: reqwest::Client,
    webhook_url: String,
}

impl WebhookNotifier {
    pub fn new(webhook_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            webhook_url: webhook_url.into(),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn deliver(&self, message: &Message) -> Result<()> {
        let payload = match &message.image_url {
            Some(image_url) => json!({
                "content": message.content,
                "embeds": [{ "image": { "url": image_url } }],
            }),
            None => json!({ "content": message.content }),
        };

        let response = self
            .client
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| WatcherError::DeliveryFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(WatcherError::DeliveryFailed(format!(
                "webhook responded with status {}",
                response.status().as_u16()
            )));
        }

        debug!("Delivered webhook message ({} chars)", message.content.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_message_carries_title_link_and_image() {
        let listing = Listing::new(
            "Free couch",
            "https://example.com/item/1",
            "https://img/1.jpg",
        );
        let message = Message::for_listing(&listing);

        assert_eq!(message.content, "Free couch\nhttps://example.com/item/1");
        assert_eq!(message.image_url.as_deref(), Some("https://img/1.jpg"));
    }

    #[test]
    fn notice_has_no_image() {
        let message = Message::notice("Error occurred: upstream wedged");
        assert_eq!(message.content, "Error occurred: upstream wedged");
        assert!(message.image_url.is_none());
    }
}
