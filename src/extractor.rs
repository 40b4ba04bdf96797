use std::time::Duration;

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info, instrument, warn};

use crate::error::{Result, WatcherError};
use crate::listing::Listing;
use crate::session::Session;

/// Produces the current set of candidate listings from the upstream page,
/// in the upstream's own order (newest first).
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, session: &Session) -> Result<Vec<Listing>>;
}

/// Scrapes listing cards out of the rendered marketplace search page.
///
/// The card selector matches the title node of each listing card. The listing
/// link is the nearest enclosing `<a>`, and the photo is the first `<img>`
/// under that anchor. Cards missing either are dropped.
pub struct MarketplaceExtractor {
    target_url: String,
    base: reqwest::Url,
    card_selector: Selector,
    image_selector: Selector,
    attempts: u32,
    retry_delay: Duration,
}

impl MarketplaceExtractor {
    pub fn new(
        target_url: impl Into<String>,
        card_selector: &str,
        attempts: u32,
        retry_delay: Duration,
    ) -> Result<Self> {
        let target_url = target_url.into();
        let base = reqwest::Url::parse(&target_url)
            .map_err(|e| WatcherError::Config(format!("invalid target URL '{target_url}': {e}")))?;
        let card_selector = Selector::parse(card_selector).map_err(|e| {
            WatcherError::Config(format!("invalid listing selector '{card_selector}': {e}"))
        })?;
        let image_selector = Selector::parse("img").unwrap();

        Ok(Self {
            target_url,
            base,
            card_selector,
            image_selector,
            attempts,
            retry_delay,
        })
    }

    fn parse_listings(&self, html: &str) -> Vec<Listing> {
        let document = Html::parse_document(html);
        let mut listings = Vec::new();

        for card in document.select(&self.card_selector) {
            let title = card.text().collect::<String>().trim().to_string();
            if title.is_empty() {
                continue;
            }

            // The whole card, photo included, sits inside one anchor.
            let Some(anchor) = card
                .ancestors()
                .filter_map(ElementRef::wrap)
                .find(|el| el.value().name() == "a")
            else {
                continue;
            };
            let Some(href) = anchor.value().attr("href") else {
                continue;
            };
            let Ok(url) = self.base.join(href) else {
                debug!("Dropping card with unusable href '{}'", href);
                continue;
            };
            let Some(image_url) = anchor
                .select(&self.image_selector)
                .next()
                .and_then(|img| img.value().attr("src"))
            else {
                continue;
            };

            listings.push(Listing::new(title, url.to_string(), image_url));
        }

        listings
    }
}

#[async_trait]
impl Extractor for MarketplaceExtractor {
    /// Fetch and scrape the search page, re-fetching a few times with a fixed
    /// delay when nothing matches yet (the upstream renders lazily).
    #[instrument(skip_all)]
    async fn extract(&self, session: &Session) -> Result<Vec<Listing>> {
        for attempt in 1..=self.attempts {
            let body = session
                .client()
                .get(&self.target_url)
                .send()
                .await?
                .text()
                .await?;

            let listings = self.parse_listings(&body);
            if !listings.is_empty() {
                info!("Extracted {} listings", listings.len());
                return Ok(listings);
            }

            if attempt < self.attempts {
                warn!(
                    "No listings on attempt {}/{}, retrying in {:?}",
                    attempt, self.attempts, self.retry_delay
                );
                tokio::time::sleep(self.retry_delay).await;
            }
        }

        Err(WatcherError::ExtractionEmpty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> MarketplaceExtractor {
        MarketplaceExtractor::new(
            "https://market.example.com/search?query=free",
            ".listing-title",
            1,
            Duration::from_secs(1),
        )
        .unwrap()
    }

    #[test]
    fn parses_cards_into_listings() {
        let html = r#"
            <html><body>
              <a href="/item/1">
                <div><img src="https://img.example.com/1.jpg"></div>
                <div><span class="listing-title">Free couch</span></div>
              </a>
              <a href="https://market.example.com/item/2">
                <img src="https://img.example.com/2.jpg">
                <span class="listing-title">Free table</span>
              </a>
            </body></html>
        "#;

        let listings = extractor().parse_listings(html);

        assert_eq!(listings.len(), 2);
        assert_eq!(listings[0].title, "Free couch");
        assert_eq!(listings[0].url, "https://market.example.com/item/1");
        assert_eq!(listings[0].image_url, "https://img.example.com/1.jpg");
        assert_eq!(listings[1].url, "https://market.example.com/item/2");
    }

    #[test]
    fn drops_cards_without_anchor_or_image() {
        let html = r#"
            <html><body>
              <div><span class="listing-title">Orphan title</span></div>
              <a href="/item/3"><span class="listing-title">No photo</span></a>
              <a><img src="x.jpg"><span class="listing-title">No href</span></a>
            </body></html>
        "#;

        assert!(extractor().parse_listings(html).is_empty());
    }

    #[test]
    fn rejects_unparseable_selector() {
        let result = MarketplaceExtractor::new(
            "https://market.example.com/search",
            ":::",
            1,
            Duration::from_secs(1),
        );
        assert!(matches!(result, Err(WatcherError::Config(_))));
    }
}
