use chrono::Utc;
use serde::{Deserialize, Serialize};

/// A single marketplace listing as observed on the upstream search page.
///
/// The canonical listing URL is the identity: two observations with the same
/// URL refer to the same real-world listing no matter how the title or image
/// differ between renders.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Listing {
    pub title: String,
    pub url: String,
    pub image_url: String,
    /// Seconds since epoch, assigned when the listing is first observed.
    /// Never updated on re-observation.
    pub observed_at: i64,
}

impl Listing {
    pub fn new(
        title: impl Into<String>,
        url: impl Into<String>,
        image_url: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            image_url: image_url.into(),
            observed_at: Utc::now().timestamp(),
        }
    }

    /// Same as [`Listing::new`] but with an explicit observation timestamp.
    pub fn observed_at(
        title: impl Into<String>,
        url: impl Into<String>,
        image_url: impl Into<String>,
        observed_at: i64,
    ) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            image_url: image_url.into(),
            observed_at,
        }
    }

    /// The key the store deduplicates on.
    pub fn identity(&self) -> &str {
        &self.url
    }
}
