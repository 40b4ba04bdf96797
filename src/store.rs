use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, info};

use crate::error::{Result, WatcherError};
use crate::listing::Listing;

/// Durable set of previously-observed listings, keyed by [`Listing::identity`].
///
/// The collection is insertion-ordered for persistence and backed by a JSON
/// array on disk. It is loaded lazily on first use and fully rewritten after
/// every successful admission. Eviction of listings older than the retention
/// window happens at save time, not continuously.
pub struct ListingStore {
    path: PathBuf,
    retention_secs: i64,
    loaded: Option<Loaded>,
}

struct Loaded {
    listings: Vec<Listing>,
    identities: HashSet<String>,
}

impl ListingStore {
    pub fn new(path: impl Into<PathBuf>, retention_secs: i64) -> Self {
        Self {
            path: path.into(),
            retention_secs,
            loaded: None,
        }
    }

    /// Record a listing if its identity has not been seen before.
    ///
    /// Returns `true` and persists the updated collection when the listing is
    /// novel; returns `false` and leaves storage untouched when a listing
    /// with the same identity is already present. This is the sole
    /// deduplication gate and must be consulted before any notification is
    /// sent.
    pub fn admit(&mut self, listing: &Listing) -> Result<bool> {
        let path = self.path.clone();
        let retention_secs = self.retention_secs;
        let loaded = self.ensure_loaded()?;

        if loaded.identities.contains(listing.identity()) {
            return Ok(false);
        }

        loaded.listings.push(listing.clone());
        loaded.identities.insert(listing.identity().to_string());

        Self::evict_stale(loaded, retention_secs);
        Self::persist(&path, &loaded.listings)?;

        Ok(true)
    }

    /// The currently stored listings, in insertion order.
    pub fn listings(&mut self) -> Result<&[Listing]> {
        Ok(&self.ensure_loaded()?.listings)
    }

    fn ensure_loaded(&mut self) -> Result<&mut Loaded> {
        if self.loaded.is_none() {
            self.loaded = Some(Self::load(&self.path)?);
        }
        Ok(self.loaded.as_mut().expect("store loaded above"))
    }

    /// Load the durable collection, creating an empty artifact on first run.
    ///
    /// An unreadable or corrupt artifact is a [`WatcherError::StoreLoad`]:
    /// silently starting empty would re-announce every still-fresh listing.
    fn load(path: &Path) -> Result<Loaded> {
        let listings: Vec<Listing> = if path.exists() {
            let raw = fs::read_to_string(path).map_err(|e| {
                WatcherError::StoreLoad(format!("failed to read '{}': {}", path.display(), e))
            })?;
            serde_json::from_str(&raw).map_err(|e| {
                WatcherError::StoreLoad(format!("corrupt artifact '{}': {}", path.display(), e))
            })?
        } else {
            fs::write(path, "[]").map_err(|e| {
                WatcherError::StoreLoad(format!("failed to create '{}': {}", path.display(), e))
            })?;
            Vec::new()
        };

        let identities = listings
            .iter()
            .map(|l| l.identity().to_string())
            .collect();

        info!(
            "Loaded {} listings from store '{}'",
            listings.len(),
            path.display()
        );
        Ok(Loaded {
            listings,
            identities,
        })
    }

    fn evict_stale(loaded: &mut Loaded, retention_secs: i64) {
        let cutoff = Utc::now().timestamp() - retention_secs;
        let before = loaded.listings.len();
        loaded.listings.retain(|l| l.observed_at >= cutoff);

        if loaded.listings.len() < before {
            loaded.identities = loaded
                .listings
                .iter()
                .map(|l| l.identity().to_string())
                .collect();
            debug!(
                "Evicted {} listings past the retention window",
                before - loaded.listings.len()
            );
        }
    }

    // Full rewrite via temp file + rename so a crash mid-write cannot leave a
    // truncated artifact behind.
    fn persist(path: &Path, listings: &[Listing]) -> Result<()> {
        let json = serde_json::to_string_pretty(listings)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|e| {
            WatcherError::StoreWrite(format!("failed to write '{}': {}", tmp.display(), e))
        })?;
        fs::rename(&tmp, path).map_err(|e| {
            WatcherError::StoreWrite(format!("failed to replace '{}': {}", path.display(), e))
        })?;
        Ok(())
    }
}
