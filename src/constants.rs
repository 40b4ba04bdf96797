/// Default tuning for the watch loop and its collaborators. Every value here
/// can be overridden through the environment; see `config.rs`.

pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_RETENTION_DAYS: i64 = 7;
pub const DEFAULT_STORE_PATH: &str = "listings.json";

pub const DEFAULT_RATE_LIMIT_CAPACITY: u64 = 1;
pub const DEFAULT_RATE_LIMIT_REFILL_TOKENS: u64 = 1;
pub const DEFAULT_RATE_LIMIT_REFILL_SECS: u64 = 1;
pub const DEFAULT_RATE_LIMIT_QUEUE_DEPTH: usize = 100;

/// Listing-card title nodes on the marketplace search page carry this class
/// stack.
pub const DEFAULT_LISTING_SELECTOR: &str = ".x1lliihq.x6ikm8r.x10wlt62.x1n2onr6";

/// How often to re-fetch while the page has not rendered any listings yet.
pub const EXTRACTION_ATTEMPTS: u32 = 5;
pub const EXTRACTION_RETRY_DELAY_SECS: u64 = 1;

pub const SESSION_RETRY_DELAY_SECS: u64 = 5;

pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) HeadlessChrome/140.0.7339.16 Safari/537.36";
