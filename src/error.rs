use thiserror::Error;

#[derive(Error, Debug)]
pub enum WatcherError {
    #[error("nothing extractable on the current page")]
    ExtractionEmpty,

    #[error("session acquisition failed: {0}")]
    SessionAcquisition(String),

    #[error("listing store failed to load: {0}")]
    StoreLoad(String),

    #[error("listing store write failed: {0}")]
    StoreWrite(String),

    #[error("rate limit queue is full")]
    RateLimitExceeded,

    #[error("webhook delivery failed: {0}")]
    DeliveryFailed(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Environment variable error: {0}")]
    Env(#[from] std::env::VarError),
}

pub type Result<T> = std::result::Result<T, WatcherError>;
