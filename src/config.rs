use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::constants;
use crate::error::{Result, WatcherError};

/// Every externally supplied parameter, resolved once at startup and passed
/// into the component constructors. Nothing else reads the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub target_url: String,
    pub listing_selector: String,
    pub poll_interval: Duration,
    pub retention_secs: i64,
    pub rate_limit: RateLimitConfig,
    pub webhook_url: String,
    pub store_path: PathBuf,
    pub proxy: Option<ProxyConfig>,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub capacity: u64,
    pub refill_tokens: u64,
    pub refill_interval: Duration,
    pub queue_depth: usize,
}

#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub host: String,
    pub username: String,
    pub password: String,
}

impl Config {
    /// Resolve from the process environment. `main` loads `.env` first.
    pub fn from_env() -> Result<Self> {
        let target_url = require("MARKETPLACE_URL")?;
        let webhook_url = require("DISCORD_WEBHOOK_URL")?;

        let retention_days: i64 = var_or("RETENTION_DAYS", constants::DEFAULT_RETENTION_DAYS)?;
        if retention_days <= 0 {
            return Err(WatcherError::Config(
                "RETENTION_DAYS must be positive".to_string(),
            ));
        }

        let rate_limit = RateLimitConfig {
            capacity: nonzero("RATE_LIMIT_CAPACITY", constants::DEFAULT_RATE_LIMIT_CAPACITY)?,
            refill_tokens: nonzero(
                "RATE_LIMIT_REFILL_TOKENS",
                constants::DEFAULT_RATE_LIMIT_REFILL_TOKENS,
            )?,
            refill_interval: Duration::from_secs(nonzero(
                "RATE_LIMIT_REFILL_SECONDS",
                constants::DEFAULT_RATE_LIMIT_REFILL_SECS,
            )?),
            queue_depth: var_or(
                "RATE_LIMIT_QUEUE_DEPTH",
                constants::DEFAULT_RATE_LIMIT_QUEUE_DEPTH,
            )?,
        };

        // The proxy is all-or-nothing: a host without credentials is a
        // configuration mistake, not a partial setup.
        let proxy = match env::var("PROXY_HOST") {
            Ok(host) if !host.trim().is_empty() => Some(ProxyConfig {
                host,
                username: require("PROXY_USERNAME")?,
                password: require("PROXY_PASSWORD")?,
            }),
            _ => None,
        };

        Ok(Self {
            target_url,
            listing_selector: env::var("LISTING_SELECTOR")
                .unwrap_or_else(|_| constants::DEFAULT_LISTING_SELECTOR.to_string()),
            poll_interval: Duration::from_secs(var_or(
                "POLL_INTERVAL_SECONDS",
                constants::DEFAULT_POLL_INTERVAL_SECS,
            )?),
            retention_secs: retention_days * 24 * 60 * 60,
            rate_limit,
            webhook_url,
            store_path: PathBuf::from(
                env::var("STORE_PATH").unwrap_or_else(|_| constants::DEFAULT_STORE_PATH.to_string()),
            ),
            proxy,
        })
    }
}

fn require(key: &str) -> Result<String> {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(WatcherError::Config(format!("{key} is required"))),
    }
}

fn var_or<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| WatcherError::Config(format!("invalid {key}: {e}"))),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err.into()),
    }
}

fn nonzero(key: &str, default: u64) -> Result<u64> {
    let value: u64 = var_or(key, default)?;
    if value == 0 {
        return Err(WatcherError::Config(format!("{key} must be nonzero")));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    // One test owns all env mutation; parallel tests touching these keys
    // would race.
    #[test]
    fn resolves_requirements_and_defaults() {
        env::set_var("MARKETPLACE_URL", "https://market.example.com/search?query=free");
        env::set_var("DISCORD_WEBHOOK_URL", "https://discord.example.com/api/webhooks/1");
        env::remove_var("POLL_INTERVAL_SECONDS");
        env::remove_var("PROXY_HOST");
        env::set_var("RATE_LIMIT_QUEUE_DEPTH", "25");

        let config = Config::from_env().unwrap();
        assert_eq!(config.poll_interval, Duration::from_secs(60));
        assert_eq!(config.retention_secs, 7 * 24 * 60 * 60);
        assert_eq!(config.rate_limit.capacity, 1);
        assert_eq!(config.rate_limit.queue_depth, 25);
        assert!(config.proxy.is_none());

        env::remove_var("MARKETPLACE_URL");
        match Config::from_env() {
            Err(WatcherError::Config(msg)) => assert!(msg.contains("MARKETPLACE_URL")),
            other => panic!("expected Config error, got {:?}", other.map(|_| ())),
        }
    }
}
