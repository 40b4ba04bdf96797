use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::config::ProxyConfig;
use crate::error::{Result, WatcherError};

/// A live upstream browsing session: the configured HTTP client the extractor
/// reads the marketplace through, plus when it was established.
pub struct Session {
    client: reqwest::Client,
    established_at: DateTime<Utc>,
}

impl Session {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            established_at: Utc::now(),
        }
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub fn established_at(&self) -> DateTime<Utc> {
        self.established_at
    }
}

/// Owns acquisition and teardown of upstream sessions. The watcher resets a
/// suspect session by disposing it and acquiring a fresh one.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn acquire(&self) -> Result<Session>;
    async fn dispose(&self, session: Session);
}

/// Builds sessions that present a desktop browser user agent, optionally
/// routed through an authenticated proxy.
pub struct ProxiedSessionProvider {
    proxy: Option<ProxyConfig>,
    user_agent: String,
}

impl ProxiedSessionProvider {
    pub fn new(proxy: Option<ProxyConfig>, user_agent: impl Into<String>) -> Self {
        Self {
            proxy,
            user_agent: user_agent.into(),
        }
    }
}

#[async_trait]
impl SessionProvider for ProxiedSessionProvider {
    async fn acquire(&self) -> Result<Session> {
        let mut builder = reqwest::Client::builder().user_agent(&self.user_agent);

        if let Some(proxy) = &self.proxy {
            let proxy = reqwest::Proxy::all(&proxy.host)
                .map_err(|e| {
                    WatcherError::SessionAcquisition(format!("invalid proxy '{}': {}", proxy.host, e))
                })?
                .basic_auth(&proxy.username, &proxy.password);
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| WatcherError::SessionAcquisition(e.to_string()))?;

        info!("Acquired new upstream session");
        Ok(Session::new(client))
    }

    async fn dispose(&self, session: Session) {
        debug!(
            "Disposed upstream session established at {}",
            session.established_at()
        );
        drop(session);
    }
}
