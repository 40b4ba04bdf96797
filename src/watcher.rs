use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info, instrument, warn};

use crate::dispatcher::Dispatcher;
use crate::error::{Result, WatcherError};
use crate::extractor::Extractor;
use crate::session::{Session, SessionProvider};
use crate::store::ListingStore;

/// Cooperative shutdown handle, checked at every cycle boundary and
/// suspension point of the watch loop.
#[derive(Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

pub fn shutdown_channel() -> (watch::Sender<bool>, ShutdownSignal) {
    let (tx, rx) = watch::channel(false);
    (tx, ShutdownSignal { rx })
}

impl ShutdownSignal {
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    /// Resolves once shutdown is requested. A dropped sender counts as a
    /// request.
    pub async fn triggered(&mut self) {
        let _ = self.rx.wait_for(|stop| *stop).await;
    }
}

/// Outcome of a single poll cycle, matched by the supervising loop.
#[derive(Debug)]
pub enum CycleOutcome {
    /// Listings were extracted and walked oldest-first.
    Processed(CycleStats),
    /// The upstream rendered nothing extractable; the session is presumed
    /// dead and must be recycled before the next attempt.
    EmptyExtraction,
    /// Shutdown was requested mid-cycle.
    Interrupted,
}

#[derive(Debug, Default)]
pub struct CycleStats {
    pub extracted: usize,
    pub announced: usize,
    pub duplicates: usize,
    pub delivery_failures: Vec<String>,
}

/// Drives the poll loop: extract through the current session, admit novel
/// listings, dispatch announcements, and supervise failure by recycling the
/// session instead of crashing.
pub struct Watcher {
    sessions: Box<dyn SessionProvider>,
    extractor: Box<dyn Extractor>,
    store: ListingStore,
    dispatcher: Dispatcher,
    poll_interval: Duration,
    session_retry_delay: Duration,
    session: Option<Session>,
}

impl Watcher {
    pub fn new(
        sessions: Box<dyn SessionProvider>,
        extractor: Box<dyn Extractor>,
        store: ListingStore,
        dispatcher: Dispatcher,
        poll_interval: Duration,
        session_retry_delay: Duration,
    ) -> Self {
        Self {
            sessions,
            extractor,
            store,
            dispatcher,
            poll_interval,
            session_retry_delay,
            session: None,
        }
    }

    /// Poll until shutdown. Only a store that cannot load terminates the
    /// loop with an error; every other failure recovers by recycling the
    /// session. The current session is disposed before returning.
    pub async fn run(&mut self, mut shutdown: ShutdownSignal) -> Result<()> {
        let result = self.supervise(&mut shutdown).await;
        if let Some(session) = self.session.take() {
            self.sessions.dispose(session).await;
        }
        result
    }

    /// Run exactly one poll cycle, then release the session. Used by the
    /// `tick` subcommand.
    pub async fn run_once(&mut self, mut shutdown: ShutdownSignal) -> Result<CycleOutcome> {
        let outcome = self.poll_cycle(&mut shutdown).await;
        if let Some(session) = self.session.take() {
            self.sessions.dispose(session).await;
        }
        outcome
    }

    async fn supervise(&mut self, shutdown: &mut ShutdownSignal) -> Result<()> {
        while !shutdown.is_triggered() {
            match self.poll_cycle(shutdown).await {
                Ok(CycleOutcome::Processed(stats)) => {
                    info!(
                        extracted = stats.extracted,
                        announced = stats.announced,
                        duplicates = stats.duplicates,
                        delivery_failures = stats.delivery_failures.len(),
                        "Cycle complete, waiting {}s before the next refresh",
                        self.poll_interval.as_secs()
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(self.poll_interval) => {}
                        _ = shutdown.triggered() => {}
                    }
                }
                Ok(CycleOutcome::EmptyExtraction) => {
                    warn!("No listings found, recycling session");
                    self.recycle_session().await;
                    // Retry promptly; an empty render wastes no poll interval.
                }
                Ok(CycleOutcome::Interrupted) => break,
                Err(err @ WatcherError::StoreLoad(_)) => {
                    error!("Unrecoverable: {}", err);
                    return Err(err);
                }
                Err(err) => {
                    error!("Cycle failed: {}", err);
                    // Best-effort operator notice; its own failure is logged
                    // and swallowed, never retried.
                    if let Err(notice_err) = self
                        .dispatcher
                        .send_notice(&format!("Error occurred: {err}"))
                        .await
                    {
                        warn!("Operator notice failed: {}", notice_err);
                    }
                    self.recycle_session().await;
                }
            }
        }
        Ok(())
    }

    /// One tick of the state machine: ensure a session, extract, admit,
    /// dispatch. Item-level delivery failures are recorded in the stats and
    /// never abort the rest of the batch; cycle-level failures bubble up to
    /// the supervisor.
    #[instrument(skip_all)]
    async fn poll_cycle(&mut self, shutdown: &mut ShutdownSignal) -> Result<CycleOutcome> {
        if !self.ensure_session(shutdown).await {
            return Ok(CycleOutcome::Interrupted);
        }
        let Some(session) = self.session.as_ref() else {
            return Ok(CycleOutcome::Interrupted);
        };

        info!("Refreshing listings");
        let mut listings = match self.extractor.extract(session).await {
            Ok(listings) => listings,
            Err(WatcherError::ExtractionEmpty) => return Ok(CycleOutcome::EmptyExtraction),
            Err(err) => return Err(err),
        };

        // The upstream sorts by descending recency; announce in real-world
        // order, oldest first.
        listings.reverse();

        let mut stats = CycleStats {
            extracted: listings.len(),
            ..Default::default()
        };
        for listing in &listings {
            if !self.store.admit(listing)? {
                stats.duplicates += 1;
                continue;
            }
            match self.dispatcher.send(listing).await {
                Ok(()) => {
                    info!("Found new listing {} - {}", listing.title, listing.url);
                    stats.announced += 1;
                }
                Err(err) => {
                    warn!("Failed to announce {}: {}", listing.url, err);
                    stats.delivery_failures.push(format!("{}: {}", listing.url, err));
                }
            }
        }

        Ok(CycleOutcome::Processed(stats))
    }

    /// Acquire a session if none is held. Acquisition failures are retried
    /// forever with a fixed delay; only a shutdown request stops the loop.
    /// Returns `false` when shutdown interrupted the wait.
    async fn ensure_session(&mut self, shutdown: &mut ShutdownSignal) -> bool {
        while self.session.is_none() {
            if shutdown.is_triggered() {
                return false;
            }
            match self.sessions.acquire().await {
                Ok(session) => self.session = Some(session),
                Err(err) => {
                    warn!(
                        "Session acquisition failed ({}), retrying in {}s",
                        err,
                        self.session_retry_delay.as_secs()
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(self.session_retry_delay) => {}
                        _ = shutdown.triggered() => return false,
                    }
                }
            }
        }
        true
    }

    async fn recycle_session(&mut self) {
        if let Some(session) = self.session.take() {
            self.sessions.dispose(session).await;
        }
    }
}
