use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::{Result, WatcherError};

/// Token-bucket limiter bounding outbound notification calls.
///
/// Holds `capacity` tokens at most, refilling `refill_tokens` per
/// `refill_interval`. Callers that cannot take a token immediately wait in a
/// FIFO queue of at most `queue_depth`; once the queue is full, further
/// acquires fail fast with [`WatcherError::RateLimitExceeded`].
#[derive(Clone, Debug)]
pub struct RateLimiter {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    capacity: f64,
    refill_rate: f64, // tokens per second
    queue_depth: usize,
    queued: AtomicUsize,
    bucket: Mutex<Bucket>,
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Proof that one token was consumed. Tokens are not refunded when a lease is
/// dropped; the bucket only refills on its own schedule.
#[derive(Debug)]
pub struct Lease {
    _priv: (),
}

impl RateLimiter {
    pub fn new(
        capacity: u64,
        refill_tokens: u64,
        refill_interval: Duration,
        queue_depth: usize,
    ) -> Self {
        let capacity = capacity as f64;
        Self {
            inner: Arc::new(Inner {
                capacity,
                refill_rate: refill_tokens as f64 / refill_interval.as_secs_f64(),
                queue_depth,
                queued: AtomicUsize::new(0),
                bucket: Mutex::new(Bucket {
                    // The bucket starts full, allowing an initial burst.
                    tokens: capacity,
                    last_refill: Instant::now(),
                }),
            }),
        }
    }

    /// Take one token, waiting for a refill if none is available.
    ///
    /// Returns [`WatcherError::RateLimitExceeded`] without waiting when
    /// `queue_depth` callers are already queued. Waiters are served oldest
    /// first.
    pub async fn acquire(&self) -> Result<Lease> {
        // Fast path: an available token is granted without occupying a queue
        // slot, so a zero-depth queue still admits unthrottled traffic.
        if let Ok(mut bucket) = self.inner.bucket.try_lock() {
            self.refill(&mut bucket);
            if bucket.tokens >= 1.0 {
                bucket.tokens -= 1.0;
                return Ok(Lease { _priv: () });
            }
        }

        let prior = self.inner.queued.fetch_add(1, Ordering::AcqRel);
        if prior >= self.inner.queue_depth {
            self.inner.queued.fetch_sub(1, Ordering::AcqRel);
            return Err(WatcherError::RateLimitExceeded);
        }
        let _slot = SlotGuard(&self.inner.queued);

        // The tokio mutex is fair, so waiters drain in arrival order. The
        // head of the queue keeps the lock while it sleeps for its refill.
        let mut bucket = self.inner.bucket.lock().await;
        loop {
            self.refill(&mut bucket);
            if bucket.tokens >= 1.0 {
                bucket.tokens -= 1.0;
                return Ok(Lease { _priv: () });
            }
            let deficit = 1.0 - bucket.tokens;
            let wait = Duration::from_secs_f64((deficit / self.inner.refill_rate).max(0.001));
            tokio::time::sleep(wait).await;
        }
    }

    fn refill(&self, bucket: &mut Bucket) {
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.inner.refill_rate).min(self.inner.capacity);
        bucket.last_refill = now;
    }
}

struct SlotGuard<'a>(&'a AtomicUsize);

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn initial_burst_up_to_capacity() {
        let limiter = RateLimiter::new(3, 1, Duration::from_secs(1), 10);

        let start = Instant::now();
        for _ in 0..3 {
            limiter.acquire().await.unwrap();
        }
        assert!(start.elapsed() < Duration::from_millis(10));
    }

    #[tokio::test(start_paused = true)]
    async fn queued_acquires_wait_for_refill() {
        let limiter = RateLimiter::new(1, 1, Duration::from_secs(1), 10);

        limiter.acquire().await.unwrap();

        let start = Instant::now();
        limiter.acquire().await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(990));

        let start = Instant::now();
        limiter.acquire().await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(990));
    }

    #[tokio::test(start_paused = true)]
    async fn tokens_are_not_refunded_on_lease_drop() {
        let limiter = RateLimiter::new(1, 1, Duration::from_secs(1), 10);

        drop(limiter.acquire().await.unwrap());

        // Dropping the lease must not hand the token back.
        let start = Instant::now();
        limiter.acquire().await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(990));
    }

    #[tokio::test(start_paused = true)]
    async fn full_queue_fails_fast() {
        let limiter = RateLimiter::new(1, 1, Duration::from_secs(60), 1);

        limiter.acquire().await.unwrap();

        // One waiter occupies the single queue slot.
        let waiter = {
            let limiter = limiter.clone();
            tokio::spawn(async move { limiter.acquire().await })
        };
        tokio::task::yield_now().await;

        match limiter.acquire().await {
            Err(WatcherError::RateLimitExceeded) => {}
            other => panic!("expected RateLimitExceeded, got {:?}", other.map(|_| ())),
        }
        waiter.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn waiters_are_served_in_arrival_order() {
        let limiter = RateLimiter::new(1, 1, Duration::from_secs(1), 10);
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));

        limiter.acquire().await.unwrap();

        let mut handles = Vec::new();
        for name in ["first", "second", "third"] {
            let limiter = limiter.clone();
            let order = order.clone();
            handles.push(tokio::spawn(async move {
                limiter.acquire().await.unwrap();
                order.lock().unwrap().push(name);
            }));
            // Let each waiter park on the bucket before spawning the next.
            tokio::task::yield_now().await;
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    }
}
