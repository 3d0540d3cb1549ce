//! Per-endpoint request spacing.
//!
//! Calls to the same endpoint are serialized and their starts are spaced by
//! at least `min_spacing`. Different endpoints never wait on each other.
//!
//! Endpoints are keyed by route (`transaction`, `nonce`), never by the concrete
//! path, so the slot map stays bounded by the number of routes.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::Instant;
use tracing::trace;

/// Held for the duration of one request. Dropping it lets the next caller in.
pub struct EndpointPermit {
    _guard: OwnedMutexGuard<Option<Instant>>,
}

pub struct EndpointLimiter {
    min_spacing: Duration,
    slots: DashMap<String, Arc<Mutex<Option<Instant>>>>,
}

impl EndpointLimiter {
    pub fn new(min_spacing: Duration) -> Self {
        Self {
            min_spacing,
            slots: DashMap::new(),
        }
    }

    pub fn min_spacing(&self) -> Duration {
        self.min_spacing
    }

    /// Wait for the endpoint's turn.
    pub async fn acquire(&self, endpoint: &str) -> EndpointPermit {
        // Clone out of the map so no shard lock is held across the await.
        let slot = self
            .slots
            .entry(endpoint.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone();

        let mut guard = slot.lock_owned().await;
        if let Some(last) = *guard {
            let ready_at = last + self.min_spacing;
            if Instant::now() < ready_at {
                trace!(endpoint, wait_ms = (ready_at - Instant::now()).as_millis() as u64, "Spacing request");
                tokio::time::sleep_until(ready_at).await;
            }
        }
        *guard = Some(Instant::now());

        EndpointPermit { _guard: guard }
    }

    /// Number of routes seen so far.
    pub fn endpoint_count(&self) -> usize {
        self.slots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_same_endpoint_is_spaced() {
        let limiter = EndpointLimiter::new(Duration::from_millis(200));
        let start = Instant::now();

        drop(limiter.acquire("gas").await);
        drop(limiter.acquire("gas").await);
        drop(limiter.acquire("gas").await);

        assert!(start.elapsed() >= Duration::from_millis(400));
        assert_eq!(limiter.endpoint_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_different_endpoints_do_not_wait() {
        let limiter = EndpointLimiter::new(Duration::from_millis(200));
        let start = Instant::now();

        drop(limiter.acquire("gas").await);
        drop(limiter.acquire("nonce").await);

        assert!(start.elapsed() < Duration::from_millis(200));
        assert_eq!(limiter.endpoint_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_request_in_flight_per_endpoint() {
        let limiter = Arc::new(EndpointLimiter::new(Duration::ZERO));
        let permit = limiter.acquire("broadcast").await;

        let waiter = {
            let limiter = limiter.clone();
            tokio::spawn(async move {
                let _permit = limiter.acquire("broadcast").await;
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        drop(permit);
        waiter.await.unwrap();
    }
}
