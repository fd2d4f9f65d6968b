//! FIFO request queue with minimum spacing between outbound calls.

use std::sync::Arc;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use nonzero_ext::nonzero;
use tokio::sync::Mutex;

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Single-lane queue in front of a vendor API.
///
/// Callers are admitted strictly in arrival order (the lane is a fair
/// `tokio::sync::Mutex`) and no two admissions are closer than the
/// configured interval. The lane is released on admission, so the request
/// itself may overlap with the next caller's wait.
pub struct RequestQueue {
    lane: Mutex<()>,
    limiter: Option<Arc<DirectLimiter>>,
    min_interval: Duration,
}

impl RequestQueue {
    /// A zero interval disables spacing but keeps FIFO admission.
    pub fn new(min_interval: Duration) -> Self {
        let limiter = Quota::with_period(min_interval)
            .map(|quota| Arc::new(RateLimiter::direct(quota.allow_burst(nonzero!(1u32)))));
        Self {
            lane: Mutex::new(()),
            limiter,
            min_interval,
        }
    }

    #[must_use]
    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Waits for this caller's turn.
    pub async fn wait_turn(&self) {
        let _lane = self.lane.lock().await;
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::join_all;
    use std::time::Instant;

    #[tokio::test]
    async fn admits_in_arrival_order_with_spacing() {
        let queue = RequestQueue::new(Duration::from_millis(20));
        let order = parking_lot::Mutex::new(Vec::new());
        let started = Instant::now();

        join_all((0..5).map(|i| {
            let queue = &queue;
            let order = &order;
            async move {
                queue.wait_turn().await;
                order.lock().push(i);
            }
        }))
        .await;

        assert_eq!(*order.lock(), vec![0, 1, 2, 3, 4]);
        assert!(started.elapsed() >= Duration::from_millis(70));
    }

    #[tokio::test]
    async fn zero_interval_does_not_wait() {
        let queue = RequestQueue::new(Duration::ZERO);
        let started = Instant::now();
        for _ in 0..50 {
            queue.wait_turn().await;
        }
        assert!(started.elapsed() < Duration::from_millis(50));
    }
}
