use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;

use crate::error::Result;

type Flight<V> = Shared<BoxFuture<'static, Result<V>>>;

/// Coalesces concurrent requests for the same key into one upstream call.
///
/// The first caller starts the fetch; later callers await the same shared
/// future and receive a clone of its result. The entry is dropped once the
/// fetch completes, so the next call after completion starts a fresh one.
pub struct SingleFlight<K, V> {
    inflight: Mutex<HashMap<K, Flight<V>>>,
}

impl<K, V> SingleFlight<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            inflight: Mutex::new(HashMap::new()),
        }
    }

    pub async fn run<F, Fut>(&self, key: K, fetch: F) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        let flight = {
            let mut inflight = self.inflight.lock();
            if let Some(existing) = inflight.get(&key) {
                existing.clone()
            } else {
                let flight = fetch().boxed().shared();
                inflight.insert(key.clone(), flight.clone());
                flight
            }
        };

        let result = flight.clone().await;

        let mut inflight = self.inflight.lock();
        if inflight.get(&key).is_some_and(|current| current.ptr_eq(&flight)) {
            inflight.remove(&key);
        }
        result
    }

    /// Number of fetches currently in flight.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.inflight.lock().len()
    }
}

impl<K, V> Default for SingleFlight<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
