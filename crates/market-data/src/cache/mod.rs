//! Time-bounded caching and request coalescing.
//!
//! - [`TtlCache`]: entries expire lazily on read, `sweep` reclaims memory
//! - [`SingleFlight`]: concurrent fetches of one key share a single upstream call
//! - [`Memoizer`]: the two combined
//! - [`CacheRegistry`]: one memoizer per data kind, owned by an engine instance

mod registry;
mod single_flight;
mod ttl;

pub use registry::{CacheRegistry, CacheTtls};
pub use single_flight::SingleFlight;
pub use ttl::TtlCache;

use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;

/// TTL cache fronted by single-flight coalescing.
pub struct Memoizer<K, V> {
    cache: Arc<TtlCache<K, V>>,
    flights: SingleFlight<K, V>,
}

impl<K, V> Memoizer<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            cache: Arc::new(TtlCache::new(ttl)),
            flights: SingleFlight::new(),
        }
    }

    /// Returns the cached value or runs `fetch` once for all concurrent
    /// callers of the same key. Errors are shared and never cached.
    pub async fn get_or_fetch<F, Fut>(&self, key: K, fetch: F) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        if let Some(value) = self.cache.get(&key) {
            return Ok(value);
        }

        let cache = Arc::clone(&self.cache);
        let cache_key = key.clone();
        self.flights
            .run(key, move || {
                // A flight that finished between our miss and now has already
                // populated the cache.
                let cached = cache.get(&cache_key);
                let upstream = fetch();
                async move {
                    if let Some(value) = cached {
                        return Ok(value);
                    }
                    let value = upstream.await?;
                    cache.insert(cache_key, value.clone());
                    Ok(value)
                }
            })
            .await
    }

    /// Stores a value fetched outside `get_or_fetch` (e.g. a batch call).
    pub fn insert(&self, key: K, value: V) {
        self.cache.insert(key, value);
    }

    #[must_use]
    pub fn peek(&self, key: &K) -> Option<V> {
        self.cache.get(key)
    }

    pub fn sweep(&self) -> usize {
        self.cache.sweep()
    }

    pub fn clear(&self) {
        self.cache.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}
