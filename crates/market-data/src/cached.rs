//! Provider decorator adding TTL caching, single-flight and per-call timeouts.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use premia_core::{HistoricalPrice, HistoryRange, OptionChain, Quote, VolatilityData};

use crate::batch::fan_out;
use crate::cache::CacheRegistry;
use crate::error::{ProviderError, Result};
use crate::provider::MarketDataProvider;

/// Wraps any provider with the engine's cache registry.
pub struct CachedProvider {
    inner: Arc<dyn MarketDataProvider>,
    caches: Arc<CacheRegistry>,
    timeout: Duration,
}

impl CachedProvider {
    pub fn new(inner: Arc<dyn MarketDataProvider>, caches: Arc<CacheRegistry>, timeout: Duration) -> Self {
        Self {
            inner,
            caches,
            timeout,
        }
    }

    #[must_use]
    pub fn caches(&self) -> &Arc<CacheRegistry> {
        &self.caches
    }

    #[must_use]
    pub fn inner(&self) -> &Arc<dyn MarketDataProvider> {
        &self.inner
    }
}

/// Bounds `fut` by `after`, mapping elapsed time to `ProviderError::Timeout`.
async fn bounded<T>(operation: &str, after: Duration, fut: impl Future<Output = Result<T>>) -> Result<T> {
    match tokio::time::timeout(after, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(operation, timeout_ms = after.as_millis() as u64, "provider call timed out");
            Err(ProviderError::timeout(operation, after))
        }
    }
}

fn normalize(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}

#[async_trait]
impl MarketDataProvider for CachedProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn get_quote(&self, symbol: &str) -> Result<Quote> {
        let symbol = normalize(symbol);
        let inner = Arc::clone(&self.inner);
        let timeout = self.timeout;
        self.caches
            .quotes
            .get_or_fetch(symbol.clone(), move || async move {
                bounded("get_quote", timeout, inner.get_quote(&symbol)).await
            })
            .await
    }

    async fn get_batch_quotes(&self, symbols: &[String]) -> HashMap<String, Quote> {
        let mut found = HashMap::new();
        let mut misses = Vec::new();
        for symbol in symbols.iter().map(|s| normalize(s)) {
            match self.caches.quotes.peek(&symbol) {
                Some(quote) => {
                    found.insert(symbol, quote);
                }
                None => misses.push(symbol),
            }
        }
        if misses.is_empty() {
            return found;
        }

        // Each miss goes through `get_quote`, so a slow symbol only times out itself.
        for (symbol, result) in fan_out(&misses, |symbol| async move { self.get_quote(&symbol).await }).await {
            match result {
                Ok(quote) => {
                    found.insert(symbol, quote);
                }
                Err(e) => {
                    tracing::debug!(%symbol, error = %e, "quote omitted from batch");
                }
            }
        }
        found
    }

    async fn get_historical_prices(
        &self,
        symbol: &str,
        range: HistoryRange,
    ) -> Result<Vec<HistoricalPrice>> {
        let symbol = normalize(symbol);
        let inner = Arc::clone(&self.inner);
        let timeout = self.timeout;
        self.caches
            .history
            .get_or_fetch((symbol.clone(), range), move || async move {
                bounded("get_historical_prices", timeout, inner.get_historical_prices(&symbol, range)).await
            })
            .await
    }

    async fn get_option_chain(&self, symbol: &str, expiration: NaiveDate) -> Result<OptionChain> {
        let symbol = normalize(symbol);
        let inner = Arc::clone(&self.inner);
        let timeout = self.timeout;
        self.caches
            .chains
            .get_or_fetch((symbol.clone(), expiration), move || async move {
                bounded("get_option_chain", timeout, inner.get_option_chain(&symbol, expiration)).await
            })
            .await
    }

    async fn get_option_expirations(&self, symbol: &str) -> Result<Vec<NaiveDate>> {
        let symbol = normalize(symbol);
        let inner = Arc::clone(&self.inner);
        let timeout = self.timeout;
        self.caches
            .expirations
            .get_or_fetch(symbol.clone(), move || async move {
                bounded("get_option_expirations", timeout, inner.get_option_expirations(&symbol)).await
            })
            .await
    }

    async fn get_volatility_data(&self, symbol: &str) -> Result<VolatilityData> {
        let symbol = normalize(symbol);
        let inner = Arc::clone(&self.inner);
        let timeout = self.timeout;
        self.caches
            .volatility
            .get_or_fetch(symbol.clone(), move || async move {
                bounded("get_volatility_data", timeout, inner.get_volatility_data(&symbol)).await
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulated::SimulatedProvider;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts upstream calls and optionally stalls, for every symbol or one.
    struct CountingProvider {
        inner: SimulatedProvider,
        quote_calls: AtomicUsize,
        stall: Option<Duration>,
        slow_symbol: Option<&'static str>,
    }

    impl CountingProvider {
        fn new(stall: Option<Duration>) -> Self {
            Self {
                inner: SimulatedProvider::new(),
                quote_calls: AtomicUsize::new(0),
                stall,
                slow_symbol: None,
            }
        }

        fn slow_on(symbol: &'static str, stall: Duration) -> Self {
            Self {
                slow_symbol: Some(symbol),
                ..Self::new(Some(stall))
            }
        }
    }

    #[async_trait]
    impl MarketDataProvider for CountingProvider {
        fn name(&self) -> &str {
            "counting"
        }

        async fn get_quote(&self, symbol: &str) -> Result<Quote> {
            self.quote_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(stall) = self.stall {
                if self.slow_symbol.map_or(true, |slow| slow == symbol) {
                    tokio::time::sleep(stall).await;
                }
            }
            self.inner.get_quote(symbol).await
        }

        async fn get_historical_prices(&self, symbol: &str, range: HistoryRange) -> Result<Vec<HistoricalPrice>> {
            self.inner.get_historical_prices(symbol, range).await
        }

        async fn get_option_chain(&self, symbol: &str, expiration: NaiveDate) -> Result<OptionChain> {
            self.inner.get_option_chain(symbol, expiration).await
        }

        async fn get_option_expirations(&self, symbol: &str) -> Result<Vec<NaiveDate>> {
            self.inner.get_option_expirations(symbol).await
        }

        async fn get_volatility_data(&self, symbol: &str) -> Result<VolatilityData> {
            self.inner.get_volatility_data(symbol).await
        }
    }

    #[tokio::test]
    async fn repeated_quotes_hit_upstream_once() {
        let upstream = Arc::new(CountingProvider::new(None));
        let cached = CachedProvider::new(
            upstream.clone(),
            Arc::new(CacheRegistry::default()),
            Duration::from_secs(5),
        );

        for _ in 0..3 {
            let quote = cached.get_quote("aapl").await.unwrap();
            assert_eq!(quote.symbol, "AAPL");
        }
        assert_eq!(upstream.quote_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_upstream_times_out() {
        let upstream = Arc::new(CountingProvider::new(Some(Duration::from_secs(30))));
        let cached = CachedProvider::new(upstream, Arc::new(CacheRegistry::default()), Duration::from_secs(10));

        let err = cached.get_quote("SPY").await.unwrap_err();
        assert!(matches!(err, ProviderError::Timeout { ref operation, after_ms: 10_000 } if operation == "get_quote"));
    }

    #[tokio::test]
    async fn batch_quotes_omit_failures_and_fill_cache() {
        let upstream = Arc::new(CountingProvider::new(None));
        let cached = CachedProvider::new(
            upstream.clone(),
            Arc::new(CacheRegistry::default()),
            Duration::from_secs(5),
        );

        let symbols = vec!["SPY".to_string(), "NOPE".to_string(), "QQQ".to_string()];
        let quotes = cached.get_batch_quotes(&symbols).await;
        assert_eq!(quotes.len(), 2);
        assert!(quotes.contains_key("SPY"));
        assert!(!quotes.contains_key("NOPE"));

        cached.get_quote("SPY").await.unwrap();
        assert_eq!(upstream.quote_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_symbol_drops_only_itself_from_batch() {
        let upstream = Arc::new(CountingProvider::slow_on("NVDA", Duration::from_secs(60)));
        let cached = CachedProvider::new(upstream, Arc::new(CacheRegistry::default()), Duration::from_secs(10));

        let symbols = vec!["AAPL".to_string(), "SPY".to_string(), "NVDA".to_string()];
        let quotes = cached.get_batch_quotes(&symbols).await;

        assert_eq!(quotes.len(), 2);
        assert!(quotes.contains_key("AAPL"));
        assert!(quotes.contains_key("SPY"));
        assert!(!quotes.contains_key("NVDA"));
    }
}
