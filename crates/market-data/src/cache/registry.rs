use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::NaiveDate;
use parking_lot::Mutex;
use premia_core::{
    CacheConfig, HistoricalPrice, HistoryRange, MarketRegime, OptionChain, Quote, SymbolSignals,
    VolatilityData,
};
use tokio::task::JoinHandle;

use super::Memoizer;

/// Time-to-live per data kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTtls {
    pub quote: Duration,
    pub chain: Duration,
    pub expirations: Duration,
    pub history: Duration,
    pub volatility: Duration,
    /// Regime and per-symbol signal aggregates.
    pub aggregate: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self::from(&CacheConfig::default())
    }
}

impl From<&CacheConfig> for CacheTtls {
    fn from(config: &CacheConfig) -> Self {
        Self {
            quote: Duration::from_secs(config.quote_ttl_secs),
            chain: Duration::from_secs(config.chain_ttl_secs),
            expirations: Duration::from_secs(config.expirations_ttl_secs),
            history: Duration::from_secs(config.history_ttl_secs),
            volatility: Duration::from_secs(config.volatility_ttl_secs),
            aggregate: Duration::from_secs(config.aggregate_ttl_secs),
        }
    }
}

/// Every cache an engine instance uses.
///
/// Created by and owned by one engine; nothing is process-global, so two
/// engines never observe each other's data.
pub struct CacheRegistry {
    pub quotes: Memoizer<String, Quote>,
    pub history: Memoizer<(String, HistoryRange), Vec<HistoricalPrice>>,
    pub chains: Memoizer<(String, NaiveDate), OptionChain>,
    pub expirations: Memoizer<String, Vec<NaiveDate>>,
    pub volatility: Memoizer<String, VolatilityData>,
    /// Keyed by the sorted regime basket and proxy symbol.
    pub regimes: Memoizer<String, MarketRegime>,
    /// Keyed by symbol plus the inputs that change the signal.
    pub signals: Memoizer<String, SymbolSignals>,
    ttls: CacheTtls,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl CacheRegistry {
    pub fn new(ttls: CacheTtls) -> Self {
        Self {
            quotes: Memoizer::new(ttls.quote),
            history: Memoizer::new(ttls.history),
            chains: Memoizer::new(ttls.chain),
            expirations: Memoizer::new(ttls.expirations),
            volatility: Memoizer::new(ttls.volatility),
            regimes: Memoizer::new(ttls.aggregate),
            signals: Memoizer::new(ttls.aggregate),
            ttls,
            sweeper: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn ttls(&self) -> CacheTtls {
        self.ttls
    }

    /// Removes expired entries from every cache.
    pub fn sweep(&self) -> usize {
        let removed = self.quotes.sweep()
            + self.history.sweep()
            + self.chains.sweep()
            + self.expirations.sweep()
            + self.volatility.sweep()
            + self.regimes.sweep()
            + self.signals.sweep();
        if removed > 0 {
            tracing::debug!(removed, "swept expired cache entries");
        }
        removed
    }

    /// Drops every entry, live or not.
    pub fn clear(&self) {
        self.quotes.clear();
        self.history.clear();
        self.chains.clear();
        self.expirations.clear();
        self.volatility.clear();
        self.regimes.clear();
        self.signals.clear();
    }

    /// Spawns a periodic sweep task. The task holds only a weak reference
    /// and is aborted when the registry is dropped. Calling again replaces
    /// the previous task. Must be called inside a tokio runtime.
    pub fn start_sweeper(self: &Arc<Self>, interval: Duration) {
        let weak: Weak<Self> = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(registry) = weak.upgrade() else {
                    break;
                };
                registry.sweep();
            }
        });
        if let Some(previous) = self.sweeper.lock().replace(handle) {
            previous.abort();
        }
    }

    #[must_use]
    pub fn sweeper_running(&self) -> bool {
        self.sweeper
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Default for CacheRegistry {
    fn default() -> Self {
        Self::new(CacheTtls::default())
    }
}

impl Drop for CacheRegistry {
    fn drop(&mut self) {
        if let Some(handle) = self.sweeper.lock().take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn quote(symbol: &str) -> Quote {
        Quote {
            symbol: symbol.to_string(),
            last: dec!(100),
            bid: dec!(99.99),
            ask: dec!(100.01),
            change_pct: 0.0,
            volume: 1_000_000,
            average_volume: 1_000_000,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn ttls_follow_config() {
        let config = CacheConfig {
            quote_ttl_secs: 5,
            ..CacheConfig::default()
        };
        let ttls = CacheTtls::from(&config);
        assert_eq!(ttls.quote, Duration::from_secs(5));
        assert_eq!(ttls.chain, Duration::from_secs(60));
        assert_eq!(ttls.aggregate, Duration::from_secs(300));
    }

    #[tokio::test(start_paused = true)]
    async fn background_sweeper_reclaims_expired_entries() {
        let registry = Arc::new(CacheRegistry::default());
        registry
            .quotes
            .get_or_fetch("SPY".to_string(), || async { Ok(quote("SPY")) })
            .await
            .unwrap();
        registry.start_sweeper(Duration::from_secs(10));
        assert!(registry.sweeper_running());

        tokio::time::sleep(Duration::from_secs(45)).await;
        assert!(registry.quotes.is_empty());
    }

    #[tokio::test]
    async fn clear_resets_every_cache() {
        let registry = CacheRegistry::default();
        registry
            .quotes
            .get_or_fetch("QQQ".to_string(), || async { Ok(quote("QQQ")) })
            .await
            .unwrap();
        registry
            .expirations
            .get_or_fetch("QQQ".to_string(), || async { Ok(Vec::new()) })
            .await
            .unwrap();
        registry.clear();
        assert!(registry.quotes.is_empty());
        assert!(registry.expirations.is_empty());
    }

    #[tokio::test]
    async fn registries_are_independent() {
        let a = CacheRegistry::default();
        let b = CacheRegistry::default();
        a.quotes
            .get_or_fetch("IWM".to_string(), || async { Ok(quote("IWM")) })
            .await
            .unwrap();
        assert!(a.quotes.peek(&"IWM".to_string()).is_some());
        assert!(b.quotes.peek(&"IWM".to_string()).is_none());
    }
}
