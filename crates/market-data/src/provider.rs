//! The market data provider abstraction.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use premia_core::{HistoricalPrice, HistoryRange, OptionChain, Quote, VolatilityData};

use crate::batch::fan_out;
use crate::error::Result;

/// Source of quotes, history, option chains and volatility.
///
/// Implementations must be cheap to share behind an `Arc`. Every method is
/// independent; callers decide caching and timeouts (see `CachedProvider`).
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Short provider name for logs.
    fn name(&self) -> &str;

    async fn get_quote(&self, symbol: &str) -> Result<Quote>;

    /// Quotes for many symbols. Symbols that fail are omitted, never fatal.
    async fn get_batch_quotes(&self, symbols: &[String]) -> HashMap<String, Quote> {
        fan_out(symbols, |symbol| async move { self.get_quote(&symbol).await })
            .await
            .into_iter()
            .filter_map(|(symbol, result)| match result {
                Ok(quote) => Some((symbol, quote)),
                Err(e) => {
                    tracing::debug!(provider = self.name(), %symbol, error = %e, "quote omitted from batch");
                    None
                }
            })
            .collect()
    }

    /// Daily bars, oldest first.
    async fn get_historical_prices(
        &self,
        symbol: &str,
        range: HistoryRange,
    ) -> Result<Vec<HistoricalPrice>>;

    async fn get_option_chain(&self, symbol: &str, expiration: NaiveDate) -> Result<OptionChain>;

    /// Listed expirations, ascending.
    async fn get_option_expirations(&self, symbol: &str) -> Result<Vec<NaiveDate>>;

    async fn get_volatility_data(&self, symbol: &str) -> Result<VolatilityData>;
}
