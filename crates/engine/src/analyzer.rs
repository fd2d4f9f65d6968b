//! Per-symbol feature extraction.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use premia_core::{HistoryRange, SymbolSignals};
use premia_market_data::derived::closes;
use premia_market_data::{fan_out, CacheRegistry, MarketDataProvider, ProviderError};
use rust_decimal::prelude::ToPrimitive;

use crate::indicators::{
    average_volume, classify_trend, historical_volatility, rsi, sma, DEFAULT_STRONG_TREND_MARGIN,
    HV_WINDOW,
};

/// Sessions averaged for the underlying volume floor.
const VOLUME_WINDOW: usize = 20;

/// Earnings inputs for one analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EarningsWindow {
    pub next_earnings: Option<NaiveDate>,
    /// Days ahead of earnings in which a symbol is excluded.
    pub exclusion_days: i64,
    pub as_of: NaiveDate,
}

impl EarningsWindow {
    /// Days from `as_of` to the next earnings date, if known.
    #[must_use]
    pub fn days_to_earnings(&self) -> Option<i64> {
        self.next_earnings.map(|date| (date - self.as_of).num_days())
    }

    /// Excluded iff `0 <= earnings - as_of <= exclusion_days`.
    #[must_use]
    pub fn is_excluded(&self) -> bool {
        self.days_to_earnings()
            .is_some_and(|days| days >= 0 && days <= self.exclusion_days)
    }
}

/// Computes `SymbolSignals` from a year of history, the quote and
/// volatility data.
#[derive(Clone)]
pub struct SymbolAnalyzer {
    provider: Arc<dyn MarketDataProvider>,
    strong_trend_margin: f64,
    caches: Option<Arc<CacheRegistry>>,
}

impl SymbolAnalyzer {
    pub fn new(provider: Arc<dyn MarketDataProvider>) -> Self {
        Self {
            provider,
            strong_trend_margin: DEFAULT_STRONG_TREND_MARGIN,
            caches: None,
        }
    }

    #[must_use]
    pub fn with_strong_trend_margin(mut self, margin: f64) -> Self {
        self.strong_trend_margin = margin;
        self
    }

    /// Memoizes results in the registry's aggregate cache.
    #[must_use]
    pub fn with_cache(mut self, caches: Arc<CacheRegistry>) -> Self {
        self.caches = Some(caches);
        self
    }

    pub async fn analyze(&self, symbol: &str, earnings: EarningsWindow) -> Result<SymbolSignals, ProviderError> {
        let symbol = symbol.trim().to_uppercase();
        let Some(caches) = &self.caches else {
            return self.compute(&symbol, earnings).await;
        };

        let key = format!(
            "{symbol}|{}|{:?}|{}",
            earnings.as_of, earnings.next_earnings, earnings.exclusion_days
        );
        let analyzer = self.clone();
        caches
            .signals
            .get_or_fetch(key, move || async move { analyzer.compute(&symbol, earnings).await })
            .await
    }

    /// Analyzes every symbol concurrently. One result per input symbol, in
    /// input order; a failure never affects the other symbols.
    pub async fn analyze_batch(
        &self,
        symbols: &[String],
        earnings_calendar: &HashMap<String, NaiveDate>,
        exclusion_days: i64,
        as_of: NaiveDate,
    ) -> Vec<(String, Result<SymbolSignals, ProviderError>)> {
        fan_out(symbols, |symbol| {
            let window = EarningsWindow {
                next_earnings: earnings_calendar.get(&symbol.to_uppercase()).copied(),
                exclusion_days,
                as_of,
            };
            async move { self.analyze(&symbol, window).await }
        })
        .await
    }

    async fn compute(&self, symbol: &str, earnings: EarningsWindow) -> Result<SymbolSignals, ProviderError> {
        let (history, quote, volatility) = tokio::join!(
            self.provider.get_historical_prices(symbol, HistoryRange::OneYear),
            self.provider.get_quote(symbol),
            self.provider.get_volatility_data(symbol),
        );
        let history = history?;
        let quote = quote?;
        let volatility = match volatility {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::debug!(symbol, error = %e, "volatility data unavailable");
                None
            }
        };

        if history.is_empty() {
            return Err(ProviderError::InsufficientData(format!("no price history for {symbol}")));
        }

        let closes = closes(&history);
        let price = quote.last.to_f64().unwrap_or_else(|| closes.last().copied().unwrap_or(0.0));
        let sma_50 = sma(&closes, 50);
        let sma_200 = sma(&closes, 200);

        let historical_volatility = historical_volatility(&closes, HV_WINDOW)
            .or_else(|| volatility.as_ref().map(|v| v.historical_volatility))
            .unwrap_or(0.0);

        let signals = SymbolSignals {
            symbol: symbol.to_string(),
            price: quote.last,
            change_pct: quote.change_pct,
            sma_20: sma(&closes, 20),
            sma_50,
            sma_200,
            rsi_14: rsi(&closes, 14),
            historical_volatility,
            implied_volatility: volatility.as_ref().and_then(|v| v.implied_volatility),
            iv_rank: volatility.as_ref().and_then(|v| v.iv_rank),
            average_volume: average_volume(&history, VOLUME_WINDOW).unwrap_or(quote.average_volume),
            trend: classify_trend(price, sma_50, sma_200, self.strong_trend_margin),
            earnings_date: earnings.next_earnings,
            days_to_earnings: earnings.days_to_earnings(),
            earnings_excluded: earnings.is_excluded(),
            computed_at: Utc::now(),
        };

        tracing::debug!(
            symbol,
            trend = %signals.trend,
            hv = signals.historical_volatility,
            excluded = signals.earnings_excluded,
            "symbol analyzed"
        );
        Ok(signals)
    }
}
