//! Market regime detection over a symbol basket.

use std::sync::Arc;

use chrono::Utc;
use premia_core::{
    Breadth, BreadthAssessment, HistoricalPrice, HistoryRange, MarketRegime, RiskMode, Trend, VolatilityLevel,
};
use premia_market_data::derived::closes;
use premia_market_data::{fan_out, CacheRegistry, MarketDataProvider, ProviderError};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::indicators::{classify_trend, sma, DEFAULT_STRONG_TREND_MARGIN};

/// Benchmark used whenever it is part of the basket.
pub const PREFERRED_BENCHMARK: &str = "SPY";

/// Bucketing thresholds for regime classification.
#[derive(Debug, Clone)]
pub struct RegimeThresholds {
    /// Proxy below this is `Low`.
    pub low_below: f64,
    /// Proxy below this is `Normal`.
    pub normal_below: f64,
    /// Proxy below this is `Elevated`.
    pub elevated_below: f64,
    /// Proxy below this is `High`; at or above is `Panic`.
    pub high_below: f64,
    /// Distance from SMA50 that makes a trend strong (0.03 = 3%).
    pub strong_trend_margin: f64,
    /// Share of the basket above its SMA50 for `Broad` breadth.
    pub broad_breadth: f64,
    /// Share of the basket above its SMA50 below which breadth is `Narrow`.
    pub narrow_breadth: f64,
}

impl Default for RegimeThresholds {
    fn default() -> Self {
        Self {
            low_below: 15.0,
            normal_below: 20.0,
            elevated_below: 25.0,
            high_below: 35.0,
            strong_trend_margin: DEFAULT_STRONG_TREND_MARGIN,
            broad_breadth: 0.65,
            narrow_breadth: 0.40,
        }
    }
}

impl RegimeThresholds {
    #[must_use]
    pub fn volatility_level(&self, proxy: f64) -> VolatilityLevel {
        if proxy < self.low_below {
            VolatilityLevel::Low
        } else if proxy < self.normal_below {
            VolatilityLevel::Normal
        } else if proxy < self.elevated_below {
            VolatilityLevel::Elevated
        } else if proxy < self.high_below {
            VolatilityLevel::High
        } else {
            VolatilityLevel::Panic
        }
    }

    #[must_use]
    pub fn breadth_assessment(&self, share_above: f64) -> BreadthAssessment {
        if share_above >= self.broad_breadth {
            BreadthAssessment::Broad
        } else if share_above < self.narrow_breadth {
            BreadthAssessment::Narrow
        } else {
            BreadthAssessment::Mixed
        }
    }
}

/// Risk-on iff the trend is not a downtrend and volatility is below `High`.
#[must_use]
pub fn risk_mode(trend: Trend, volatility: VolatilityLevel) -> RiskMode {
    if !trend.is_bearish() && volatility < VolatilityLevel::High {
        RiskMode::RiskOn
    } else {
        RiskMode::RiskOff
    }
}

/// The benchmark for a basket: SPY if present, else the first symbol.
#[must_use]
pub fn pick_benchmark(symbols: &[String]) -> Option<String> {
    benchmark_candidates(symbols).into_iter().next()
}

/// Basket members in benchmark preference order: SPY first when present,
/// then the rest in basket order, without duplicates.
#[must_use]
pub fn benchmark_candidates(symbols: &[String]) -> Vec<String> {
    let mut ordered: Vec<String> = Vec::with_capacity(symbols.len());
    if symbols.iter().any(|s| s.eq_ignore_ascii_case(PREFERRED_BENCHMARK)) {
        ordered.push(PREFERRED_BENCHMARK.to_string());
    }
    for symbol in symbols.iter().map(|s| s.trim().to_uppercase()) {
        if !symbol.is_empty() && !ordered.contains(&symbol) {
            ordered.push(symbol);
        }
    }
    ordered
}

/// Turns a basket of symbols into one `MarketRegime`.
///
/// Deterministic for identical provider data. Breadth tolerates failing
/// basket members. A failing benchmark hands over to the next basket member
/// whose history loads; detection fails only when none does.
#[derive(Clone)]
pub struct RegimeDetector {
    provider: Arc<dyn MarketDataProvider>,
    thresholds: RegimeThresholds,
    volatility_proxy: String,
    caches: Option<Arc<CacheRegistry>>,
}

impl RegimeDetector {
    pub fn new(provider: Arc<dyn MarketDataProvider>) -> Self {
        Self {
            provider,
            thresholds: RegimeThresholds::default(),
            volatility_proxy: "VIX".to_string(),
            caches: None,
        }
    }

    #[must_use]
    pub fn with_thresholds(mut self, thresholds: RegimeThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    #[must_use]
    pub fn with_volatility_proxy(mut self, symbol: impl Into<String>) -> Self {
        self.volatility_proxy = symbol.into().to_uppercase();
        self
    }

    /// Memoizes results in the registry's aggregate cache.
    #[must_use]
    pub fn with_cache(mut self, caches: Arc<CacheRegistry>) -> Self {
        self.caches = Some(caches);
        self
    }

    #[must_use]
    pub fn thresholds(&self) -> &RegimeThresholds {
        &self.thresholds
    }

    pub async fn detect(&self, symbols: &[String]) -> Result<MarketRegime, ProviderError> {
        let Some(caches) = &self.caches else {
            return self.compute(symbols).await;
        };

        let mut basket: Vec<String> = symbols.iter().map(|s| s.to_uppercase()).collect();
        basket.sort();
        basket.dedup();
        let key = format!("{}|{}", basket.join(","), self.volatility_proxy);

        let detector = self.clone();
        let symbols = symbols.to_vec();
        caches
            .regimes
            .get_or_fetch(key, move || async move { detector.compute(&symbols).await })
            .await
    }

    async fn compute(&self, symbols: &[String]) -> Result<MarketRegime, ProviderError> {
        let candidates = benchmark_candidates(symbols);
        if candidates.is_empty() {
            return Err(ProviderError::InsufficientData("empty regime basket".to_string()));
        }
        let basket: Vec<String> = symbols.iter().map(|s| s.to_uppercase()).collect();

        let provider = &self.provider;
        let (benchmark_load, proxy_quote, breadth_histories) = tokio::join!(
            self.load_benchmark(&candidates),
            provider.get_quote(&self.volatility_proxy),
            fan_out(&basket, |symbol| async move {
                provider.get_historical_prices(&symbol, HistoryRange::ThreeMonths).await
            }),
        );

        let (benchmark, benchmark_history) = benchmark_load?;
        let benchmark_closes = closes(&benchmark_history);
        let Some(&last_close) = benchmark_closes.last() else {
            return Err(ProviderError::InsufficientData(format!("no history for {benchmark}")));
        };

        let trend = classify_trend(
            last_close,
            sma(&benchmark_closes, 50),
            sma(&benchmark_closes, 200),
            self.thresholds.strong_trend_margin,
        );

        let volatility_index = match proxy_quote {
            Ok(quote) if quote.last > Decimal::ZERO => quote.last.to_f64().unwrap_or(0.0),
            other => {
                if let Err(e) = other {
                    tracing::debug!(proxy = %self.volatility_proxy, error = %e, "volatility proxy unavailable, using benchmark IV");
                }
                self.benchmark_volatility_points(&benchmark).await?
            }
        };
        let volatility = self.thresholds.volatility_level(volatility_index);

        let mut above = 0usize;
        let mut sampled = 0usize;
        for (symbol, history) in breadth_histories {
            match history {
                Ok(history) => {
                    let closes = closes(&history);
                    if let (Some(last), Some(average)) = (closes.last(), sma(&closes, 50)) {
                        sampled += 1;
                        if *last > average {
                            above += 1;
                        }
                    }
                }
                Err(e) => {
                    tracing::debug!(%symbol, error = %e, "basket member excluded from breadth");
                }
            }
        }
        let share_above = if sampled == 0 {
            0.5
        } else {
            above as f64 / sampled as f64
        };
        let breadth = Breadth {
            assessment: self.thresholds.breadth_assessment(share_above),
            pct_above_ma: share_above * 100.0,
            sample_size: sampled,
        };

        let regime = MarketRegime {
            trend,
            volatility,
            risk: risk_mode(trend, volatility),
            breadth,
            benchmark,
            benchmark_price: benchmark_history.last().map(|b| b.close).unwrap_or_default(),
            volatility_index,
            computed_at: Utc::now(),
        };

        tracing::info!(
            benchmark = %regime.benchmark,
            trend = %regime.trend,
            volatility = %regime.volatility,
            vix = regime.volatility_index,
            breadth_pct = regime.breadth.pct_above_ma,
            "market regime computed"
        );
        Ok(regime)
    }

    /// First candidate with a non-empty one-year history.
    async fn load_benchmark(&self, candidates: &[String]) -> Result<(String, Vec<HistoricalPrice>), ProviderError> {
        let mut last_error = None;
        for symbol in candidates {
            match self.provider.get_historical_prices(symbol, HistoryRange::OneYear).await {
                Ok(history) if !history.is_empty() => return Ok((symbol.clone(), history)),
                Ok(_) => {
                    last_error = Some(ProviderError::InsufficientData(format!("no history for {symbol}")));
                }
                Err(e) => {
                    tracing::warn!(%symbol, error = %e, "benchmark unavailable, trying next basket member");
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| ProviderError::InsufficientData("empty regime basket".to_string())))
    }

    /// Benchmark implied volatility in VIX points, falling back to realized.
    async fn benchmark_volatility_points(&self, benchmark: &str) -> Result<f64, ProviderError> {
        let data = self.provider.get_volatility_data(benchmark).await?;
        Ok(data
            .implied_volatility
            .unwrap_or(data.historical_volatility)
            * 100.0)
    }
}
