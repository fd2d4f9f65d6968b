//! The engine: regime, signals, strategies and ranking for one run.
//!
//! A run is request-triggered. [`Engine::recompute`] walks the phases in
//! [`RunPhase`] order and never aborts on a single symbol: per-symbol
//! failures are collected as strings in [`RunStats::errors`].

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, NaiveDate, Utc};
use futures::future::join_all;
use premia_core::{
    AppConfig, Breadth, BreadthAssessment, EngineConfig, MarketRegime, OptionChain, Quote,
    StrategyKind, SymbolSignals, TradePacket, TradingSettings, Trend, VolatilityLevel,
};
use premia_market_data::{
    create_provider, CacheRegistry, CacheTtls, CachedProvider, MarketDataProvider, ProviderError,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::analyzer::{EarningsWindow, SymbolAnalyzer};
use crate::error::Result;
use crate::narrative::{generate_narrative, MarketNarrative};
use crate::ranker::{RankingOutcome, TradeRanker};
use crate::regime::{pick_benchmark, risk_mode, RegimeDetector, RegimeThresholds, PREFERRED_BENCHMARK};
use crate::strategy::{StrategyContext, StrategyRegistry};

/// Upper bound on a single provider call when none is configured.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// Run types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    NotStarted,
    RegimeComputed,
    SignalsComputed,
    CandidatesGenerated,
    Ranked,
    Done,
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NotStarted => "not_started",
            Self::RegimeComputed => "regime_computed",
            Self::SignalsComputed => "signals_computed",
            Self::CandidatesGenerated => "candidates_generated",
            Self::Ranked => "ranked",
            Self::Done => "done",
        };
        write!(f, "{s}")
    }
}

/// Per-run overrides. Anything left unset falls back to the settings'
/// universe or the engine defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RecomputeOptions {
    pub symbols: Option<Vec<String>>,
    pub regime_symbols: Option<Vec<String>>,
    /// Next earnings date per symbol.
    pub earnings: HashMap<String, NaiveDate>,
    /// Date the run treats as today. Defaults to the current UTC date.
    pub as_of: Option<NaiveDate>,
    pub max_expirations: Option<usize>,
    /// Inclusive DTE band for picking expirations.
    pub dte_band: Option<(i64, i64)>,
    pub workspace_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunStats {
    /// Every symbol attempted, failed ones included.
    pub symbols_processed: usize,
    pub symbols_with_candidates: usize,
    pub expirations_scanned: usize,
    pub candidates_generated: usize,
    pub candidates_after_filtering: usize,
    pub by_strategy: BTreeMap<StrategyKind, usize>,
    pub dropped_min_score: usize,
    pub dropped_strategy_cap: usize,
    pub dropped_symbol_cap: usize,
    pub dropped_risk_budget: usize,
    pub committed_risk: Decimal,
    /// One `"<SYMBOL>: <error>"` entry per failed symbol.
    pub errors: Vec<String>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecomputeResult {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub as_of: NaiveDate,
    pub phase: RunPhase,
    pub regime: MarketRegime,
    pub narrative: MarketNarrative,
    pub signals: Vec<SymbolSignals>,
    /// Every packet the strategies produced, unscored.
    pub candidates: Vec<TradePacket>,
    /// Scored and filtered, best first.
    pub ranked: Vec<TradePacket>,
    pub stats: RunStats,
}

struct RunTracker {
    run_id: Uuid,
    phase: RunPhase,
}

impl RunTracker {
    fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            phase: RunPhase::NotStarted,
        }
    }

    fn advance(&mut self, next: RunPhase) {
        tracing::debug!(run_id = %self.run_id, from = %self.phase, to = %next, "run phase");
        self.phase = next;
    }
}

/// Output of scanning one symbol.
struct SymbolScan {
    packets: Vec<TradePacket>,
    expirations: usize,
}

// ============================================================================
// Engine
// ============================================================================

/// Owns the cached provider, caches, strategies, detector, analyzer and
/// ranker. Cheap to share behind an `Arc`; each instance has its own caches.
pub struct Engine {
    provider: Arc<dyn MarketDataProvider>,
    caches: Arc<CacheRegistry>,
    strategies: StrategyRegistry,
    detector: RegimeDetector,
    analyzer: SymbolAnalyzer,
    ranker: TradeRanker,
    defaults: EngineConfig,
}

impl Engine {
    /// Wraps `provider` with fresh default caches and the default timeout.
    pub fn new(provider: Arc<dyn MarketDataProvider>) -> Self {
        Self::with_caches(
            provider,
            Arc::new(CacheRegistry::default()),
            DEFAULT_CALL_TIMEOUT,
            EngineConfig::default(),
        )
    }

    pub fn with_caches(
        provider: Arc<dyn MarketDataProvider>,
        caches: Arc<CacheRegistry>,
        call_timeout: Duration,
        defaults: EngineConfig,
    ) -> Self {
        let cached: Arc<dyn MarketDataProvider> =
            Arc::new(CachedProvider::new(provider, Arc::clone(&caches), call_timeout));
        let detector = RegimeDetector::new(Arc::clone(&cached))
            .with_volatility_proxy(defaults.volatility_proxy.clone())
            .with_cache(Arc::clone(&caches));
        let analyzer = SymbolAnalyzer::new(Arc::clone(&cached)).with_cache(Arc::clone(&caches));

        Self {
            provider: cached,
            caches,
            strategies: StrategyRegistry::standard(),
            detector,
            analyzer,
            ranker: TradeRanker::default(),
            defaults,
        }
    }

    /// Builds the configured provider, caches and run defaults. Starts the
    /// cache sweeper when called inside a tokio runtime.
    ///
    /// # Errors
    /// Returns an error if the provider cannot be constructed (e.g. missing token).
    pub fn from_config(config: &AppConfig) -> std::result::Result<Self, ProviderError> {
        let provider = create_provider(&config.provider)?;
        let caches = Arc::new(CacheRegistry::new(CacheTtls::from(&config.cache)));

        if config.cache.sweep_interval_secs > 0 {
            if tokio::runtime::Handle::try_current().is_ok() {
                caches.start_sweeper(Duration::from_secs(config.cache.sweep_interval_secs));
            } else {
                tracing::warn!("no tokio runtime, cache sweeper not started");
            }
        }

        Ok(Self::with_caches(
            provider,
            caches,
            config.provider.request_timeout(),
            config.engine.clone(),
        ))
    }

    #[must_use]
    pub fn with_strategies(mut self, strategies: StrategyRegistry) -> Self {
        self.strategies = strategies;
        self
    }

    #[must_use]
    pub fn with_ranker(mut self, ranker: TradeRanker) -> Self {
        self.ranker = ranker;
        self
    }

    #[must_use]
    pub fn with_regime_thresholds(mut self, thresholds: RegimeThresholds) -> Self {
        self.analyzer = self.analyzer.with_strong_trend_margin(thresholds.strong_trend_margin);
        self.detector = self.detector.with_thresholds(thresholds);
        self
    }

    #[must_use]
    pub fn caches(&self) -> &Arc<CacheRegistry> {
        &self.caches
    }

    #[must_use]
    pub fn provider(&self) -> &Arc<dyn MarketDataProvider> {
        &self.provider
    }

    #[must_use]
    pub fn defaults(&self) -> &EngineConfig {
        &self.defaults
    }

    // ------------------------------------------------------------------------
    // Narrow entry points
    // ------------------------------------------------------------------------

    /// # Errors
    /// Returns `EngineError::Provider` if the benchmark cannot be loaded.
    pub async fn get_market_regime(&self, symbols: &[String]) -> Result<MarketRegime> {
        Ok(self.detector.detect(symbols).await?)
    }

    /// # Errors
    /// Returns `EngineError::Provider` if the regime cannot be computed.
    pub async fn generate_market_narrative(
        &self,
        symbols: &[String],
        workspace_id: Option<&str>,
    ) -> Result<MarketNarrative> {
        let regime = self.get_market_regime(symbols).await?;
        Ok(generate_narrative(&regime, workspace_id))
    }

    /// Signals for one symbol as of today.
    ///
    /// # Errors
    /// Returns `EngineError::Provider` if history or the quote is unavailable.
    pub async fn analyze_symbol(
        &self,
        symbol: &str,
        settings: &TradingSettings,
        earnings_date: Option<NaiveDate>,
    ) -> Result<SymbolSignals> {
        let window = EarningsWindow {
            next_earnings: earnings_date,
            exclusion_days: settings.earnings_exclusion_days,
            as_of: Utc::now().date_naive(),
        };
        Ok(self.analyzer.analyze(symbol, window).await?)
    }

    // ------------------------------------------------------------------------
    // Full run
    // ------------------------------------------------------------------------

    /// Runs regime, narrative, signals, strategies and ranking.
    ///
    /// # Errors
    /// Returns `EngineError::Validation` if `settings` are invalid. Provider
    /// failures never fail the run; they land in `stats.errors`.
    pub async fn recompute(&self, settings: &TradingSettings, options: RecomputeOptions) -> Result<RecomputeResult> {
        settings.validate()?;

        let clock = Instant::now();
        let started_at = Utc::now();
        let run_id = Uuid::new_v4();
        let as_of = options.as_of.unwrap_or_else(|| started_at.date_naive());
        let mut tracker = RunTracker::new(run_id);
        let mut stats = RunStats::default();

        let symbols = normalize_symbols(options.symbols.as_deref().unwrap_or(settings.universe.symbols.as_slice()));
        let regime_symbols = normalize_symbols(
            options
                .regime_symbols
                .as_deref()
                .unwrap_or(settings.universe.regime_symbols.as_slice()),
        );
        let max_expirations = options.max_expirations.unwrap_or(self.defaults.max_expirations);
        let (band_min, band_max) = options
            .dte_band
            .unwrap_or((self.defaults.dte_band_min, self.defaults.dte_band_max));

        tracing::info!(
            %run_id,
            symbols = symbols.len(),
            preset = %settings.preset,
            %as_of,
            "recompute started"
        );

        let regime = match self.detector.detect(&regime_symbols).await {
            Ok(regime) => regime,
            Err(e) => {
                tracing::warn!(%run_id, error = %e, "regime detection failed, assuming neutral");
                stats.errors.push(format!("regime: {e}"));
                neutral_regime(&regime_symbols)
            }
        };
        tracker.advance(RunPhase::RegimeComputed);

        let narrative = generate_narrative(&regime, options.workspace_id.as_deref());

        let earnings: HashMap<String, NaiveDate> = options
            .earnings
            .iter()
            .map(|(symbol, date)| (symbol.trim().to_uppercase(), *date))
            .collect();
        let analyzed = self
            .analyzer
            .analyze_batch(&symbols, &earnings, settings.earnings_exclusion_days, as_of)
            .await;
        let quotes = self.provider.get_batch_quotes(&symbols).await;
        tracker.advance(RunPhase::SignalsComputed);

        let mut signals = Vec::with_capacity(symbols.len());
        let mut candidates = Vec::new();
        for (symbol, analysis) in analyzed {
            stats.symbols_processed += 1;
            let outcome = match analysis {
                Ok(symbol_signals) => {
                    let scan = self
                        .scan_symbol(
                            &symbol,
                            &symbol_signals,
                            quotes.get(&symbol),
                            &regime,
                            settings,
                            as_of,
                            (band_min, band_max),
                            max_expirations,
                        )
                        .await;
                    signals.push(symbol_signals);
                    scan
                }
                Err(e) => Err(e),
            };

            match outcome {
                Ok(scan) => {
                    stats.expirations_scanned += scan.expirations;
                    if !scan.packets.is_empty() {
                        stats.symbols_with_candidates += 1;
                    }
                    candidates.extend(scan.packets);
                }
                Err(e) => {
                    tracing::warn!(%run_id, %symbol, error = %e, "symbol skipped");
                    stats.errors.push(format!("{symbol}: {e}"));
                }
            }
        }
        stats.candidates_generated = candidates.len();
        for packet in &candidates {
            *stats.by_strategy.entry(packet.strategy).or_default() += 1;
        }
        tracker.advance(RunPhase::CandidatesGenerated);

        let RankingOutcome {
            ranked,
            dropped_min_score,
            dropped_strategy_cap,
            dropped_symbol_cap,
            dropped_risk_budget,
            committed_risk,
            ..
        } = self.ranker.rank(&candidates, &regime, settings);
        stats.candidates_after_filtering = ranked.len();
        stats.dropped_min_score = dropped_min_score;
        stats.dropped_strategy_cap = dropped_strategy_cap;
        stats.dropped_symbol_cap = dropped_symbol_cap;
        stats.dropped_risk_budget = dropped_risk_budget;
        stats.committed_risk = committed_risk;
        tracker.advance(RunPhase::Ranked);

        stats.duration_ms = u64::try_from(clock.elapsed().as_millis()).unwrap_or(u64::MAX);
        tracker.advance(RunPhase::Done);

        tracing::info!(
            %run_id,
            trend = %regime.trend,
            volatility = %regime.volatility,
            processed = stats.symbols_processed,
            candidates = stats.candidates_generated,
            ranked = stats.candidates_after_filtering,
            errors = stats.errors.len(),
            duration_ms = stats.duration_ms,
            "recompute finished"
        );

        Ok(RecomputeResult {
            run_id,
            started_at,
            completed_at: Utc::now(),
            as_of,
            phase: tracker.phase,
            regime,
            narrative,
            signals,
            candidates,
            ranked,
            stats,
        })
    }

    /// Expirations inside the band, one chain per expiration, every
    /// strategy per chain. Fails only if no chain could be loaded.
    #[allow(clippy::too_many_arguments)]
    async fn scan_symbol(
        &self,
        symbol: &str,
        signals: &SymbolSignals,
        quote: Option<&Quote>,
        regime: &MarketRegime,
        settings: &TradingSettings,
        as_of: NaiveDate,
        (band_min, band_max): (i64, i64),
        max_expirations: usize,
    ) -> std::result::Result<SymbolScan, ProviderError> {
        let mut expirations: Vec<NaiveDate> = self
            .provider
            .get_option_expirations(symbol)
            .await?
            .into_iter()
            .filter(|date| {
                let dte = (*date - as_of).num_days();
                dte >= band_min && dte <= band_max
            })
            .collect();
        expirations.sort();
        expirations.dedup();
        expirations.truncate(max_expirations);

        if expirations.is_empty() {
            tracing::debug!(symbol, band_min, band_max, "no expirations in band");
            return Ok(SymbolScan {
                packets: Vec::new(),
                expirations: 0,
            });
        }

        let chains: Vec<(NaiveDate, std::result::Result<OptionChain, ProviderError>)> = join_all(
            expirations
                .iter()
                .map(|expiration| async move { (*expiration, self.provider.get_option_chain(symbol, *expiration).await) }),
        )
        .await;

        let mut packets = Vec::new();
        let mut loaded = 0usize;
        let mut last_error = None;
        for (expiration, chain) in chains {
            let chain = match chain {
                Ok(chain) => chain,
                Err(e) => {
                    tracing::warn!(symbol, %expiration, error = %e, "option chain unavailable");
                    last_error = Some(e);
                    continue;
                }
            };
            loaded += 1;

            let underlying_price = quote
                .map(|q| q.last)
                .filter(|p| *p > Decimal::ZERO)
                .or_else(|| Some(chain.underlying_price).filter(|p| *p > Decimal::ZERO))
                .unwrap_or(signals.price);

            let ctx = StrategyContext {
                symbol,
                chain: &chain,
                underlying_price,
                signals,
                regime,
                settings,
                today: as_of,
            };
            packets.extend(self.strategies.generate(&ctx));
        }

        if loaded == 0 {
            if let Some(e) = last_error {
                return Err(e);
            }
        }

        Ok(SymbolScan {
            packets,
            expirations: loaded,
        })
    }
}

/// Upper-cased, trimmed, de-duplicated, first occurrence wins.
fn normalize_symbols(symbols: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    symbols
        .iter()
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty() && seen.insert(s.clone()))
        .collect()
}

/// Stand-in when detection fails so the run can still proceed.
fn neutral_regime(symbols: &[String]) -> MarketRegime {
    let volatility = VolatilityLevel::Normal;
    MarketRegime {
        trend: Trend::Neutral,
        volatility,
        risk: risk_mode(Trend::Neutral, volatility),
        breadth: Breadth {
            assessment: BreadthAssessment::Mixed,
            pct_above_ma: 50.0,
            sample_size: 0,
        },
        benchmark: pick_benchmark(symbols).unwrap_or_else(|| PREFERRED_BENCHMARK.to_string()),
        benchmark_price: Decimal::ZERO,
        volatility_index: 0.0,
        computed_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use premia_market_data::SimulatedProvider;

    fn as_of() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 11, 20).unwrap()
    }

    fn engine(provider: SimulatedProvider) -> Engine {
        Engine::new(Arc::new(provider.with_as_of(as_of())))
    }

    #[test]
    fn symbols_are_normalized_in_order() {
        let symbols = vec![" aapl".to_string(), "SPY".to_string(), "AAPL".to_string(), String::new()];
        assert_eq!(normalize_symbols(&symbols), vec!["AAPL", "SPY"]);
    }

    #[test]
    fn neutral_fallback_uses_basket_benchmark() {
        let regime = neutral_regime(&["QQQ".to_string()]);
        assert_eq!(regime.trend, Trend::Neutral);
        assert_eq!(regime.benchmark, "QQQ");
    }

    #[tokio::test]
    async fn invalid_settings_fail_before_any_work() {
        let engine = engine(SimulatedProvider::new());
        let mut settings = TradingSettings::default();
        settings.risk.max_risk_per_trade_pct = rust_decimal_macros::dec!(9);
        let err = engine.recompute(&settings, RecomputeOptions::default()).await.unwrap_err();
        assert!(matches!(err, crate::error::EngineError::Validation(_)));
    }

    #[tokio::test]
    async fn run_ends_in_done_phase() {
        let engine = engine(SimulatedProvider::new());
        let options = RecomputeOptions {
            symbols: Some(vec!["SPY".to_string()]),
            as_of: Some(as_of()),
            ..RecomputeOptions::default()
        };
        let result = engine.recompute(&TradingSettings::default(), options).await.unwrap();
        assert_eq!(result.phase, RunPhase::Done);
        assert_eq!(result.stats.symbols_processed, 1);
        assert!(result.stats.expirations_scanned <= 4);
    }

    #[tokio::test]
    async fn failing_regime_basket_falls_back_to_neutral() {
        let engine = engine(SimulatedProvider::new().with_failing_symbols(["SPY", "QQQ"]));
        let options = RecomputeOptions {
            symbols: Some(vec!["AAPL".to_string()]),
            regime_symbols: Some(vec!["SPY".to_string(), "QQQ".to_string()]),
            as_of: Some(as_of()),
            ..RecomputeOptions::default()
        };
        let result = engine.recompute(&TradingSettings::default(), options).await.unwrap();
        assert_eq!(result.regime.trend, Trend::Neutral);
        assert!(result.stats.errors.iter().any(|e| e.starts_with("regime: ")));
    }

    #[tokio::test]
    async fn narrow_entry_points() {
        let engine = engine(SimulatedProvider::new());
        let basket = vec!["SPY".to_string(), "QQQ".to_string()];

        let regime = engine.get_market_regime(&basket).await.unwrap();
        assert_eq!(regime.benchmark, "SPY");

        let narrative = engine.generate_market_narrative(&basket, Some("ws")).await.unwrap();
        assert_eq!(narrative.workspace_id.as_deref(), Some("ws"));

        let err = engine
            .analyze_symbol("NOPE", &TradingSettings::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, crate::error::EngineError::Provider(ref e) if e.is_unknown_symbol()));
    }
}
