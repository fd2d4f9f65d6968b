//! Trade generation for premia.
//!
//! The [`Engine`] computes a market regime, analyzes each symbol in the
//! universe, runs every registered strategy over the nearby option chains
//! and ranks the resulting packets against the caller's settings.
//!
//! ```ignore
//! let engine = Engine::new(Arc::new(SimulatedProvider::new()));
//! let settings = get_default_settings(SettingsPreset::Balanced);
//! let result = engine.recompute(&settings, RecomputeOptions::default()).await?;
//! for packet in &result.ranked {
//!     println!("{} {} score {:.1}", packet.symbol, packet.strategy, packet.score);
//! }
//! ```

pub mod analyzer;
pub mod error;
pub mod indicators;
pub mod narrative;
pub mod orchestrator;
pub mod ranker;
pub mod regime;
pub mod strategy;

pub use analyzer::{EarningsWindow, SymbolAnalyzer};
pub use error::{EngineError, Result};
pub use narrative::{generate_narrative, MarketNarrative};
pub use orchestrator::{
    Engine, RecomputeOptions, RecomputeResult, RunPhase, RunStats, DEFAULT_CALL_TIMEOUT,
};
pub use ranker::{score_packet, RankingOutcome, ScoringWeights, TradeRanker};
pub use regime::{RegimeDetector, RegimeThresholds};
pub use strategy::{
    CallCreditSpread, Candidate, CashSecuredPut, CoveredCall, PutCreditSpread, StrategyContext,
    StrategyRegistry, TradeStrategy,
};
