//! Core types for the premia options trade-generation engine.
//!
//! Market snapshots, regime and signal records, trade packets, caller-supplied
//! trading settings, and application configuration. Everything here is plain
//! serializable data; behavior lives in the engine and broker crates.

pub mod config;
pub mod config_loader;
pub mod error;
pub mod market;
pub mod packet;
pub mod regime;
pub mod settings;
pub mod signals;

pub use config::{
    AppConfig, BrokerConfig, BrokerKind, CacheConfig, EngineConfig, ProviderConfig, ProviderKind,
};
pub use config_loader::ConfigLoader;
pub use error::ValidationError;
pub use market::{
    occ_symbol, parse_occ_symbol, HistoricalPrice, HistoryRange, OccParts, OptionChain,
    OptionContract, OptionGreeks, OptionRight, Quote, VolatilityData,
};
pub use packet::{
    LegAction, LiquiditySnapshot, OptionLeg, ScoreBreakdown, StrategyKind, TradePacket,
};
pub use regime::{Breadth, BreadthAssessment, MarketRegime, RiskMode, Trend, VolatilityLevel};
pub use settings::{
    calculate_settings_diff, get_default_settings, validate_settings, SettingChange,
    SettingsPreset, SettingsValidation, TradingSettings,
};
pub use signals::SymbolSignals;
