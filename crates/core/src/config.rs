//! Application configuration: data provider, broker, cache TTLs, run defaults.
//!
//! Trading settings are not part of this file; they are supplied per run by
//! the caller (see [`crate::settings`]).

use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub provider: ProviderConfig,
    pub broker: BrokerConfig,
    pub cache: CacheConfig,
    pub engine: EngineConfig,
}

/// Market data vendor selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Simulated,
    Tradier,
    Polygon,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    /// Overrides the vendor's default API root (useful for sandboxes and tests).
    pub base_url: Option<String>,
    pub api_token: Option<String>,
    /// Minimum spacing between outbound requests.
    pub min_request_interval_ms: u64,
    /// Upper bound on a single provider call.
    pub request_timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::Simulated,
            base_url: None,
            api_token: None,
            min_request_interval_ms: 250,
            request_timeout_secs: 10,
        }
    }
}

impl ProviderConfig {
    #[must_use]
    pub fn min_request_interval(&self) -> Duration {
        Duration::from_millis(self.min_request_interval_ms)
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrokerKind {
    /// Orders become tickets a human places by hand.
    Manual,
    Paper,
    Tradier,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub kind: BrokerKind,
    pub base_url: Option<String>,
    pub api_token: Option<String>,
    pub account_id: Option<String>,
    /// Starting cash for the paper broker and for paper-mode simulation.
    pub paper_starting_cash: Decimal,
    pub request_timeout_secs: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            kind: BrokerKind::Paper,
            base_url: None,
            api_token: None,
            account_id: None,
            paper_starting_cash: dec!(100000),
            request_timeout_secs: 15,
        }
    }
}

/// Time-to-live per data kind, reflecting how fast each goes stale.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub quote_ttl_secs: u64,
    pub chain_ttl_secs: u64,
    pub expirations_ttl_secs: u64,
    pub history_ttl_secs: u64,
    pub volatility_ttl_secs: u64,
    /// Regime and per-symbol signal aggregates.
    pub aggregate_ttl_secs: u64,
    /// Background sweep cadence; 0 disables the sweeper.
    pub sweep_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            quote_ttl_secs: 30,
            chain_ttl_secs: 60,
            expirations_ttl_secs: 300,
            history_ttl_secs: 300,
            volatility_ttl_secs: 300,
            aggregate_ttl_secs: 300,
            sweep_interval_secs: 60,
        }
    }
}

/// Defaults for a recompute run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Expirations scanned per symbol.
    pub max_expirations: usize,
    /// Broad DTE band used to pick expirations before strategy windows apply.
    pub dte_band_min: i64,
    pub dte_band_max: i64,
    /// Symbol used as the VIX-like volatility proxy.
    pub volatility_proxy: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_expirations: 4,
            dte_band_min: 14,
            dte_band_max: 60,
            volatility_proxy: "VIX".to_string(),
        }
    }
}
