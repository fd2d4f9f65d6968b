//! Caller-supplied trading configuration.
//!
//! `TradingSettings` is read-only to the engine. Versioning and storage live
//! with the caller; this module only provides presets, validation and a
//! structural diff.

mod diff;
mod presets;
mod validation;

pub use diff::{calculate_settings_diff, SettingChange};
pub use validation::{validate_settings, SettingsValidation};

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::packet::StrategyKind;
use crate::regime::Trend;

/// Hard cap on per-trade risk, in percent of account size. Not overridable.
pub const MAX_RISK_PER_TRADE_PCT_CAP: Decimal = dec!(5);

/// Hard cap on total portfolio risk, in percent of account size. Not overridable.
pub const MAX_TOTAL_RISK_PCT_CAP: Decimal = dec!(25);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettingsPreset {
    Conservative,
    Balanced,
    Aggressive,
    Custom,
}

impl SettingsPreset {
    /// Presets that ship with defaults.
    #[must_use]
    pub fn builtin() -> [Self; 3] {
        [Self::Conservative, Self::Balanced, Self::Aggressive]
    }
}

impl std::str::FromStr for SettingsPreset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "conservative" => Ok(Self::Conservative),
            "balanced" => Ok(Self::Balanced),
            "aggressive" => Ok(Self::Aggressive),
            "custom" => Ok(Self::Custom),
            other => Err(format!("unknown preset: {other}")),
        }
    }
}

impl std::fmt::Display for SettingsPreset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Conservative => "conservative",
            Self::Balanced => "balanced",
            Self::Aggressive => "aggressive",
            Self::Custom => "custom",
        };
        write!(f, "{s}")
    }
}

/// Risk limits, all in percent of account size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskLimits {
    pub max_risk_per_trade_pct: Decimal,
    pub max_total_risk_pct: Decimal,
    /// Max loss that may be committed through execution in one day.
    pub max_daily_risk_pct: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiquidityFilters {
    /// Minimum average daily share volume of the underlying.
    pub min_underlying_volume: u64,
    pub min_open_interest: u64,
    pub min_option_volume: u64,
    /// Maximum bid-ask spread as a percent of mid.
    pub max_bid_ask_spread_pct: f64,
}

/// Per-strategy windows and switches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategySettings {
    pub enabled: bool,
    pub min_dte: i64,
    pub max_dte: i64,
    /// Absolute delta window of the short leg.
    pub target_delta_min: f64,
    pub target_delta_max: f64,
    /// Distance between short and long strikes, credit spreads only.
    pub spread_width: Option<Decimal>,
    /// Regime trends in which the strategy opts in.
    pub preferred_trends: Vec<Trend>,
}

impl StrategySettings {
    #[must_use]
    pub fn dte_in_range(&self, dte: i64) -> bool {
        dte >= self.min_dte && dte <= self.max_dte
    }

    #[must_use]
    pub fn delta_in_range(&self, abs_delta: f64) -> bool {
        abs_delta >= self.target_delta_min && abs_delta <= self.target_delta_max
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategySet {
    pub cash_secured_put: StrategySettings,
    pub covered_call: StrategySettings,
    pub put_credit_spread: StrategySettings,
    pub call_credit_spread: StrategySettings,
}

impl StrategySet {
    #[must_use]
    pub fn get(&self, kind: StrategyKind) -> &StrategySettings {
        match kind {
            StrategyKind::CashSecuredPut => &self.cash_secured_put,
            StrategyKind::CoveredCall => &self.covered_call,
            StrategyKind::PutCreditSpread => &self.put_credit_spread,
            StrategyKind::CallCreditSpread => &self.call_credit_spread,
        }
    }

    pub fn get_mut(&mut self, kind: StrategyKind) -> &mut StrategySettings {
        match kind {
            StrategyKind::CashSecuredPut => &mut self.cash_secured_put,
            StrategyKind::CoveredCall => &mut self.covered_call,
            StrategyKind::PutCreditSpread => &mut self.put_credit_spread,
            StrategyKind::CallCreditSpread => &mut self.call_credit_spread,
        }
    }

    /// Widest DTE band any enabled strategy accepts.
    #[must_use]
    pub fn dte_envelope(&self) -> Option<(i64, i64)> {
        StrategyKind::all()
            .iter()
            .map(|k| self.get(*k))
            .filter(|s| s.enabled)
            .fold(None, |acc, s| match acc {
                None => Some((s.min_dte, s.max_dte)),
                Some((lo, hi)) => Some((lo.min(s.min_dte), hi.max(s.max_dte))),
            })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingSettings {
    pub min_score: f64,
    pub top_per_strategy: usize,
    pub max_per_symbol: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UniverseSettings {
    pub symbols: Vec<String>,
    /// Basket used for regime detection (broad ETFs / mega caps).
    pub regime_symbols: Vec<String>,
}

/// Kill switches. Each class of action needs its switch explicitly on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSwitches {
    /// Master switch; when off every submission is rejected.
    pub trading_enabled: bool,
    /// Only meaningful when `trading_enabled` is on.
    pub broker_execution_enabled: bool,
    pub dry_run: bool,
    /// Simulate fills without contacting a broker.
    pub paper_mode_enabled: bool,
}

impl Default for ExecutionSwitches {
    fn default() -> Self {
        Self {
            trading_enabled: false,
            broker_execution_enabled: false,
            dry_run: true,
            paper_mode_enabled: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingSettings {
    pub preset: SettingsPreset,
    /// Account size in dollars, the base for every percentage limit.
    pub account_size: Decimal,
    pub risk: RiskLimits,
    pub liquidity: LiquidityFilters,
    /// New candidates are excluded this many days ahead of earnings.
    pub earnings_exclusion_days: i64,
    pub strategies: StrategySet,
    pub ranking: RankingSettings,
    pub universe: UniverseSettings,
    #[serde(default)]
    pub execution: ExecutionSwitches,
}

impl TradingSettings {
    /// Dollar budget for total committed risk.
    #[must_use]
    pub fn total_risk_budget(&self) -> Decimal {
        self.account_size * self.risk.max_total_risk_pct / Decimal::ONE_HUNDRED
    }

    /// Dollar cap on a single trade's max loss.
    #[must_use]
    pub fn per_trade_risk_budget(&self) -> Decimal {
        self.account_size * self.risk.max_risk_per_trade_pct / Decimal::ONE_HUNDRED
    }

    /// Dollar cap on max loss committed in one day.
    #[must_use]
    pub fn daily_risk_budget(&self) -> Decimal {
        self.account_size * self.risk.max_daily_risk_pct / Decimal::ONE_HUNDRED
    }
}

impl Default for TradingSettings {
    fn default() -> Self {
        get_default_settings(SettingsPreset::Balanced)
    }
}

/// Default settings for a preset. `Custom` starts from `Balanced`.
#[must_use]
pub fn get_default_settings(preset: SettingsPreset) -> TradingSettings {
    presets::for_preset(preset)
}
