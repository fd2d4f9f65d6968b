//! Market regime classification types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Trend classification, ordered from most bearish to most bullish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    StrongDowntrend,
    Downtrend,
    Neutral,
    Uptrend,
    StrongUptrend,
}

impl Trend {
    #[must_use]
    pub fn is_bullish(self) -> bool {
        matches!(self, Self::Uptrend | Self::StrongUptrend)
    }

    #[must_use]
    pub fn is_bearish(self) -> bool {
        matches!(self, Self::Downtrend | Self::StrongDowntrend)
    }

    /// Every trend, bearish to bullish.
    #[must_use]
    pub fn all() -> Vec<Self> {
        vec![
            Self::StrongDowntrend,
            Self::Downtrend,
            Self::Neutral,
            Self::Uptrend,
            Self::StrongUptrend,
        ]
    }
}

impl std::fmt::Display for Trend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::StrongDowntrend => "strong downtrend",
            Self::Downtrend => "downtrend",
            Self::Neutral => "neutral",
            Self::Uptrend => "uptrend",
            Self::StrongUptrend => "strong uptrend",
        };
        write!(f, "{s}")
    }
}

/// Volatility bucket derived from a VIX-like proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolatilityLevel {
    Low,
    Normal,
    Elevated,
    High,
    Panic,
}

impl std::fmt::Display for VolatilityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::Elevated => "elevated",
            Self::High => "high",
            Self::Panic => "panic",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskMode {
    RiskOn,
    RiskOff,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreadthAssessment {
    Narrow,
    Mixed,
    Broad,
}

/// Market breadth over the regime basket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Breadth {
    pub assessment: BreadthAssessment,
    /// Percent of basket members trading above their own moving average (0-100).
    pub pct_above_ma: f64,
    /// Number of basket members that contributed.
    pub sample_size: usize,
}

/// The engine's read of current market conditions. Computed once per run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketRegime {
    pub trend: Trend,
    pub volatility: VolatilityLevel,
    pub risk: RiskMode,
    pub breadth: Breadth,
    pub benchmark: String,
    pub benchmark_price: Decimal,
    /// Value of the volatility proxy used for bucketing (VIX points).
    pub volatility_index: f64,
    pub computed_at: DateTime<Utc>,
}

impl MarketRegime {
    #[must_use]
    pub fn is_risk_on(&self) -> bool {
        self.risk == RiskMode::RiskOn
    }
}
