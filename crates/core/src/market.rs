//! Market data snapshots: quotes, daily bars, option chains, volatility.
//!
//! Snapshots are produced by a market-data provider and never mutated
//! afterwards. Prices are `Decimal`; greeks, IV and ratios are `f64`.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Options contract right (call or put).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionRight {
    Call,
    Put,
}

impl std::fmt::Display for OptionRight {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Call => write!(f, "C"),
            Self::Put => write!(f, "P"),
        }
    }
}

/// Underlying quote snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    pub last: Decimal,
    pub bid: Decimal,
    pub ask: Decimal,
    pub change_pct: f64,
    pub volume: u64,
    pub average_volume: u64,
    pub timestamp: DateTime<Utc>,
}

/// Lookback window for historical daily bars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HistoryRange {
    #[serde(rename = "1M")]
    OneMonth,
    #[serde(rename = "3M")]
    ThreeMonths,
    #[serde(rename = "6M")]
    SixMonths,
    #[serde(rename = "1Y")]
    OneYear,
}

impl HistoryRange {
    /// Calendar days covered by the range.
    #[must_use]
    pub fn calendar_days(self) -> i64 {
        match self {
            Self::OneMonth => 31,
            Self::ThreeMonths => 92,
            Self::SixMonths => 183,
            Self::OneYear => 366,
        }
    }

    /// Approximate number of trading sessions in the range.
    #[must_use]
    pub fn trading_days(self) -> usize {
        match self {
            Self::OneMonth => 21,
            Self::ThreeMonths => 63,
            Self::SixMonths => 126,
            Self::OneYear => 252,
        }
    }
}

impl std::fmt::Display for HistoryRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::OneMonth => "1M",
            Self::ThreeMonths => "3M",
            Self::SixMonths => "6M",
            Self::OneYear => "1Y",
        };
        write!(f, "{s}")
    }
}

/// A historical daily price bar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoricalPrice {
    pub date: NaiveDate,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: u64,
}

/// Option greeks as reported by the data vendor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OptionGreeks {
    pub delta: f64,
    pub gamma: f64,
    pub theta: f64,
    pub vega: f64,
}

/// A single listed option with its market and greeks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionContract {
    /// OCC option symbol (e.g., "AAPL241220P00150000").
    pub symbol: String,
    pub underlying: String,
    pub strike: Decimal,
    pub right: OptionRight,
    pub expiration: NaiveDate,
    pub bid: Decimal,
    pub ask: Decimal,
    pub last: Decimal,
    pub volume: u64,
    pub open_interest: u64,
    pub implied_volatility: f64,
    pub greeks: OptionGreeks,
}

impl OptionContract {
    /// Midpoint of bid and ask.
    #[must_use]
    pub fn mid(&self) -> Decimal {
        (self.bid + self.ask) / Decimal::TWO
    }

    /// Bid-ask spread as a percentage of the mid price.
    ///
    /// Returns 100% for contracts without a two-sided market.
    #[must_use]
    pub fn spread_pct(&self) -> f64 {
        let mid = self.mid();
        if mid <= Decimal::ZERO || self.bid <= Decimal::ZERO {
            return 100.0;
        }
        ((self.ask - self.bid) / mid * Decimal::ONE_HUNDRED)
            .to_f64()
            .unwrap_or(100.0)
    }

    /// Absolute delta, so puts and calls compare on the same scale.
    #[must_use]
    pub fn abs_delta(&self) -> f64 {
        self.greeks.delta.abs()
    }

    /// Days between `today` and expiration.
    #[must_use]
    pub fn days_to_expiration(&self, today: NaiveDate) -> i64 {
        (self.expiration - today).num_days()
    }

    /// Human-readable description (e.g., "AAPL 150P 2024-12-20").
    #[must_use]
    pub fn display_name(&self) -> String {
        format!(
            "{} {}{} {}",
            self.underlying, self.strike, self.right, self.expiration
        )
    }
}

/// Option chain for one underlying and one expiration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionChain {
    pub underlying: String,
    pub underlying_price: Decimal,
    pub expiration: NaiveDate,
    pub contracts: Vec<OptionContract>,
    pub timestamp: DateTime<Utc>,
}

impl OptionChain {
    /// Contracts of a given right, ordered by strike ascending.
    #[must_use]
    pub fn by_right(&self, right: OptionRight) -> Vec<&OptionContract> {
        let mut out: Vec<&OptionContract> =
            self.contracts.iter().filter(|c| c.right == right).collect();
        out.sort_by(|a, b| a.strike.cmp(&b.strike));
        out
    }

    /// Exact strike lookup.
    #[must_use]
    pub fn find(&self, right: OptionRight, strike: Decimal) -> Option<&OptionContract> {
        self.contracts
            .iter()
            .find(|c| c.right == right && c.strike == strike)
    }
}

/// Volatility metrics for an underlying.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolatilityData {
    pub symbol: String,
    /// Annualized implied volatility (0.25 = 25%).
    pub implied_volatility: Option<f64>,
    /// Annualized 20-day historical volatility.
    pub historical_volatility: f64,
    /// IV rank over the trailing year, 0-100.
    pub iv_rank: Option<f64>,
    /// IV percentile over the trailing year, 0-100.
    pub iv_percentile: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

/// Builds an OCC option symbol: root + yymmdd + C/P + strike×1000 (8 digits).
#[must_use]
pub fn occ_symbol(underlying: &str, expiration: NaiveDate, right: OptionRight, strike: Decimal) -> String {
    let strike_thousandths = (strike * Decimal::from(1000)).round().to_u64().unwrap_or(0);
    format!(
        "{}{}{}{:08}",
        underlying.to_uppercase(),
        expiration.format("%y%m%d"),
        right,
        strike_thousandths
    )
}

/// Parts of an OCC option symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OccParts {
    pub underlying: String,
    pub expiration: NaiveDate,
    pub right: OptionRight,
    pub strike: Decimal,
}

/// Inverse of [`occ_symbol`]. `None` if the symbol is not OCC-shaped.
#[must_use]
pub fn parse_occ_symbol(symbol: &str) -> Option<OccParts> {
    let symbol = symbol.trim();
    if symbol.len() < 16 || !symbol.is_ascii() {
        return None;
    }
    let (root, tail) = symbol.split_at(symbol.len() - 15);
    if root.is_empty() {
        return None;
    }
    let expiration = NaiveDate::parse_from_str(&tail[..6], "%y%m%d").ok()?;
    let right = match &tail[6..7] {
        "C" => OptionRight::Call,
        "P" => OptionRight::Put,
        _ => return None,
    };
    let thousandths: u64 = tail[7..].parse().ok()?;
    Some(OccParts {
        underlying: root.to_string(),
        expiration,
        right,
        strike: Decimal::from(thousandths) / Decimal::from(1000),
    })
}
