//! Per-symbol feature set produced by the symbol analyzer.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::regime::Trend;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolSignals {
    pub symbol: String,
    pub price: Decimal,
    pub change_pct: f64,
    pub sma_20: Option<f64>,
    pub sma_50: Option<f64>,
    pub sma_200: Option<f64>,
    pub rsi_14: Option<f64>,
    /// Annualized 20-day historical volatility.
    pub historical_volatility: f64,
    pub implied_volatility: Option<f64>,
    pub iv_rank: Option<f64>,
    /// Average daily share volume over the last 20 sessions.
    pub average_volume: u64,
    pub trend: Trend,
    pub earnings_date: Option<NaiveDate>,
    pub days_to_earnings: Option<i64>,
    /// True when the next earnings date falls inside the exclusion window.
    pub earnings_excluded: bool,
    pub computed_at: DateTime<Utc>,
}

impl SymbolSignals {
    /// Whether the last price sits above the 50-day average.
    #[must_use]
    pub fn above_sma_50(&self) -> Option<bool> {
        use rust_decimal::prelude::ToPrimitive;
        let price = self.price.to_f64()?;
        self.sma_50.map(|sma| price > sma)
    }
}
