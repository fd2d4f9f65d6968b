//! Volatility figures derived from raw vendor data.
//!
//! Vendors that do not publish IV rank or historical volatility directly get
//! them computed here from daily closes and the nearest option chain.

use chrono::Utc;
use premia_core::{HistoricalPrice, OptionChain, VolatilityData};
use rust_decimal::prelude::ToPrimitive;

/// Trading days per year used for annualization.
pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Window for the headline historical volatility figure.
pub const HV_WINDOW: usize = 20;

/// Annualized close-to-close volatility over the last `window` returns.
///
/// Returns `None` with fewer than `window + 1` closes.
#[must_use]
pub fn historical_volatility(closes: &[f64], window: usize) -> Option<f64> {
    if window < 2 || closes.len() < window + 1 {
        return None;
    }
    let tail = &closes[closes.len() - window - 1..];
    let returns: Vec<f64> = tail
        .windows(2)
        .filter(|w| w[0] > 0.0 && w[1] > 0.0)
        .map(|w| (w[1] / w[0]).ln())
        .collect();
    if returns.len() < 2 {
        return None;
    }
    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
    Some(variance.sqrt() * TRADING_DAYS_PER_YEAR.sqrt())
}

/// Closing prices as `f64`, oldest first.
#[must_use]
pub fn closes(history: &[HistoricalPrice]) -> Vec<f64> {
    history
        .iter()
        .filter_map(|bar| bar.close.to_f64())
        .collect()
}

/// Average implied volatility of the two strikes nearest the money.
#[must_use]
pub fn at_the_money_iv(chain: &OptionChain) -> Option<f64> {
    let spot = chain.underlying_price.to_f64()?;
    let mut candidates: Vec<(f64, f64)> = chain
        .contracts
        .iter()
        .filter(|c| c.implied_volatility > 0.0)
        .filter_map(|c| Some(((c.strike.to_f64()? - spot).abs(), c.implied_volatility)))
        .collect();
    candidates.sort_by(|a, b| a.0.total_cmp(&b.0));
    let nearest: Vec<f64> = candidates.iter().take(2).map(|(_, iv)| *iv).collect();
    if nearest.is_empty() {
        None
    } else {
        Some(nearest.iter().sum::<f64>() / nearest.len() as f64)
    }
}

/// Rank and percentile of `current` within the trailing rolling-HV range.
///
/// Used as an IV rank stand-in when the vendor publishes no IV history.
#[must_use]
pub fn rank_against_history(current: f64, closes: &[f64]) -> Option<(f64, f64)> {
    if closes.len() < HV_WINDOW + 2 {
        return None;
    }
    let series: Vec<f64> = (HV_WINDOW + 1..=closes.len())
        .filter_map(|end| historical_volatility(&closes[..end], HV_WINDOW))
        .collect();
    let low = series.iter().copied().fold(f64::INFINITY, f64::min);
    let high = series.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !low.is_finite() || !high.is_finite() {
        return None;
    }
    let rank = if high > low {
        ((current - low) / (high - low) * 100.0).clamp(0.0, 100.0)
    } else {
        50.0
    };
    let below = series.iter().filter(|v| **v < current).count();
    let percentile = below as f64 / series.len() as f64 * 100.0;
    Some((rank, percentile))
}

/// Assembles `VolatilityData` from a year of bars and an optional chain.
#[must_use]
pub fn volatility_from(symbol: &str, history: &[HistoricalPrice], chain: Option<&OptionChain>) -> VolatilityData {
    let closes = closes(history);
    let historical_volatility = historical_volatility(&closes, HV_WINDOW).unwrap_or(0.0);
    let implied_volatility = chain.and_then(at_the_money_iv);
    let ranked = implied_volatility.and_then(|iv| rank_against_history(iv, &closes));
    VolatilityData {
        symbol: symbol.to_string(),
        implied_volatility,
        historical_volatility,
        iv_rank: ranked.map(|(rank, _)| rank),
        iv_percentile: ranked.map(|(_, pct)| pct),
        timestamp: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_series_has_zero_volatility() {
        let closes = vec![100.0; 30];
        assert_eq!(historical_volatility(&closes, 20), Some(0.0));
    }

    #[test]
    fn too_short_series_has_none() {
        let closes = vec![100.0; 20];
        assert_eq!(historical_volatility(&closes, 20), None);
    }

    #[test]
    fn alternating_series_is_annualized() {
        let closes: Vec<f64> = (0..21).map(|i| if i % 2 == 0 { 100.0 } else { 101.0 }).collect();
        let hv = historical_volatility(&closes, 20).unwrap();
        // daily moves of ~1% annualize to roughly 16%
        assert!(hv > 0.14 && hv < 0.18, "hv = {hv}");
    }

    #[test]
    fn rank_is_bounded() {
        let closes: Vec<f64> = (0..80).map(|i| 100.0 + (i as f64 * 0.7).sin() * (1.0 + i as f64 / 40.0)).collect();
        let (rank, pct) = rank_against_history(10.0, &closes).unwrap();
        assert_eq!(rank, 100.0);
        assert_eq!(pct, 100.0);
        let (rank, pct) = rank_against_history(0.0, &closes).unwrap();
        assert_eq!(rank, 0.0);
        assert_eq!(pct, 0.0);
    }
}
