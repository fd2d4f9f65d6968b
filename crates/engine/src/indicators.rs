//! Technical indicators over daily bars.
//!
//! Inputs are ordered oldest first. Functions return `None` rather than a
//! misleading value when there is not enough history.

use premia_core::{HistoricalPrice, Trend};

pub use premia_market_data::derived::{historical_volatility, HV_WINDOW};

/// Default price distance from the 50-day average that marks a strong trend.
pub const DEFAULT_STRONG_TREND_MARGIN: f64 = 0.03;

/// Simple moving average of the last `period` values.
#[must_use]
pub fn sma(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }
    let window = &values[values.len() - period..];
    Some(window.iter().sum::<f64>() / period as f64)
}

/// Wilder's relative strength index over `period` changes.
#[must_use]
pub fn rsi(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < period + 1 {
        return None;
    }
    let changes: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();

    let (mut avg_gain, mut avg_loss) = changes[..period].iter().fold((0.0, 0.0), |(g, l), c| {
        if *c >= 0.0 {
            (g + c, l)
        } else {
            (g, l - c)
        }
    });
    avg_gain /= period as f64;
    avg_loss /= period as f64;

    let p = period as f64;
    for change in &changes[period..] {
        let (gain, loss) = if *change >= 0.0 { (*change, 0.0) } else { (0.0, -change) };
        avg_gain = (avg_gain * (p - 1.0) + gain) / p;
        avg_loss = (avg_loss * (p - 1.0) + loss) / p;
    }

    if avg_loss == 0.0 {
        return Some(if avg_gain == 0.0 { 50.0 } else { 100.0 });
    }
    let rs = avg_gain / avg_loss;
    Some(100.0 - 100.0 / (1.0 + rs))
}

/// Mean share volume of the last `window` bars.
#[must_use]
pub fn average_volume(history: &[HistoricalPrice], window: usize) -> Option<u64> {
    if window == 0 || history.is_empty() {
        return None;
    }
    let tail = &history[history.len().saturating_sub(window)..];
    let total: u128 = tail.iter().map(|bar| u128::from(bar.volume)).sum();
    u64::try_from(total / tail.len() as u128).ok()
}

/// Classifies trend from price against its 50- and 200-day averages.
///
/// Strong trends need the averages stacked in the trend's direction and
/// price at least `margin` beyond the 50-day average.
#[must_use]
pub fn classify_trend(price: f64, sma_50: Option<f64>, sma_200: Option<f64>, margin: f64) -> Trend {
    match (sma_50, sma_200) {
        (Some(s50), Some(s200)) => {
            if price > s50 && s50 > s200 {
                if price >= s50 * (1.0 + margin) {
                    Trend::StrongUptrend
                } else {
                    Trend::Uptrend
                }
            } else if price < s50 && s50 < s200 {
                if price <= s50 * (1.0 - margin) {
                    Trend::StrongDowntrend
                } else {
                    Trend::Downtrend
                }
            } else if price > s50 && price > s200 {
                Trend::Uptrend
            } else if price < s50 && price < s200 {
                Trend::Downtrend
            } else {
                Trend::Neutral
            }
        }
        (Some(s50), None) => {
            if price >= s50 * (1.0 + margin) {
                Trend::Uptrend
            } else if price <= s50 * (1.0 - margin) {
                Trend::Downtrend
            } else {
                Trend::Neutral
            }
        }
        _ => Trend::Neutral,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    #[test]
    fn sma_uses_trailing_window() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(sma(&values, 2), Some(4.5));
        assert_eq!(sma(&values, 5), Some(3.0));
        assert_eq!(sma(&values, 6), None);
    }

    #[test]
    fn rsi_extremes() {
        let rising: Vec<f64> = (0..30).map(f64::from).collect();
        assert_eq!(rsi(&rising, 14), Some(100.0));
        let falling: Vec<f64> = (0..30).rev().map(f64::from).collect();
        assert!(rsi(&falling, 14).unwrap() < 1e-9);
        let flat = vec![10.0; 30];
        assert_eq!(rsi(&flat, 14), Some(50.0));
        assert_eq!(rsi(&flat[..10], 14), None);
    }

    #[test]
    fn rsi_balanced_moves_near_fifty() {
        let zigzag: Vec<f64> = (0..41).map(|i| if i % 2 == 0 { 100.0 } else { 101.0 }).collect();
        let value = rsi(&zigzag, 14).unwrap();
        assert!((40.0..60.0).contains(&value), "rsi = {value}");
    }

    #[test]
    fn average_volume_of_tail() {
        let bar = |volume| HistoricalPrice {
            date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            open: Decimal::ONE,
            high: Decimal::ONE,
            low: Decimal::ONE,
            close: Decimal::ONE,
            volume,
        };
        let history = vec![bar(10), bar(100), bar(200)];
        assert_eq!(average_volume(&history, 2), Some(150));
        assert_eq!(average_volume(&history, 20), Some(103));
        assert_eq!(average_volume(&[], 20), None);
    }

    #[test]
    fn trend_classification() {
        let m = DEFAULT_STRONG_TREND_MARGIN;
        assert_eq!(classify_trend(110.0, Some(100.0), Some(95.0), m), Trend::StrongUptrend);
        assert_eq!(classify_trend(101.0, Some(100.0), Some(95.0), m), Trend::Uptrend);
        assert_eq!(classify_trend(90.0, Some(100.0), Some(105.0), m), Trend::StrongDowntrend);
        assert_eq!(classify_trend(99.0, Some(100.0), Some(105.0), m), Trend::Downtrend);
        assert_eq!(classify_trend(100.0, Some(101.0), Some(99.0), m), Trend::Neutral);
        assert_eq!(classify_trend(100.0, None, None, m), Trend::Neutral);
        assert_eq!(classify_trend(104.0, Some(100.0), None, m), Trend::Uptrend);
    }
}
