//! Deterministic synthetic market data.
//!
//! Every symbol in the profile table gets a seeded random-walk price
//! history ending at its reference price, weekly Friday expirations, and
//! option chains priced with Black-Scholes so the greeks are consistent
//! with the quoted premiums. Runs offline; used by tests, demos and the
//! `simulated` provider kind.

use std::collections::HashSet;
use std::f64::consts::PI;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Datelike, Duration as ChronoDuration, NaiveDate, Utc, Weekday};
use premia_core::{
    occ_symbol, HistoricalPrice, HistoryRange, OptionChain, OptionContract, OptionGreeks,
    OptionRight, Quote, VolatilityData,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::derived;
use crate::error::{ProviderError, Result};
use crate::provider::MarketDataProvider;

/// Reference price, annual drift, annual volatility, average daily volume,
/// and whether options are listed.
struct Profile {
    symbol: &'static str,
    price: f64,
    drift: f64,
    volatility: f64,
    average_volume: u64,
    optionable: bool,
}

const PROFILES: &[Profile] = &[
    Profile { symbol: "SPY", price: 520.0, drift: 0.12, volatility: 0.15, average_volume: 75_000_000, optionable: true },
    Profile { symbol: "QQQ", price: 445.0, drift: 0.14, volatility: 0.20, average_volume: 45_000_000, optionable: true },
    Profile { symbol: "IWM", price: 205.0, drift: 0.06, volatility: 0.22, average_volume: 30_000_000, optionable: true },
    Profile { symbol: "DIA", price: 390.0, drift: 0.09, volatility: 0.14, average_volume: 4_000_000, optionable: true },
    Profile { symbol: "AAPL", price: 190.0, drift: 0.15, volatility: 0.26, average_volume: 55_000_000, optionable: true },
    Profile { symbol: "MSFT", price: 420.0, drift: 0.15, volatility: 0.24, average_volume: 22_000_000, optionable: true },
    Profile { symbol: "NVDA", price: 120.0, drift: 0.40, volatility: 0.50, average_volume: 300_000_000, optionable: true },
    Profile { symbol: "AMD", price: 160.0, drift: 0.10, volatility: 0.45, average_volume: 50_000_000, optionable: true },
    Profile { symbol: "TSLA", price: 240.0, drift: 0.05, volatility: 0.55, average_volume: 90_000_000, optionable: true },
    Profile { symbol: "AMZN", price: 185.0, drift: 0.15, volatility: 0.30, average_volume: 40_000_000, optionable: true },
    Profile { symbol: "GOOGL", price: 170.0, drift: 0.12, volatility: 0.28, average_volume: 25_000_000, optionable: true },
    Profile { symbol: "META", price: 500.0, drift: 0.18, volatility: 0.35, average_volume: 15_000_000, optionable: true },
    Profile { symbol: "VIX", price: 16.0, drift: 0.0, volatility: 0.80, average_volume: 0, optionable: false },
];

/// Bars generated per symbol; shorter ranges take the tail.
const HISTORY_BARS: usize = 252;

/// Weekly expirations listed ahead of the as-of date.
const LISTED_WEEKS: i64 = 12;

/// Realized noise relative to the profile's implied volatility.
const REALIZED_VOL_RATIO: f64 = 0.6;

/// Offline provider backed by the profile table.
#[derive(Debug, Clone, Default)]
pub struct SimulatedProvider {
    as_of: Option<NaiveDate>,
    failing: HashSet<String>,
    latency: Option<Duration>,
}

impl SimulatedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pins "today" so chains and DTEs are reproducible.
    #[must_use]
    pub fn with_as_of(mut self, date: NaiveDate) -> Self {
        self.as_of = Some(date);
        self
    }

    /// Every call for these symbols fails with a network error.
    #[must_use]
    pub fn with_failing_symbols<I, S>(mut self, symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.failing = symbols.into_iter().map(|s| s.as_ref().to_uppercase()).collect();
        self
    }

    /// Adds a fixed delay to every call.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Symbols with a profile.
    #[must_use]
    pub fn known_symbols() -> Vec<&'static str> {
        PROFILES.iter().map(|p| p.symbol).collect()
    }

    fn today(&self) -> NaiveDate {
        self.as_of.unwrap_or_else(|| Utc::now().date_naive())
    }

    async fn profile(&self, symbol: &str) -> Result<&'static Profile> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let symbol = symbol.to_uppercase();
        if self.failing.contains(&symbol) {
            return Err(ProviderError::Network(format!("simulated outage for {symbol}")));
        }
        PROFILES
            .iter()
            .find(|p| p.symbol == symbol)
            .ok_or_else(|| ProviderError::unknown_symbol(symbol))
    }

    /// Full year of bars, oldest first, last close at the reference price.
    fn bars(&self, profile: &Profile) -> Vec<HistoricalPrice> {
        let dates = trading_days_back(self.today(), HISTORY_BARS);
        let mut rng = StdRng::seed_from_u64(seed(profile.symbol));

        let daily_vol = profile.volatility * REALIZED_VOL_RATIO / derived::TRADING_DAYS_PER_YEAR.sqrt();
        let daily_drift = profile.drift / derived::TRADING_DAYS_PER_YEAR;

        let mut closes = vec![profile.price; dates.len()];
        for i in (1..closes.len()).rev() {
            let step = daily_drift + daily_vol * standard_normal(&mut rng);
            closes[i - 1] = closes[i] / step.exp();
        }

        dates
            .into_iter()
            .enumerate()
            .map(|(i, date)| {
                let close = closes[i];
                let open = if i == 0 { close } else { closes[i - 1] };
                let wick = 1.0 + rng.gen::<f64>() * 0.006;
                let volume_scale = 0.7 + rng.gen::<f64>() * 0.6;
                HistoricalPrice {
                    date,
                    open: money(open),
                    high: money(open.max(close) * wick),
                    low: money(open.min(close) / wick),
                    close: money(close),
                    volume: (profile.average_volume as f64 * volume_scale) as u64,
                }
            })
            .collect()
    }

    fn expirations(&self, profile: &Profile) -> Vec<NaiveDate> {
        if !profile.optionable {
            return Vec::new();
        }
        let today = self.today();
        let days_to_friday = (Weekday::Fri.num_days_from_monday() as i64
            - today.weekday().num_days_from_monday() as i64)
            .rem_euclid(7);
        let first = if days_to_friday == 0 {
            today + ChronoDuration::days(7)
        } else {
            today + ChronoDuration::days(days_to_friday)
        };
        (0..LISTED_WEEKS)
            .map(|week| first + ChronoDuration::weeks(week))
            .collect()
    }

    fn chain(&self, profile: &Profile, expiration: NaiveDate) -> Result<OptionChain> {
        let today = self.today();
        if !profile.optionable {
            return Err(ProviderError::NotFound(format!("{} has no listed options", profile.symbol)));
        }
        if expiration <= today {
            return Err(ProviderError::NotFound(format!(
                "{} has no chain expiring {expiration}",
                profile.symbol
            )));
        }

        let spot = profile.price;
        let years = (expiration - today).num_days() as f64 / 365.0;
        let step = strike_step(spot);
        let liquidity = (profile.average_volume as f64 / 20_000_000.0).clamp(0.2, 3.0);

        let lowest = (spot * 0.7 / step).floor() as i64;
        let highest = (spot * 1.3 / step).ceil() as i64;

        let mut contracts = Vec::new();
        for n in lowest..=highest {
            let strike = n as f64 * step;
            if strike <= 0.0 {
                continue;
            }
            let moneyness = strike / spot;
            let iv = profile.volatility
                * (1.0 + 0.5 * (1.0 - moneyness).max(0.0) + 0.2 * (moneyness - 1.0).max(0.0));
            let open_interest =
                (liquidity * (4000.0 * (-((moneyness - 1.0) / 0.1).powi(2)).exp() + 150.0)) as u64;

            for right in [OptionRight::Call, OptionRight::Put] {
                let priced = black_scholes(spot, strike, years, iv, right);
                let premium = priced.price.max(0.01);
                let half_spread = (premium * 0.025).max(0.025);
                let bid = money((premium - half_spread).max(0.0));
                let ask = money(premium + half_spread).max(bid + Decimal::new(5, 2));
                let strike_dec = money(strike);
                contracts.push(OptionContract {
                    symbol: occ_symbol(profile.symbol, expiration, right, strike_dec),
                    underlying: profile.symbol.to_string(),
                    strike: strike_dec,
                    right,
                    expiration,
                    bid,
                    ask,
                    last: money(premium),
                    volume: open_interest / 8 + 5,
                    open_interest,
                    implied_volatility: iv,
                    greeks: priced.greeks,
                });
            }
        }

        Ok(OptionChain {
            underlying: profile.symbol.to_string(),
            underlying_price: money(spot),
            expiration,
            contracts,
            timestamp: Utc::now(),
        })
    }
}

#[async_trait]
impl MarketDataProvider for SimulatedProvider {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn get_quote(&self, symbol: &str) -> Result<Quote> {
        let profile = self.profile(symbol).await?;
        let bars = self.bars(profile);
        let last = money(profile.price);
        let change_pct = match bars.len() {
            n if n >= 2 => {
                let prev = bars[n - 2].close.to_f64().unwrap_or(profile.price);
                (profile.price / prev - 1.0) * 100.0
            }
            _ => 0.0,
        };
        let tick = Decimal::new(1, 2);
        Ok(Quote {
            symbol: profile.symbol.to_string(),
            last,
            bid: last - tick,
            ask: last + tick,
            change_pct,
            volume: profile.average_volume * 85 / 100,
            average_volume: profile.average_volume,
            timestamp: Utc::now(),
        })
    }

    async fn get_historical_prices(
        &self,
        symbol: &str,
        range: HistoryRange,
    ) -> Result<Vec<HistoricalPrice>> {
        let profile = self.profile(symbol).await?;
        let bars = self.bars(profile);
        let keep = range.trading_days().min(bars.len());
        Ok(bars[bars.len() - keep..].to_vec())
    }

    async fn get_option_chain(&self, symbol: &str, expiration: NaiveDate) -> Result<OptionChain> {
        let profile = self.profile(symbol).await?;
        self.chain(profile, expiration)
    }

    async fn get_option_expirations(&self, symbol: &str) -> Result<Vec<NaiveDate>> {
        let profile = self.profile(symbol).await?;
        Ok(self.expirations(profile))
    }

    async fn get_volatility_data(&self, symbol: &str) -> Result<VolatilityData> {
        let profile = self.profile(symbol).await?;
        let closes = derived::closes(&self.bars(profile));
        let bits = seed(profile.symbol);
        Ok(VolatilityData {
            symbol: profile.symbol.to_string(),
            implied_volatility: profile.optionable.then_some(profile.volatility),
            historical_volatility: derived::historical_volatility(&closes, derived::HV_WINDOW).unwrap_or(0.0),
            iv_rank: profile.optionable.then(|| (bits % 1000) as f64 / 10.0),
            iv_percentile: profile.optionable.then(|| ((bits >> 16) % 1000) as f64 / 10.0),
            timestamp: Utc::now(),
        })
    }
}

// =============================================================================
// Pricing helpers
// =============================================================================

struct Priced {
    price: f64,
    greeks: OptionGreeks,
}

/// Black-Scholes with zero rates and dividends.
fn black_scholes(spot: f64, strike: f64, years: f64, vol: f64, right: OptionRight) -> Priced {
    let years = years.max(1.0 / 365.0);
    let sd = vol * years.sqrt();
    let d1 = ((spot / strike).ln() + 0.5 * vol * vol * years) / sd;
    let d2 = d1 - sd;
    let pdf = (-0.5 * d1 * d1).exp() / (2.0 * PI).sqrt();

    let (price, delta) = match right {
        OptionRight::Call => (spot * norm_cdf(d1) - strike * norm_cdf(d2), norm_cdf(d1)),
        OptionRight::Put => (strike * norm_cdf(-d2) - spot * norm_cdf(-d1), norm_cdf(d1) - 1.0),
    };

    Priced {
        price,
        greeks: OptionGreeks {
            delta,
            gamma: pdf / (spot * sd),
            theta: -spot * pdf * vol / (2.0 * years.sqrt()) / 365.0,
            vega: spot * pdf * years.sqrt() / 100.0,
        },
    }
}

/// Abramowitz-Stegun 7.1.26.
fn norm_cdf(x: f64) -> f64 {
    let t = 1.0 / (1.0 + 0.327_591_1 * x.abs() / 2.0_f64.sqrt());
    let poly = t
        * (0.254_829_592
            + t * (-0.284_496_736 + t * (1.421_413_741 + t * (-1.453_152_027 + t * 1.061_405_429))));
    let erf = 1.0 - poly * (-(x * x) / 2.0).exp();
    if x >= 0.0 {
        0.5 * (1.0 + erf)
    } else {
        0.5 * (1.0 - erf)
    }
}

fn standard_normal(rng: &mut StdRng) -> f64 {
    let u1: f64 = rng.gen::<f64>().max(1e-12);
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

fn strike_step(spot: f64) -> f64 {
    match spot {
        s if s < 50.0 => 1.0,
        s if s < 150.0 => 2.5,
        s if s < 600.0 => 5.0,
        _ => 10.0,
    }
}

fn money(value: f64) -> Decimal {
    Decimal::try_from(value).unwrap_or_default().round_dp(2)
}

/// FNV-1a, stable across runs and platforms.
fn seed(symbol: &str) -> u64 {
    symbol.bytes().fold(0xcbf2_9ce4_8422_2325, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(0x0100_0000_01b3)
    })
}

/// The last `count` weekdays up to and including `end`, oldest first.
fn trading_days_back(end: NaiveDate, count: usize) -> Vec<NaiveDate> {
    let mut dates = Vec::with_capacity(count);
    let mut day = end;
    while dates.len() < count {
        if !matches!(day.weekday(), Weekday::Sat | Weekday::Sun) {
            dates.push(day);
        }
        day -= ChronoDuration::days(1);
    }
    dates.reverse();
    dates
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn as_of() -> NaiveDate {
        // a Wednesday
        NaiveDate::from_ymd_opt(2024, 11, 20).unwrap()
    }

    fn provider() -> SimulatedProvider {
        SimulatedProvider::new().with_as_of(as_of())
    }

    #[tokio::test]
    async fn unknown_symbol_is_reported() {
        let err = provider().get_quote("ZZZZ").await.unwrap_err();
        assert!(err.is_unknown_symbol());
    }

    #[tokio::test]
    async fn quote_uses_reference_price() {
        let quote = provider().get_quote("aapl").await.unwrap();
        assert_eq!(quote.symbol, "AAPL");
        assert_eq!(quote.last, dec!(190));
        assert!(quote.bid < quote.ask);
    }

    #[tokio::test]
    async fn history_is_deterministic_and_sized() {
        let p = provider();
        let a = p.get_historical_prices("SPY", HistoryRange::OneYear).await.unwrap();
        let b = p.get_historical_prices("SPY", HistoryRange::OneYear).await.unwrap();
        assert_eq!(a.len(), 252);
        assert_eq!(a.last().unwrap().close, dec!(520));
        assert_eq!(a.last().unwrap().date, as_of());
        assert!(a.iter().zip(&b).all(|(x, y)| x.close == y.close));

        let month = p.get_historical_prices("SPY", HistoryRange::OneMonth).await.unwrap();
        assert_eq!(month.len(), 21);
        assert_eq!(month.last().unwrap().close, a.last().unwrap().close);
        assert!(a.windows(2).all(|w| w[0].date < w[1].date));
    }

    #[tokio::test]
    async fn expirations_are_future_fridays() {
        let expirations = provider().get_option_expirations("AAPL").await.unwrap();
        assert_eq!(expirations.len(), LISTED_WEEKS as usize);
        assert_eq!(expirations[0], NaiveDate::from_ymd_opt(2024, 11, 22).unwrap());
        assert!(expirations.iter().all(|d| d.weekday() == Weekday::Fri && *d > as_of()));
        assert!(provider().get_option_expirations("VIX").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn chain_has_usable_short_put_candidates() {
        let p = provider();
        let expiration = NaiveDate::from_ymd_opt(2024, 12, 20).unwrap();
        let chain = p.get_option_chain("AAPL", expiration).await.unwrap();
        assert_eq!(chain.underlying_price, dec!(190));

        let puts = chain.by_right(OptionRight::Put);
        assert!(!puts.is_empty());
        assert!(puts.iter().all(|c| c.greeks.delta <= 0.0 && c.greeks.delta >= -1.0));
        assert!(puts.iter().any(|c| {
            c.strike < dec!(190)
                && (0.20..=0.30).contains(&c.abs_delta())
                && c.spread_pct() <= 15.0
                && c.open_interest >= 100
        }));
        // five-dollar grid so five-wide spreads have a long leg
        assert!(chain.find(OptionRight::Put, dec!(175)).is_some());
        assert!(chain.find(OptionRight::Put, dec!(180)).is_some());
    }

    #[tokio::test]
    async fn deltas_decrease_with_strike_for_calls() {
        let expiration = NaiveDate::from_ymd_opt(2024, 12, 20).unwrap();
        let chain = provider().get_option_chain("SPY", expiration).await.unwrap();
        let calls = chain.by_right(OptionRight::Call);
        assert!(calls.windows(2).all(|w| w[0].greeks.delta >= w[1].greeks.delta));
    }

    #[tokio::test]
    async fn expired_chain_is_not_found() {
        let err = provider().get_option_chain("AAPL", as_of()).await.unwrap_err();
        assert!(matches!(err, ProviderError::NotFound(_)));
    }

    #[tokio::test]
    async fn failing_symbols_fail_every_call() {
        let p = provider().with_failing_symbols(["msft"]);
        assert!(matches!(p.get_quote("MSFT").await, Err(ProviderError::Network(_))));
        assert!(p.get_volatility_data("MSFT").await.is_err());
        assert!(p.get_quote("AAPL").await.is_ok());
    }

    #[tokio::test]
    async fn volatility_has_rank_for_optionable_symbols() {
        let vol = provider().get_volatility_data("NVDA").await.unwrap();
        assert_eq!(vol.implied_volatility, Some(0.50));
        assert!(vol.historical_volatility > 0.0);
        assert!(vol.iv_rank.is_some_and(|r| (0.0..=100.0).contains(&r)));
    }

    #[test]
    fn norm_cdf_reference_points() {
        assert!((norm_cdf(0.0) - 0.5).abs() < 1e-7);
        assert!((norm_cdf(1.96) - 0.975).abs() < 1e-3);
        assert!((norm_cdf(-1.0) - 0.1587).abs() < 1e-3);
    }
}
