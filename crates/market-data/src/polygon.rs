//! Polygon.io market data over REST.
//!
//! Stock snapshots for quotes, aggregates for history, the options
//! reference endpoint for expirations and the options snapshot (paginated)
//! for chains.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use premia_core::{
    occ_symbol, HistoricalPrice, HistoryRange, OptionChain, OptionContract, OptionGreeks,
    OptionRight, ProviderConfig, Quote, VolatilityData,
};
use reqwest::Client;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::derived;
use crate::error::{ProviderError, Result};
use crate::provider::MarketDataProvider;
use crate::rate_limit::RequestQueue;
use crate::wire::{decode, http_client, price};

/// Production API root.
pub const POLYGON_API_URL: &str = "https://api.polygon.io";

/// Upper bound on snapshot pages followed for one chain.
const MAX_CHAIN_PAGES: usize = 8;

const IV_SAMPLE_MIN_DTE: i64 = 7;

pub struct PolygonProvider {
    http: Client,
    base_url: String,
    api_key: SecretString,
    queue: Arc<RequestQueue>,
}

impl PolygonProvider {
    pub fn new(api_key: SecretString) -> Self {
        Self {
            http: Client::new(),
            base_url: POLYGON_API_URL.to_string(),
            api_key,
            queue: Arc::new(RequestQueue::new(Duration::from_millis(250))),
        }
    }

    /// Builds from application config. Requires `api_token`.
    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        let key = config
            .api_token
            .clone()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ProviderError::Configuration("polygon requires provider.api_token".to_string()))?;
        let mut provider = Self::new(SecretString::from(key)).with_min_interval(config.min_request_interval());
        provider.http = http_client(config.request_timeout())?;
        if let Some(url) = &config.base_url {
            provider = provider.with_base_url(url.clone());
        }
        Ok(provider)
    }

    /// Sets a custom base URL (useful for testing).
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    #[must_use]
    pub fn with_min_interval(mut self, interval: Duration) -> Self {
        self.queue = Arc::new(RequestQueue::new(interval));
        self
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        self.get_url(&url, query).await
    }

    /// GET on an absolute URL (pagination cursors are absolute).
    async fn get_url<T: DeserializeOwned>(&self, url: &str, query: &[(&str, String)]) -> Result<T> {
        self.queue.wait_turn().await;
        tracing::debug!("GET {}", url);

        let response = self
            .http
            .get(url)
            .query(query)
            .bearer_auth(self.api_key.expose_secret())
            .header("Accept", "application/json")
            .send()
            .await?;

        decode(response).await
    }
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Deserialize)]
struct SnapshotEnvelope {
    ticker: Option<TickerSnapshot>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TickerSnapshot {
    ticker: String,
    todays_change_perc: Option<f64>,
    day: Option<Bar>,
    prev_day: Option<Bar>,
    last_quote: Option<LastQuote>,
    last_trade: Option<LastTrade>,
    /// Nanoseconds since epoch.
    updated: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct Bar {
    c: Option<f64>,
    v: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct LastQuote {
    /// Bid price.
    p: Option<f64>,
    /// Ask price.
    #[serde(rename = "P")]
    ask: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct LastTrade {
    p: Option<f64>,
}

impl From<TickerSnapshot> for Quote {
    fn from(snap: TickerSnapshot) -> Self {
        let last = snap
            .last_trade
            .and_then(|t| t.p)
            .or_else(|| snap.day.as_ref().and_then(|d| d.c))
            .or_else(|| snap.prev_day.as_ref().and_then(|d| d.c));
        let (bid, ask) = snap
            .last_quote
            .map(|q| (q.p, q.ask))
            .unwrap_or((None, None));
        let volume = |bar: &Option<Bar>| bar.as_ref().and_then(|b| b.v).unwrap_or(0.0) as u64;
        Quote {
            symbol: snap.ticker,
            last: price(last),
            bid: price(bid),
            ask: price(ask),
            change_pct: snap.todays_change_perc.unwrap_or(0.0),
            volume: volume(&snap.day),
            // the snapshot has no average; prior session volume stands in
            average_volume: volume(&snap.prev_day),
            timestamp: snap
                .updated
                .and_then(|ns| DateTime::<Utc>::from_timestamp_millis(ns / 1_000_000))
                .unwrap_or_else(Utc::now),
        }
    }
}

#[derive(Debug, Deserialize)]
struct AggregatesEnvelope {
    #[serde(default)]
    results: Vec<Aggregate>,
}

#[derive(Debug, Deserialize)]
struct Aggregate {
    o: f64,
    h: f64,
    l: f64,
    c: f64,
    v: f64,
    /// Bar start, epoch milliseconds.
    t: i64,
}

#[derive(Debug, Deserialize)]
struct ContractsEnvelope {
    #[serde(default)]
    results: Vec<ContractReference>,
}

#[derive(Debug, Deserialize)]
struct ContractReference {
    expiration_date: NaiveDate,
}

#[derive(Debug, Deserialize)]
struct OptionSnapshotPage {
    #[serde(default)]
    results: Vec<OptionSnapshot>,
    next_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OptionSnapshot {
    details: OptionDetails,
    greeks: Option<SnapshotGreeks>,
    implied_volatility: Option<f64>,
    open_interest: Option<u64>,
    day: Option<OptionDay>,
    last_quote: Option<OptionQuote>,
    underlying_asset: Option<UnderlyingAsset>,
}

#[derive(Debug, Deserialize)]
struct OptionDetails {
    contract_type: String,
    expiration_date: NaiveDate,
    strike_price: f64,
}

#[derive(Debug, Default, Deserialize)]
struct SnapshotGreeks {
    delta: Option<f64>,
    gamma: Option<f64>,
    theta: Option<f64>,
    vega: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct OptionDay {
    close: Option<f64>,
    volume: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct OptionQuote {
    bid: Option<f64>,
    ask: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct UnderlyingAsset {
    price: Option<f64>,
}

impl OptionSnapshot {
    fn into_contract(self, underlying: &str) -> Option<OptionContract> {
        let right = match self.details.contract_type.as_str() {
            "call" => OptionRight::Call,
            "put" => OptionRight::Put,
            _ => return None,
        };
        let strike = price(Some(self.details.strike_price));
        let greeks = self.greeks.unwrap_or_default();
        let (bid, ask) = self.last_quote.map(|q| (q.bid, q.ask)).unwrap_or((None, None));
        let (last, volume) = self
            .day
            .map(|d| (d.close, d.volume.unwrap_or(0.0) as u64))
            .unwrap_or((None, 0));
        Some(OptionContract {
            symbol: occ_symbol(underlying, self.details.expiration_date, right, strike),
            underlying: underlying.to_string(),
            strike,
            right,
            expiration: self.details.expiration_date,
            bid: price(bid),
            ask: price(ask),
            last: price(last),
            volume,
            open_interest: self.open_interest.unwrap_or(0),
            implied_volatility: self.implied_volatility.unwrap_or(0.0),
            greeks: OptionGreeks {
                delta: greeks.delta.unwrap_or(0.0),
                gamma: greeks.gamma.unwrap_or(0.0),
                theta: greeks.theta.unwrap_or(0.0),
                vega: greeks.vega.unwrap_or(0.0),
            },
        })
    }
}

#[async_trait]
impl MarketDataProvider for PolygonProvider {
    fn name(&self) -> &str {
        "polygon"
    }

    async fn get_quote(&self, symbol: &str) -> Result<Quote> {
        let symbol = symbol.to_uppercase();
        let path = format!("/v2/snapshot/locale/us/markets/stocks/tickers/{symbol}");
        let envelope: SnapshotEnvelope = match self.get(&path, &[]).await {
            Err(ProviderError::Api { status_code: 404, .. }) => {
                return Err(ProviderError::unknown_symbol(symbol));
            }
            other => other?,
        };
        envelope
            .ticker
            .map(Quote::from)
            .ok_or_else(|| ProviderError::unknown_symbol(symbol))
    }

    async fn get_historical_prices(
        &self,
        symbol: &str,
        range: HistoryRange,
    ) -> Result<Vec<HistoricalPrice>> {
        let symbol = symbol.to_uppercase();
        let end = Utc::now().date_naive();
        let start = end - ChronoDuration::days(range.calendar_days());
        let path = format!("/v2/aggs/ticker/{symbol}/range/1/day/{start}/{end}");
        let envelope: AggregatesEnvelope = self
            .get(
                &path,
                &[
                    ("adjusted", "true".to_string()),
                    ("sort", "asc".to_string()),
                    ("limit", "5000".to_string()),
                ],
            )
            .await?;

        if envelope.results.is_empty() {
            return Err(ProviderError::unknown_symbol(symbol));
        }

        Ok(envelope
            .results
            .into_iter()
            .filter_map(|bar| {
                let date = DateTime::<Utc>::from_timestamp_millis(bar.t)?.date_naive();
                Some(HistoricalPrice {
                    date,
                    open: price(Some(bar.o)),
                    high: price(Some(bar.h)),
                    low: price(Some(bar.l)),
                    close: price(Some(bar.c)),
                    volume: bar.v as u64,
                })
            })
            .collect())
    }

    async fn get_option_chain(&self, symbol: &str, expiration: NaiveDate) -> Result<OptionChain> {
        let symbol = symbol.to_uppercase();
        let mut page: OptionSnapshotPage = self
            .get(
                &format!("/v3/snapshot/options/{symbol}"),
                &[
                    ("expiration_date", expiration.to_string()),
                    ("limit", "250".to_string()),
                ],
            )
            .await?;

        let mut snapshots = std::mem::take(&mut page.results);
        let mut pages = 1;
        while let Some(next) = page.next_url.take() {
            if pages >= MAX_CHAIN_PAGES {
                tracing::warn!(%symbol, %expiration, pages, "chain truncated at page limit");
                break;
            }
            page = self.get_url(&next, &[]).await?;
            snapshots.append(&mut page.results);
            pages += 1;
        }

        if snapshots.is_empty() {
            return Err(ProviderError::NotFound(format!(
                "{symbol} has no chain expiring {expiration}"
            )));
        }

        let underlying_price = snapshots
            .iter()
            .find_map(|s| s.underlying_asset.as_ref().and_then(|u| u.price))
            .map(|p| price(Some(p)));
        let underlying_price = match underlying_price {
            Some(p) if p > Decimal::ZERO => p,
            _ => self.get_quote(&symbol).await?.last,
        };

        let contracts = snapshots
            .into_iter()
            .filter_map(|s| s.into_contract(&symbol))
            .collect();

        Ok(OptionChain {
            underlying: symbol,
            underlying_price,
            expiration,
            contracts,
            timestamp: Utc::now(),
        })
    }

    async fn get_option_expirations(&self, symbol: &str) -> Result<Vec<NaiveDate>> {
        let envelope: ContractsEnvelope = self
            .get(
                "/v3/reference/options/contracts",
                &[
                    ("underlying_ticker", symbol.to_uppercase()),
                    ("expired", "false".to_string()),
                    ("limit", "1000".to_string()),
                ],
            )
            .await?;
        let mut dates: Vec<NaiveDate> = envelope.results.into_iter().map(|c| c.expiration_date).collect();
        dates.sort_unstable();
        dates.dedup();
        Ok(dates)
    }

    async fn get_volatility_data(&self, symbol: &str) -> Result<VolatilityData> {
        let history = self.get_historical_prices(symbol, HistoryRange::OneYear).await?;
        let today = Utc::now().date_naive();
        let sample = self
            .get_option_expirations(symbol)
            .await?
            .into_iter()
            .find(|d| (*d - today).num_days() >= IV_SAMPLE_MIN_DTE);

        let chain = match sample {
            Some(expiration) => self.get_option_chain(symbol, expiration).await.ok(),
            None => None,
        };

        Ok(derived::volatility_from(&symbol.to_uppercase(), &history, chain.as_ref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer) -> PolygonProvider {
        PolygonProvider::new(SecretString::from("key".to_string()))
            .with_base_url(server.uri())
            .with_min_interval(Duration::ZERO)
    }

    #[tokio::test]
    async fn test_get_quote_from_snapshot() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v2/snapshot/locale/us/markets/stocks/tickers/SPY"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "OK",
                "ticker": {
                    "ticker": "SPY",
                    "todaysChangePerc": -0.42,
                    "day": { "c": 519.5, "v": 61000000.0 },
                    "prevDay": { "c": 521.7, "v": 72000000.0 },
                    "lastQuote": { "p": 519.49, "P": 519.51 },
                    "lastTrade": { "p": 519.5 }
                }
            })))
            .mount(&mock_server)
            .await;

        let quote = provider(&mock_server).get_quote("spy").await.unwrap();
        assert_eq!(quote.last, dec!(519.5));
        assert_eq!(quote.bid, dec!(519.49));
        assert_eq!(quote.ask, dec!(519.51));
        assert_eq!(quote.average_volume, 72_000_000);
        assert!((quote.change_pct + 0.42).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_not_found_is_unknown_symbol() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v2/snapshot/locale/us/markets/stocks/tickers/ZZZZ"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
                "status": "NOT_FOUND"
            })))
            .mount(&mock_server)
            .await;

        let err = provider(&mock_server).get_quote("ZZZZ").await.unwrap_err();
        assert!(err.is_unknown_symbol());
    }

    #[tokio::test]
    async fn test_history_from_aggregates() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(query_param("sort", "asc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "resultsCount": 2,
                "results": [
                    { "o": 100.0, "h": 101.0, "l": 99.0, "c": 100.5, "v": 1000000.0, "t": 1732060800000i64 },
                    { "o": 100.5, "h": 102.0, "l": 100.0, "c": 101.5, "v": 1200000.0, "t": 1732147200000i64 }
                ]
            })))
            .mount(&mock_server)
            .await;

        let bars = provider(&mock_server)
            .get_historical_prices("AAPL", HistoryRange::OneMonth)
            .await
            .unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].date, NaiveDate::from_ymd_opt(2024, 11, 20).unwrap());
        assert_eq!(bars[1].close, dec!(101.5));
    }

    #[tokio::test]
    async fn test_chain_follows_next_url() {
        let mock_server = MockServer::start().await;
        let next = format!("{}/v3/snapshot/options/AAPL/page2", mock_server.uri());

        let contract = |kind: &str, strike: f64, delta: f64| {
            serde_json::json!({
                "details": { "contract_type": kind, "expiration_date": "2024-12-20", "strike_price": strike },
                "greeks": { "delta": delta, "gamma": 0.02, "theta": -0.04, "vega": 0.2 },
                "implied_volatility": 0.27,
                "open_interest": 5000,
                "day": { "close": 2.0, "volume": 900.0 },
                "last_quote": { "bid": 1.95, "ask": 2.05 },
                "underlying_asset": { "price": 190.0 }
            })
        };

        Mock::given(method("GET"))
            .and(path("/v3/snapshot/options/AAPL"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": [contract("put", 180.0, -0.23)],
                "next_url": next
            })))
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/v3/snapshot/options/AAPL/page2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": [contract("call", 200.0, 0.21)]
            })))
            .mount(&mock_server)
            .await;

        let expiration = NaiveDate::from_ymd_opt(2024, 12, 20).unwrap();
        let chain = provider(&mock_server).get_option_chain("AAPL", expiration).await.unwrap();
        assert_eq!(chain.contracts.len(), 2);
        assert_eq!(chain.underlying_price, dec!(190));
        let put = chain.find(OptionRight::Put, dec!(180)).unwrap();
        assert_eq!(put.symbol, "AAPL241220P00180000");
        assert_eq!(put.volume, 900);
    }

    #[tokio::test]
    async fn test_expirations_are_deduplicated() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v3/reference/options/contracts"))
            .and(query_param("underlying_ticker", "AAPL"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": [
                    { "expiration_date": "2024-12-27" },
                    { "expiration_date": "2024-12-20" },
                    { "expiration_date": "2024-12-20" }
                ]
            })))
            .mount(&mock_server)
            .await;

        let dates = provider(&mock_server).get_option_expirations("AAPL").await.unwrap();
        assert_eq!(
            dates,
            vec![
                NaiveDate::from_ymd_opt(2024, 12, 20).unwrap(),
                NaiveDate::from_ymd_opt(2024, 12, 27).unwrap()
            ]
        );
    }
}
