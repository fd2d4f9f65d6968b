//! Tradier market data over REST.
//!
//! Quotes, daily history, expirations and chains with ORATS greeks. IV rank
//! is derived locally since Tradier does not publish it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use premia_core::{
    HistoricalPrice, HistoryRange, OptionChain, OptionContract, OptionGreeks, OptionRight,
    ProviderConfig, Quote, VolatilityData,
};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::derived;
use crate::error::{ProviderError, Result};
use crate::provider::MarketDataProvider;
use crate::rate_limit::RequestQueue;
use crate::wire::{decode, http_client, price, OneOrMany};

/// Production API root.
pub const TRADIER_API_URL: &str = "https://api.tradier.com";

/// Sandbox API root (delayed data).
pub const TRADIER_SANDBOX_URL: &str = "https://sandbox.tradier.com";

/// Minimum DTE of the chain sampled for implied volatility.
const IV_SAMPLE_MIN_DTE: i64 = 7;

pub struct TradierProvider {
    http: Client,
    base_url: String,
    token: SecretString,
    queue: Arc<RequestQueue>,
}

impl TradierProvider {
    pub fn new(token: SecretString) -> Self {
        Self {
            http: Client::new(),
            base_url: TRADIER_API_URL.to_string(),
            token,
            queue: Arc::new(RequestQueue::new(Duration::from_millis(250))),
        }
    }

    /// Builds from application config. Requires `api_token`.
    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        let token = config
            .api_token
            .clone()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ProviderError::Configuration("tradier requires provider.api_token".to_string()))?;
        let mut provider = Self::new(SecretString::from(token)).with_min_interval(config.min_request_interval());
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

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Waits for a queue slot and makes a GET request.
    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        self.queue.wait_turn().await;

        let url = format!("{}{}", self.base_url, path);
        tracing::debug!("GET {}", url);

        let response = self
            .http
            .get(&url)
            .query(query)
            .bearer_auth(self.token.expose_secret())
            .header("Accept", "application/json")
            .send()
            .await?;

        decode(response).await
    }

    async fn fetch_quotes(&self, symbols: &[String]) -> Result<(Vec<RawQuote>, Vec<String>)> {
        let joined = symbols.iter().map(|s| s.to_uppercase()).collect::<Vec<_>>().join(",");
        let envelope: QuotesEnvelope = self
            .get("/v1/markets/quotes", &[("symbols", joined), ("greeks", "false".to_string())])
            .await?;
        let Some(body) = envelope.quotes else {
            return Ok((Vec::new(), symbols.to_vec()));
        };
        let quotes = body.quote.map(OneOrMany::into_vec).unwrap_or_default();
        let unmatched = body
            .unmatched_symbols
            .map(|u| u.symbol.into_vec())
            .unwrap_or_default();
        Ok((quotes, unmatched))
    }
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Deserialize)]
struct QuotesEnvelope {
    quotes: Option<QuotesBody>,
}

#[derive(Debug, Deserialize)]
struct QuotesBody {
    quote: Option<OneOrMany<RawQuote>>,
    unmatched_symbols: Option<Unmatched>,
}

#[derive(Debug, Deserialize)]
struct Unmatched {
    symbol: OneOrMany<String>,
}

#[derive(Debug, Deserialize)]
struct RawQuote {
    symbol: String,
    last: Option<f64>,
    bid: Option<f64>,
    ask: Option<f64>,
    change_percentage: Option<f64>,
    volume: Option<u64>,
    average_volume: Option<u64>,
    /// Epoch milliseconds.
    trade_date: Option<i64>,
}

impl From<RawQuote> for Quote {
    fn from(raw: RawQuote) -> Self {
        let timestamp = raw
            .trade_date
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .unwrap_or_else(Utc::now);
        Quote {
            symbol: raw.symbol,
            last: price(raw.last),
            bid: price(raw.bid),
            ask: price(raw.ask),
            change_pct: raw.change_percentage.unwrap_or(0.0),
            volume: raw.volume.unwrap_or(0),
            average_volume: raw.average_volume.unwrap_or(0),
            timestamp,
        }
    }
}

#[derive(Debug, Deserialize)]
struct HistoryEnvelope {
    history: Option<HistoryBody>,
}

#[derive(Debug, Deserialize)]
struct HistoryBody {
    day: Option<OneOrMany<RawDay>>,
}

#[derive(Debug, Deserialize)]
struct RawDay {
    date: NaiveDate,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: u64,
}

#[derive(Debug, Deserialize)]
struct ExpirationsEnvelope {
    expirations: Option<ExpirationsBody>,
}

#[derive(Debug, Deserialize)]
struct ExpirationsBody {
    date: Option<OneOrMany<NaiveDate>>,
}

#[derive(Debug, Deserialize)]
struct ChainEnvelope {
    options: Option<ChainBody>,
}

#[derive(Debug, Deserialize)]
struct ChainBody {
    option: Option<OneOrMany<RawOption>>,
}

#[derive(Debug, Deserialize)]
struct RawOption {
    symbol: String,
    underlying: String,
    strike: f64,
    option_type: String,
    expiration_date: NaiveDate,
    bid: Option<f64>,
    ask: Option<f64>,
    last: Option<f64>,
    volume: Option<u64>,
    open_interest: Option<u64>,
    greeks: Option<RawGreeks>,
}

#[derive(Debug, Default, Deserialize)]
struct RawGreeks {
    delta: Option<f64>,
    gamma: Option<f64>,
    theta: Option<f64>,
    vega: Option<f64>,
    mid_iv: Option<f64>,
    smv_vol: Option<f64>,
}

impl RawOption {
    fn into_contract(self) -> Option<OptionContract> {
        let right = match self.option_type.as_str() {
            "call" => OptionRight::Call,
            "put" => OptionRight::Put,
            _ => return None,
        };
        let greeks = self.greeks.unwrap_or_default();
        Some(OptionContract {
            symbol: self.symbol,
            underlying: self.underlying,
            strike: price(Some(self.strike)),
            right,
            expiration: self.expiration_date,
            bid: price(self.bid),
            ask: price(self.ask),
            last: price(self.last),
            volume: self.volume.unwrap_or(0),
            open_interest: self.open_interest.unwrap_or(0),
            implied_volatility: greeks.mid_iv.or(greeks.smv_vol).unwrap_or(0.0),
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
impl MarketDataProvider for TradierProvider {
    fn name(&self) -> &str {
        "tradier"
    }

    async fn get_quote(&self, symbol: &str) -> Result<Quote> {
        let (quotes, _) = self.fetch_quotes(&[symbol.to_string()]).await?;
        quotes
            .into_iter()
            .find(|q| q.symbol.eq_ignore_ascii_case(symbol))
            .map(Quote::from)
            .ok_or_else(|| ProviderError::unknown_symbol(symbol.to_uppercase()))
    }

    async fn get_batch_quotes(&self, symbols: &[String]) -> HashMap<String, Quote> {
        if symbols.is_empty() {
            return HashMap::new();
        }
        match self.fetch_quotes(symbols).await {
            Ok((quotes, unmatched)) => {
                if !unmatched.is_empty() {
                    tracing::debug!(?unmatched, "tradier did not recognize symbols");
                }
                quotes
                    .into_iter()
                    .map(|raw| (raw.symbol.clone(), Quote::from(raw)))
                    .collect()
            }
            Err(e) => {
                tracing::warn!(error = %e, count = symbols.len(), "tradier batch quote failed");
                HashMap::new()
            }
        }
    }

    async fn get_historical_prices(
        &self,
        symbol: &str,
        range: HistoryRange,
    ) -> Result<Vec<HistoricalPrice>> {
        let end = Utc::now().date_naive();
        let start = end - ChronoDuration::days(range.calendar_days());
        let envelope: HistoryEnvelope = self
            .get(
                "/v1/markets/history",
                &[
                    ("symbol", symbol.to_uppercase()),
                    ("interval", "daily".to_string()),
                    ("start", start.to_string()),
                    ("end", end.to_string()),
                ],
            )
            .await?;

        let days = envelope
            .history
            .and_then(|h| h.day)
            .map(OneOrMany::into_vec)
            .ok_or_else(|| ProviderError::unknown_symbol(symbol.to_uppercase()))?;

        Ok(days
            .into_iter()
            .map(|d| HistoricalPrice {
                date: d.date,
                open: price(Some(d.open)),
                high: price(Some(d.high)),
                low: price(Some(d.low)),
                close: price(Some(d.close)),
                volume: d.volume,
            })
            .collect())
    }

    async fn get_option_chain(&self, symbol: &str, expiration: NaiveDate) -> Result<OptionChain> {
        let envelope: ChainEnvelope = self
            .get(
                "/v1/markets/options/chains",
                &[
                    ("symbol", symbol.to_uppercase()),
                    ("expiration", expiration.to_string()),
                    ("greeks", "true".to_string()),
                ],
            )
            .await?;
        let raw = envelope
            .options
            .and_then(|o| o.option)
            .map(OneOrMany::into_vec)
            .ok_or_else(|| {
                ProviderError::NotFound(format!("{} has no chain expiring {expiration}", symbol.to_uppercase()))
            })?;

        let quote = self.get_quote(symbol).await?;
        let contracts: Vec<OptionContract> = raw.into_iter().filter_map(RawOption::into_contract).collect();

        Ok(OptionChain {
            underlying: quote.symbol,
            underlying_price: quote.last,
            expiration,
            contracts,
            timestamp: Utc::now(),
        })
    }

    async fn get_option_expirations(&self, symbol: &str) -> Result<Vec<NaiveDate>> {
        let envelope: ExpirationsEnvelope = self
            .get(
                "/v1/markets/options/expirations",
                &[("symbol", symbol.to_uppercase()), ("includeAllRoots", "true".to_string())],
            )
            .await?;
        let mut dates = envelope
            .expirations
            .and_then(|e| e.date)
            .map(OneOrMany::into_vec)
            .unwrap_or_default();
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
            Some(expiration) => match self.get_option_chain(symbol, expiration).await {
                Ok(chain) => Some(chain),
                Err(e) => {
                    tracing::debug!(symbol, error = %e, "no chain for IV sample");
                    None
                }
            },
            None => None,
        };

        Ok(derived::volatility_from(&symbol.to_uppercase(), &history, chain.as_ref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer) -> TradierProvider {
        TradierProvider::new(SecretString::from("test-token".to_string()))
            .with_base_url(server.uri())
            .with_min_interval(Duration::ZERO)
    }

    fn aapl_quote() -> serde_json::Value {
        serde_json::json!({
            "quotes": {
                "quote": {
                    "symbol": "AAPL",
                    "last": 190.12,
                    "bid": 190.1,
                    "ask": 190.14,
                    "change_percentage": 0.85,
                    "volume": 41000000,
                    "average_volume": 55000000,
                    "trade_date": 1732118400000i64
                }
            }
        })
    }

    #[test]
    fn from_config_requires_token() {
        let config = ProviderConfig {
            kind: premia_core::ProviderKind::Tradier,
            ..ProviderConfig::default()
        };
        assert!(matches!(
            TradierProvider::from_config(&config),
            Err(ProviderError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_get_quote() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/markets/quotes"))
            .and(query_param("symbols", "AAPL"))
            .and(header("Authorization", "Bearer test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(aapl_quote()))
            .mount(&mock_server)
            .await;

        let quote = provider(&mock_server).get_quote("aapl").await.unwrap();
        assert_eq!(quote.symbol, "AAPL");
        assert_eq!(quote.last, dec!(190.12));
        assert_eq!(quote.average_volume, 55_000_000);
    }

    #[tokio::test]
    async fn test_unmatched_symbol_is_unknown() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/markets/quotes"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "quotes": { "unmatched_symbols": { "symbol": "ZZZZ" } }
            })))
            .mount(&mock_server)
            .await;

        let err = provider(&mock_server).get_quote("ZZZZ").await.unwrap_err();
        assert!(err.is_unknown_symbol());
    }

    #[tokio::test]
    async fn test_batch_quotes_omit_unmatched() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/markets/quotes"))
            .and(query_param("symbols", "AAPL,ZZZZ"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "quotes": {
                    "quote": [{ "symbol": "AAPL", "last": 190.0, "bid": 189.9, "ask": 190.1 }],
                    "unmatched_symbols": { "symbol": "ZZZZ" }
                }
            })))
            .mount(&mock_server)
            .await;

        let quotes = provider(&mock_server)
            .get_batch_quotes(&["AAPL".to_string(), "ZZZZ".to_string()])
            .await;
        assert_eq!(quotes.len(), 1);
        assert!(quotes.contains_key("AAPL"));
    }

    #[tokio::test]
    async fn test_option_chain_parses_greeks() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/markets/options/chains"))
            .and(query_param("expiration", "2024-12-20"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "options": { "option": [
                    {
                        "symbol": "AAPL241220P00180000", "underlying": "AAPL", "strike": 180.0,
                        "option_type": "put", "expiration_date": "2024-12-20",
                        "bid": 1.95, "ask": 2.05, "last": 2.0, "volume": 1200, "open_interest": 8700,
                        "greeks": { "delta": -0.23, "gamma": 0.02, "theta": -0.05, "vega": 0.18, "mid_iv": 0.27 }
                    },
                    {
                        "symbol": "AAPL241220C00200000", "underlying": "AAPL", "strike": 200.0,
                        "option_type": "call", "expiration_date": "2024-12-20",
                        "bid": 1.5, "ask": 1.6, "last": null, "volume": null, "open_interest": 5000,
                        "greeks": null
                    }
                ]}
            })))
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/v1/markets/quotes"))
            .respond_with(ResponseTemplate::new(200).set_body_json(aapl_quote()))
            .mount(&mock_server)
            .await;

        let expiration = NaiveDate::from_ymd_opt(2024, 12, 20).unwrap();
        let chain = provider(&mock_server).get_option_chain("AAPL", expiration).await.unwrap();
        assert_eq!(chain.underlying_price, dec!(190.12));
        assert_eq!(chain.contracts.len(), 2);

        let put = chain.find(OptionRight::Put, dec!(180)).unwrap();
        assert_eq!(put.open_interest, 8700);
        assert!((put.greeks.delta + 0.23).abs() < 1e-9);
        assert!((put.implied_volatility - 0.27).abs() < 1e-9);

        let call = chain.find(OptionRight::Call, dec!(200)).unwrap();
        assert_eq!(call.volume, 0);
        assert_eq!(call.greeks.delta, 0.0);
    }

    #[tokio::test]
    async fn test_empty_chain_is_not_found() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/markets/options/chains"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "options": null })))
            .mount(&mock_server)
            .await;

        let expiration = NaiveDate::from_ymd_opt(2024, 12, 20).unwrap();
        let err = provider(&mock_server).get_option_chain("AAPL", expiration).await.unwrap_err();
        assert!(matches!(err, ProviderError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_single_expiration_is_accepted() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/markets/options/expirations"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "expirations": { "date": "2024-12-20" }
            })))
            .mount(&mock_server)
            .await;

        let dates = provider(&mock_server).get_option_expirations("AAPL").await.unwrap();
        assert_eq!(dates, vec![NaiveDate::from_ymd_opt(2024, 12, 20).unwrap()]);
    }

    #[tokio::test]
    async fn test_rate_limit_status_maps_to_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/markets/quotes"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "12"))
            .mount(&mock_server)
            .await;

        let err = provider(&mock_server).get_quote("AAPL").await.unwrap_err();
        assert!(matches!(err, ProviderError::RateLimited { retry_after_secs: 12 }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_server_error_maps_to_api_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/markets/history"))
            .respond_with(ResponseTemplate::new(500).set_body_string("Internal Server Error"))
            .mount(&mock_server)
            .await;

        let err = provider(&mock_server)
            .get_historical_prices("AAPL", HistoryRange::OneMonth)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Api { status_code: 500, .. }));
    }
}
