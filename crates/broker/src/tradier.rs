//! Tradier brokerage over REST: option and multileg limit orders.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use premia_core::{parse_occ_symbol, BrokerConfig, BrokerKind};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{BrokerError, Result};
use crate::provider::BrokerProvider;
use crate::types::{AccountInfo, OrderRequest, OrderResult, OrderStatus, Position, TimeInForce, CONTRACT_MULTIPLIER};

/// Production API root.
pub const TRADIER_API_URL: &str = "https://api.tradier.com";

/// Paper-trading sandbox root.
pub const TRADIER_SANDBOX_URL: &str = "https://sandbox.tradier.com";

pub struct TradierBrokerProvider {
    http: Client,
    base_url: String,
    token: SecretString,
    account_id: String,
}

impl TradierBrokerProvider {
    pub fn new(token: SecretString, account_id: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: TRADIER_API_URL.to_string(),
            token,
            account_id: account_id.into(),
        }
    }

    /// Builds from config. Requires `api_token` and `account_id`.
    ///
    /// # Errors
    /// Returns `Configuration` if either is missing or the HTTP client
    /// cannot be built.
    pub fn from_config(config: &BrokerConfig) -> Result<Self> {
        let token = config
            .api_token
            .clone()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| BrokerError::Configuration("tradier broker requires broker.api_token".to_string()))?;
        let account_id = config
            .account_id
            .clone()
            .filter(|a| !a.is_empty())
            .ok_or_else(|| BrokerError::Configuration("tradier broker requires broker.account_id".to_string()))?;

        let mut broker = Self::new(SecretString::from(token), account_id);
        broker.http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| BrokerError::Configuration(format!("failed to build HTTP client: {e}")))?;
        if let Some(url) = &config.base_url {
            broker = broker.with_base_url(url.clone());
        }
        Ok(broker)
    }

    /// Sets a custom base URL (useful for testing).
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    #[must_use]
    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    fn account_path(&self, tail: &str) -> String {
        format!("{}/v1/accounts/{}{}", self.base_url, self.account_id, tail)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = request
            .bearer_auth(self.token.expose_secret())
            .header("Accept", "application/json")
            .send()
            .await?;
        decode(response).await
    }

    async fn fetch_order(&self, order_id: &str) -> Result<RawOrder> {
        let url = self.account_path(&format!("/orders/{order_id}"));
        tracing::debug!("GET {}", url);
        let envelope: OrderEnvelope = self.send(self.http.get(&url)).await?;
        envelope.into_order(order_id)
    }
}

/// Form fields for an order: `option` class for one leg, `multileg` otherwise.
fn order_form(order: &OrderRequest) -> Vec<(String, String)> {
    let duration = match order.time_in_force {
        TimeInForce::Day => "day",
        TimeInForce::Gtc => "gtc",
    };
    let mut form = vec![
        ("symbol".to_string(), order.symbol.clone()),
        ("duration".to_string(), duration.to_string()),
        ("price".to_string(), order.limit_price.to_string()),
        ("tag".to_string(), order.id.simple().to_string()),
    ];

    if let [leg] = order.legs.as_slice() {
        form.push(("class".to_string(), "option".to_string()));
        form.push(("type".to_string(), "limit".to_string()));
        form.push(("option_symbol".to_string(), leg.option_symbol.clone()));
        form.push(("side".to_string(), leg.action.to_string()));
        form.push(("quantity".to_string(), (leg.quantity * order.quantity).to_string()));
    } else {
        form.push(("class".to_string(), "multileg".to_string()));
        form.push(("type".to_string(), "credit".to_string()));
        for (i, leg) in order.legs.iter().enumerate() {
            form.push((format!("option_symbol[{i}]"), leg.option_symbol.clone()));
            form.push((format!("side[{i}]"), leg.action.to_string()));
            form.push((format!("quantity[{i}]"), (leg.quantity * order.quantity).to_string()));
        }
    }
    form
}

fn map_status(raw: &str) -> OrderStatus {
    match raw {
        "filled" => OrderStatus::Filled,
        "partially_filled" => OrderStatus::PartiallyFilled,
        "canceled" | "expired" => OrderStatus::Cancelled,
        "rejected" | "error" => OrderStatus::Rejected,
        _ => OrderStatus::Submitted,
    }
}

fn decimal(value: Option<f64>) -> Option<Decimal> {
    value.and_then(|v| Decimal::try_from(v).ok()).map(|d| d.round_dp(4))
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        return Err(BrokerError::not_found(response.url().path().to_string()));
    }
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        return Err(BrokerError::api(status.as_u16(), text));
    }
    let body = response.bytes().await?;
    Ok(serde_json::from_slice(&body)?)
}

#[async_trait]
impl BrokerProvider for TradierBrokerProvider {
    fn name(&self) -> &str {
        "tradier"
    }

    fn kind(&self) -> BrokerKind {
        BrokerKind::Tradier
    }

    async fn submit_order(&self, order: &OrderRequest) -> Result<OrderResult> {
        let url = self.account_path("/orders");
        tracing::debug!("POST {}", url);

        let envelope: OrderEnvelope = self.send(self.http.post(&url).form(&order_form(order))).await?;
        let raw = envelope.into_order("new order")?;
        let now = Utc::now();

        let result = OrderResult {
            order_id: raw.id.to_string(),
            client_order_id: Some(order.id),
            broker: self.name().to_string(),
            status: OrderStatus::Submitted,
            quantity: order.quantity,
            filled_quantity: 0,
            avg_fill_price: None,
            commission: Decimal::ZERO,
            submitted_at: now,
            updated_at: now,
            note: None,
        };
        tracing::info!(order_id = %result.order_id, symbol = %order.symbol, "order submitted to tradier");
        Ok(result)
    }

    async fn cancel_order(&self, order_id: &str) -> Result<OrderResult> {
        let url = self.account_path(&format!("/orders/{order_id}"));
        tracing::debug!("DELETE {}", url);
        let envelope: OrderEnvelope = self.send(self.http.delete(&url)).await?;
        envelope.into_order(order_id)?;
        tracing::info!(order_id, "cancel requested");
        self.get_order(order_id).await
    }

    async fn get_order(&self, order_id: &str) -> Result<OrderResult> {
        let raw = self.fetch_order(order_id).await?;
        let status = raw.status.as_deref().map_or(OrderStatus::Submitted, map_status);
        let created = raw.create_date.unwrap_or_else(Utc::now);
        Ok(OrderResult {
            order_id: raw.id.to_string(),
            client_order_id: None,
            broker: self.name().to_string(),
            status,
            quantity: raw.quantity.unwrap_or(0.0) as u32,
            filled_quantity: raw.exec_quantity.unwrap_or(0.0) as u32,
            avg_fill_price: decimal(raw.avg_fill_price).filter(|p| !p.is_zero()),
            commission: Decimal::ZERO,
            submitted_at: created,
            updated_at: raw.transaction_date.unwrap_or(created),
            note: raw.reason_description,
        })
    }

    async fn get_account_info(&self) -> Result<AccountInfo> {
        let url = self.account_path("/balances");
        tracing::debug!("GET {}", url);
        let envelope: BalancesEnvelope = self.send(self.http.get(&url)).await?;
        let b = envelope.balances;

        let cash = decimal(b.total_cash).unwrap_or_default();
        let buying_power = b
            .margin
            .and_then(|m| m.option_buying_power)
            .or_else(|| b.cash.and_then(|c| c.cash_available))
            .and_then(|v| decimal(Some(v)))
            .unwrap_or(cash);

        Ok(AccountInfo {
            account_id: b.account_number.unwrap_or_else(|| self.account_id.clone()),
            broker: self.name().to_string(),
            cash,
            equity: decimal(b.total_equity).unwrap_or(cash),
            buying_power,
            open_orders: b.pending_orders_count.unwrap_or(0),
        })
    }

    async fn get_positions(&self) -> Result<Vec<Position>> {
        let url = self.account_path("/positions");
        tracing::debug!("GET {}", url);
        let envelope: PositionsEnvelope = self.send(self.http.get(&url)).await?;
        let raw = match envelope.positions {
            PositionsField::Present { position } => position.into_vec(),
            PositionsField::Empty(_) => Vec::new(),
        };

        Ok(raw
            .into_iter()
            .filter_map(|p| {
                // Equity positions have no OCC symbol and are skipped.
                let parts = parse_occ_symbol(&p.symbol)?;
                let quantity = p.quantity as i64;
                let contracts = Decimal::from(quantity.unsigned_abs()) * CONTRACT_MULTIPLIER;
                let average_price = decimal(p.cost_basis)
                    .filter(|_| !contracts.is_zero())
                    .map(|basis| (basis.abs() / contracts).round_dp(4))
                    .unwrap_or_default();
                Some(Position {
                    option_symbol: p.symbol,
                    underlying: parts.underlying,
                    strike: parts.strike,
                    right: parts.right,
                    expiration: parts.expiration,
                    quantity,
                    average_price,
                })
            })
            .collect())
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            Self::One(item) => vec![item],
            Self::Many(items) => items,
        }
    }
}

#[derive(Debug, Deserialize)]
struct OrderEnvelope {
    order: Option<RawOrder>,
    errors: Option<ErrorsBody>,
}

impl OrderEnvelope {
    fn into_order(self, context: &str) -> Result<RawOrder> {
        if let Some(errors) = self.errors {
            return Err(BrokerError::provider("tradier", errors.error.into_vec().join("; ")));
        }
        self.order
            .ok_or_else(|| BrokerError::Parse(format!("missing order in response for {context}")))
    }
}

#[derive(Debug, Deserialize)]
struct ErrorsBody {
    error: OneOrMany<String>,
}

#[derive(Debug, Deserialize)]
struct RawOrder {
    id: u64,
    status: Option<String>,
    quantity: Option<f64>,
    exec_quantity: Option<f64>,
    avg_fill_price: Option<f64>,
    create_date: Option<DateTime<Utc>>,
    transaction_date: Option<DateTime<Utc>>,
    reason_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BalancesEnvelope {
    balances: RawBalances,
}

#[derive(Debug, Deserialize)]
struct RawBalances {
    account_number: Option<String>,
    total_cash: Option<f64>,
    total_equity: Option<f64>,
    pending_orders_count: Option<usize>,
    margin: Option<RawMargin>,
    cash: Option<RawCash>,
}

#[derive(Debug, Deserialize)]
struct RawMargin {
    option_buying_power: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawCash {
    cash_available: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct PositionsEnvelope {
    positions: PositionsField,
}

/// Tradier sends the string `"null"` when there are no positions.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PositionsField {
    Present { position: OneOrMany<RawPosition> },
    Empty(String),
}

#[derive(Debug, Deserialize)]
struct RawPosition {
    symbol: String,
    quantity: f64,
    cost_basis: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::credit_spread_order;
    use rust_decimal_macros::dec;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn broker(server: &MockServer) -> TradierBrokerProvider {
        TradierBrokerProvider::new(SecretString::from("test-token".to_string()), "VA123").with_base_url(server.uri())
    }

    #[test]
    fn test_multileg_form() {
        let form = order_form(&credit_spread_order(2));
        let get = |k: &str| form.iter().find(|(key, _)| key == k).map(|(_, v)| v.as_str());
        assert_eq!(get("class"), Some("multileg"));
        assert_eq!(get("type"), Some("credit"));
        assert_eq!(get("side[0]"), Some("sell_to_open"));
        assert_eq!(get("side[1]"), Some("buy_to_open"));
        assert_eq!(get("quantity[1]"), Some("2"));
        assert_eq!(get("price"), Some("1.02"));
    }

    #[tokio::test]
    async fn test_submit_order() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/accounts/VA123/orders"))
            .and(header("Authorization", "Bearer test-token"))
            .and(body_string_contains("class=multileg"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "order": {"id": 257459, "status": "ok"}
            })))
            .mount(&server)
            .await;

        let result = broker(&server).submit_order(&credit_spread_order(1)).await.unwrap();
        assert_eq!(result.order_id, "257459");
        assert_eq!(result.status, OrderStatus::Submitted);
    }

    #[tokio::test]
    async fn test_submit_order_rejected_by_broker() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/accounts/VA123/orders"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "errors": {"error": "Backoffice rejected override of the order."}
            })))
            .mount(&server)
            .await;

        let err = broker(&server).submit_order(&credit_spread_order(1)).await.unwrap_err();
        assert!(matches!(err, BrokerError::Provider { .. }));
        assert!(err.to_string().contains("Backoffice"));
    }

    #[tokio::test]
    async fn test_get_order_maps_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/accounts/VA123/orders/42"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "order": {
                    "id": 42,
                    "status": "filled",
                    "quantity": 1.0,
                    "exec_quantity": 1.0,
                    "avg_fill_price": 1.03,
                    "create_date": "2024-11-20T15:02:29.682Z",
                    "transaction_date": "2024-11-20T15:02:31.000Z"
                }
            })))
            .mount(&server)
            .await;

        let order = broker(&server).get_order("42").await.unwrap();
        assert_eq!(order.status, OrderStatus::Filled);
        assert_eq!(order.filled_quantity, 1);
        assert_eq!(order.avg_fill_price, Some(dec!(1.03)));
    }

    #[tokio::test]
    async fn test_get_account_info() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/accounts/VA123/balances"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "balances": {
                    "account_number": "VA123",
                    "total_cash": 6687.66,
                    "total_equity": 17798.36,
                    "pending_orders_count": 2,
                    "margin": {"option_buying_power": 6363.86}
                }
            })))
            .mount(&server)
            .await;

        let account = broker(&server).get_account_info().await.unwrap();
        assert_eq!(account.cash, dec!(6687.66));
        assert_eq!(account.equity, dec!(17798.36));
        assert_eq!(account.buying_power, dec!(6363.86));
        assert_eq!(account.open_orders, 2);
    }

    #[tokio::test]
    async fn test_get_positions() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/accounts/VA123/positions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "positions": {"position": [
                    {"symbol": "AAPL", "quantity": 100.0, "cost_basis": 19000.0},
                    {"symbol": "AAPL241220P00180000", "quantity": -2.0, "cost_basis": -400.0}
                ]}
            })))
            .mount(&server)
            .await;

        let positions = broker(&server).get_positions().await.unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].quantity, -2);
        assert_eq!(positions[0].strike, dec!(180));
        assert_eq!(positions[0].average_price, dec!(2));
    }

    #[tokio::test]
    async fn test_empty_positions() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/accounts/VA123/positions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"positions": "null"})))
            .mount(&server)
            .await;

        assert!(broker(&server).get_positions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_order_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/accounts/VA123/orders/7"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = broker(&server).get_order("7").await.unwrap_err();
        assert!(matches!(err, BrokerError::NotFound(_)));
    }

    #[test]
    fn test_from_config_requires_account() {
        let config = BrokerConfig {
            kind: BrokerKind::Tradier,
            api_token: Some("t".to_string()),
            ..BrokerConfig::default()
        };
        assert!(matches!(
            TradierBrokerProvider::from_config(&config),
            Err(BrokerError::Configuration(_))
        ));
    }
}
