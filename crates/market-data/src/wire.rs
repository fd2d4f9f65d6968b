//! Shared helpers for decoding vendor JSON.

use std::time::Duration;

use reqwest::{Response, StatusCode};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{ProviderError, Result};

/// A field the vendor sends as a bare value when there is one item and
/// as an array otherwise.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    pub(crate) fn into_vec(self) -> Vec<T> {
        match self {
            Self::One(item) => vec![item],
            Self::Many(items) => items,
        }
    }
}

pub(crate) fn price(value: Option<f64>) -> Decimal {
    value
        .and_then(|v| Decimal::try_from(v).ok())
        .map(|d| d.round_dp(4))
        .unwrap_or_default()
}

/// Maps status codes to provider errors and decodes the body.
pub(crate) async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after_secs = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .unwrap_or(60);
        return Err(ProviderError::RateLimited { retry_after_secs });
    }
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        return Err(ProviderError::api(status.as_u16(), text));
    }
    let body = response.bytes().await?;
    Ok(serde_json::from_slice(&body)?)
}

pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ProviderError::Configuration(format!("failed to build HTTP client: {e}")))
}
