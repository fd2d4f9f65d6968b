//! Broker error types.
//!
//! `SafetyGateRejection` is the user-facing reason an order was refused
//! before reaching a broker. `BrokerError` wraps it together with provider
//! and workflow failures.

use thiserror::Error;

/// Why the execution manager refused an order.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SafetyGateRejection {
    #[error("trading is disabled: enable trading_enabled to submit orders")]
    TradingDisabled,

    #[error("broker execution is disabled and paper mode is off: no route for this order")]
    BrokerExecutionDisabled,

    #[error("order failed validation: {0}")]
    InvalidOrder(String),

    #[error("risk limit exceeded: {0}")]
    RiskLimit(String),
}

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error(transparent)]
    Gate(#[from] SafetyGateRejection),

    /// The broker refused or failed the request.
    #[error("{broker} error: {message}")]
    Provider { broker: String, message: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("API error: {status_code} - {message}")]
    Api { status_code: u16, message: String },

    #[error("not found: {0}")]
    NotFound(String),

    /// The order or proposal is not in a state that allows the action.
    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("parse error: {0}")]
    Parse(String),
}

impl BrokerError {
    pub fn provider(broker: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            broker: broker.into(),
            message: message.into(),
        }
    }

    pub fn api(status_code: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status_code,
            message: message.into(),
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }

    #[must_use]
    pub fn is_gate_rejection(&self) -> bool {
        matches!(self, Self::Gate(_))
    }

    /// Transient failures a human may choose to re-initiate. Nothing in
    /// this crate retries on its own.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Api { status_code, .. } => *status_code >= 500 || *status_code == 429,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for BrokerError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}

impl From<serde_json::Error> for BrokerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BrokerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_rejections_read_plainly() {
        let err: BrokerError = SafetyGateRejection::TradingDisabled.into();
        assert!(err.is_gate_rejection());
        assert!(err.to_string().contains("trading is disabled"));
    }

    #[test]
    fn retryable_classification() {
        assert!(BrokerError::Network("reset".into()).is_retryable());
        assert!(BrokerError::api(503, "unavailable").is_retryable());
        assert!(!BrokerError::api(400, "bad order").is_retryable());
        assert!(!BrokerError::from(SafetyGateRejection::RiskLimit("x".into())).is_retryable());
    }
}
