//! Error types for market data access.

use std::time::Duration;

use thiserror::Error;

/// Errors raised by market data providers.
///
/// `Clone` so a single upstream failure can be shared by every caller
/// waiting on the same in-flight fetch.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// The vendor does not know this symbol.
    #[error("unknown symbol: {symbol}")]
    UnknownSymbol {
        /// The symbol that was requested.
        symbol: String,
    },

    /// Requested data does not exist (e.g. no chain for an expiration).
    #[error("not found: {0}")]
    NotFound(String),

    /// Network error.
    #[error("network error: {0}")]
    Network(String),

    /// Vendor quota exceeded.
    #[error("rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited {
        /// Seconds to wait before retry.
        retry_after_secs: u64,
    },

    /// Vendor returned a non-success status.
    #[error("API error: {status_code} - {message}")]
    Api {
        /// HTTP status code.
        status_code: u16,
        /// Error message from the vendor.
        message: String,
    },

    /// A provider call exceeded its time bound.
    #[error("{operation} timed out after {after_ms}ms")]
    Timeout {
        /// Operation that timed out.
        operation: String,
        /// Elapsed bound in milliseconds.
        after_ms: u64,
    },

    /// Response could not be decoded.
    #[error("parse error: {0}")]
    Parse(String),

    /// Not enough history to compute a feature.
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    /// Provider misconfigured (missing token, bad URL).
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl ProviderError {
    /// Creates an unknown symbol error.
    pub fn unknown_symbol(symbol: impl Into<String>) -> Self {
        Self::UnknownSymbol {
            symbol: symbol.into(),
        }
    }

    /// Creates an API error from status code and message.
    pub fn api(status_code: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status_code,
            message: message.into(),
        }
    }

    /// Creates a timeout error.
    pub fn timeout(operation: impl Into<String>, after: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            after_ms: u64::try_from(after.as_millis()).unwrap_or(u64::MAX),
        }
    }

    #[must_use]
    pub fn is_unknown_symbol(&self) -> bool {
        matches!(self, Self::UnknownSymbol { .. })
    }

    /// Returns true if the same request may succeed later.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout { .. } | Self::RateLimited { .. } => true,
            Self::Api { status_code, .. } => *status_code >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout {
                operation: "http request".to_string(),
                after_ms: 0,
            }
        } else if err.is_decode() {
            Self::Parse(err.to_string())
        } else if err.is_connect() {
            Self::Network(format!("connection failed: {err}"))
        } else {
            Self::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

/// Result type alias for provider operations.
pub type Result<T> = std::result::Result<T, ProviderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_symbol_is_distinguishable() {
        let err = ProviderError::unknown_symbol("ZZZZ");
        assert!(err.is_unknown_symbol());
        assert!(!err.is_retryable());
        assert_eq!(err.to_string(), "unknown symbol: ZZZZ");
    }

    #[test]
    fn transient_errors_are_retryable() {
        assert!(ProviderError::Network("reset".to_string()).is_retryable());
        assert!(ProviderError::RateLimited { retry_after_secs: 5 }.is_retryable());
        assert!(ProviderError::timeout("get_quote", Duration::from_secs(10)).is_retryable());
        assert!(ProviderError::api(503, "unavailable").is_retryable());
        assert!(!ProviderError::api(400, "bad request").is_retryable());
    }

    #[test]
    fn timeout_display_includes_bound() {
        let err = ProviderError::timeout("get_option_chain", Duration::from_millis(1500));
        assert_eq!(err.to_string(), "get_option_chain timed out after 1500ms");
    }
}
