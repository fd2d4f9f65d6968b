//! Engine error type.

use premia_core::ValidationError;
use premia_market_data::ProviderError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Settings were rejected before the run started.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Market data needed by a narrow entry point was unavailable.
    #[error("market data error: {0}")]
    Provider(#[from] ProviderError),
}

pub type Result<T> = std::result::Result<T, EngineError>;
