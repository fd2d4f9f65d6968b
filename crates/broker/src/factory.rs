use std::sync::Arc;

use premia_core::{BrokerConfig, BrokerKind};

use crate::error::Result;
use crate::manual::ManualBrokerProvider;
use crate::paper::PaperBrokerProvider;
use crate::provider::BrokerProvider;
use crate::tradier::TradierBrokerProvider;

/// Builds the configured broker.
///
/// # Errors
/// Returns `Configuration` when a live broker is missing credentials.
pub fn create_broker(config: &BrokerConfig) -> Result<Arc<dyn BrokerProvider>> {
    let broker: Arc<dyn BrokerProvider> = match config.kind {
        BrokerKind::Manual => Arc::new(ManualBrokerProvider::new(config.paper_starting_cash)),
        BrokerKind::Paper => Arc::new(PaperBrokerProvider::new(config.paper_starting_cash)),
        BrokerKind::Tradier => Arc::new(TradierBrokerProvider::from_config(config)?),
    };
    tracing::info!(broker = broker.name(), "broker configured");
    Ok(broker)
}
