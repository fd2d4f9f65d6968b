//! Provider selection from configuration.

use std::sync::Arc;

use premia_core::{ProviderConfig, ProviderKind};

use crate::error::Result;
use crate::polygon::PolygonProvider;
use crate::provider::MarketDataProvider;
use crate::simulated::SimulatedProvider;
use crate::tradier::TradierProvider;

/// Builds the configured provider. Vendor providers fail fast on a missing
/// token instead of at the first request.
pub fn create_provider(config: &ProviderConfig) -> Result<Arc<dyn MarketDataProvider>> {
    let provider: Arc<dyn MarketDataProvider> = match config.kind {
        ProviderKind::Simulated => Arc::new(SimulatedProvider::new()),
        ProviderKind::Tradier => Arc::new(TradierProvider::from_config(config)?),
        ProviderKind::Polygon => Arc::new(PolygonProvider::from_config(config)?),
    };
    tracing::info!(provider = provider.name(), "market data provider ready");
    Ok(provider)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;

    #[test]
    fn simulated_needs_no_credentials() {
        let provider = create_provider(&ProviderConfig::default()).unwrap();
        assert_eq!(provider.name(), "simulated");
    }

    #[test]
    fn vendors_need_a_token() {
        for kind in [ProviderKind::Tradier, ProviderKind::Polygon] {
            let config = ProviderConfig {
                kind,
                ..ProviderConfig::default()
            };
            assert!(matches!(create_provider(&config), Err(ProviderError::Configuration(_))));
        }
    }

    #[test]
    fn vendor_with_token_is_built() {
        let config = ProviderConfig {
            kind: ProviderKind::Polygon,
            api_token: Some("abc".to_string()),
            base_url: Some("http://localhost:9".to_string()),
            ..ProviderConfig::default()
        };
        assert_eq!(create_provider(&config).unwrap().name(), "polygon");
    }
}
