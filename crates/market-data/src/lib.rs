//! Market data access for the premia engine.
//!
//! Providers implement [`MarketDataProvider`]. The engine wraps whichever
//! provider is configured in a [`CachedProvider`], which adds per-kind TTL
//! caching, single-flight coalescing and per-call timeouts. Vendor
//! providers serialize their outbound calls through a [`RequestQueue`].
//!
//! # Example
//!
//! ```ignore
//! use premia_market_data::{CacheRegistry, CachedProvider, SimulatedProvider};
//!
//! let caches = Arc::new(CacheRegistry::default());
//! let provider = CachedProvider::new(Arc::new(SimulatedProvider::new()), caches, Duration::from_secs(10));
//! let quote = provider.get_quote("SPY").await?;
//! ```

pub mod batch;
pub mod cache;
pub mod cached;
pub mod derived;
pub mod error;
pub mod factory;
pub mod polygon;
pub mod provider;
pub mod rate_limit;
pub mod simulated;
pub mod tradier;
mod wire;

pub use batch::fan_out;
pub use cache::{CacheRegistry, CacheTtls, Memoizer, SingleFlight, TtlCache};
pub use cached::CachedProvider;
pub use error::{ProviderError, Result};
pub use factory::create_provider;
pub use polygon::PolygonProvider;
pub use provider::MarketDataProvider;
pub use rate_limit::RequestQueue;
pub use simulated::SimulatedProvider;
pub use tradier::TradierProvider;
