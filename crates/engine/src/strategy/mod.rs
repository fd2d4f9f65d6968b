//! Rule-based trade generators.
//!
//! Each strategy gates itself on the regime and settings (`should_consider`),
//! scans one option chain for legs that pass every filter
//! (`find_candidates`), and prices the legs into a `TradePacket`
//! (`candidate_to_packet`). Liquidity and earnings filters run before a
//! candidate is emitted.

mod call_credit_spread;
mod cash_secured_put;
mod common;
mod covered_call;
mod put_credit_spread;

pub use call_credit_spread::CallCreditSpread;
pub use cash_secured_put::CashSecuredPut;
pub use common::{is_liquid, is_out_of_the_money};
pub use covered_call::CoveredCall;
pub use put_credit_spread::PutCreditSpread;

use chrono::NaiveDate;
use premia_core::settings::StrategySettings;
use premia_core::{
    MarketRegime, OptionChain, OptionContract, StrategyKind, SymbolSignals, TradePacket,
    TradingSettings,
};
use rust_decimal::Decimal;

/// Everything a strategy sees for one symbol and one expiration.
#[derive(Debug, Clone, Copy)]
pub struct StrategyContext<'a> {
    pub symbol: &'a str,
    pub chain: &'a OptionChain,
    pub underlying_price: Decimal,
    pub signals: &'a SymbolSignals,
    pub regime: &'a MarketRegime,
    pub settings: &'a TradingSettings,
    pub today: NaiveDate,
}

impl StrategyContext<'_> {
    /// Days to the chain's expiration.
    #[must_use]
    pub fn dte(&self) -> i64 {
        (self.chain.expiration - self.today).num_days()
    }

    #[must_use]
    pub fn strategy_settings(&self, kind: StrategyKind) -> &StrategySettings {
        self.settings.strategies.get(kind)
    }
}

/// Legs selected for one potential trade, before pricing.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub strategy: StrategyKind,
    pub short: OptionContract,
    /// Protective leg for credit spreads.
    pub long: Option<OptionContract>,
    pub dte: i64,
}

impl Candidate {
    /// Net mid premium per share.
    #[must_use]
    pub fn credit_per_share(&self) -> Decimal {
        let debit = self.long.as_ref().map_or(Decimal::ZERO, OptionContract::mid);
        self.short.mid() - debit
    }
}

pub trait TradeStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    fn name(&self) -> &'static str {
        self.kind().label()
    }

    /// Enabled, regime trend preferred, and the expiration inside the DTE window.
    fn should_consider(&self, ctx: &StrategyContext<'_>) -> bool {
        let settings = ctx.strategy_settings(self.kind());
        settings.enabled
            && settings.preferred_trends.contains(&ctx.regime.trend)
            && !ctx.chain.contracts.is_empty()
            && settings.dte_in_range(ctx.dte())
    }

    fn find_candidates(&self, ctx: &StrategyContext<'_>) -> Vec<Candidate>;

    /// Prices a candidate. `None` if it does not yield a positive credit
    /// with a positive max loss.
    fn candidate_to_packet(&self, candidate: &Candidate, ctx: &StrategyContext<'_>) -> Option<TradePacket>;
}

/// Ordered set of strategies run for every symbol and expiration.
pub struct StrategyRegistry {
    strategies: Vec<Box<dyn TradeStrategy>>,
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl StrategyRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            strategies: Vec::new(),
        }
    }

    /// CSP, CC, PCS, CCS in that order.
    #[must_use]
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(CashSecuredPut));
        registry.register(Box::new(CoveredCall));
        registry.register(Box::new(PutCreditSpread));
        registry.register(Box::new(CallCreditSpread));
        registry
    }

    pub fn register(&mut self, strategy: Box<dyn TradeStrategy>) {
        self.strategies.push(strategy);
    }

    #[must_use]
    pub fn kinds(&self) -> Vec<StrategyKind> {
        self.strategies.iter().map(|s| s.kind()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Runs every strategy that opts in and returns their packets.
    #[must_use]
    pub fn generate(&self, ctx: &StrategyContext<'_>) -> Vec<TradePacket> {
        let mut packets = Vec::new();
        for strategy in &self.strategies {
            if !strategy.should_consider(ctx) {
                continue;
            }
            let candidates = strategy.find_candidates(ctx);
            let before = packets.len();
            packets.extend(
                candidates
                    .iter()
                    .filter_map(|candidate| strategy.candidate_to_packet(candidate, ctx)),
            );
            tracing::debug!(
                symbol = ctx.symbol,
                expiration = %ctx.chain.expiration,
                strategy = strategy.name(),
                candidates = candidates.len(),
                packets = packets.len() - before,
                "strategy evaluated"
            );
        }
        packets
    }
}
