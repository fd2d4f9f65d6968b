use premia_core::{StrategyKind, TradePacket};
use rust_decimal::Decimal;

use super::common::{assemble, lot_credit, short_legs};
use super::{Candidate, StrategyContext, TradeStrategy};

/// Sell one OTM call against 100 shares held.
#[derive(Debug, Clone, Copy, Default)]
pub struct CoveredCall;

impl TradeStrategy for CoveredCall {
    fn kind(&self) -> StrategyKind {
        StrategyKind::CoveredCall
    }

    fn find_candidates(&self, ctx: &StrategyContext<'_>) -> Vec<Candidate> {
        short_legs(ctx, self.kind())
            .into_iter()
            .map(|short| Candidate {
                strategy: self.kind(),
                short: short.clone(),
                long: None,
                dte: ctx.dte(),
            })
            .collect()
    }

    /// Max loss is the exposure of the 100 covered shares, net of premium.
    /// The short call is covered, so its strike caps the upside only; the
    /// downside runs from spot to zero.
    fn candidate_to_packet(&self, candidate: &Candidate, ctx: &StrategyContext<'_>) -> Option<TradePacket> {
        let credit = lot_credit(candidate);
        // Shares going to zero, less the premium kept.
        let max_loss = ctx.underlying_price * Decimal::ONE_HUNDRED - credit;
        let breakeven = ctx.underlying_price - candidate.credit_per_share();
        assemble(candidate, ctx, credit, max_loss, breakeven)
    }
}
