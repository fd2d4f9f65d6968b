use premia_core::{StrategyKind, TradePacket};
use rust_decimal::Decimal;

use super::common::{assemble, credit_spreads, lot_credit};
use super::{Candidate, StrategyContext, TradeStrategy};

/// Sell an OTM call, buy a higher-strike call for protection.
#[derive(Debug, Clone, Copy, Default)]
pub struct CallCreditSpread;

impl TradeStrategy for CallCreditSpread {
    fn kind(&self) -> StrategyKind {
        StrategyKind::CallCreditSpread
    }

    fn find_candidates(&self, ctx: &StrategyContext<'_>) -> Vec<Candidate> {
        credit_spreads(ctx, self.kind())
    }

    fn candidate_to_packet(&self, candidate: &Candidate, ctx: &StrategyContext<'_>) -> Option<TradePacket> {
        let long = candidate.long.as_ref()?;
        let width = long.strike - candidate.short.strike;
        let credit = lot_credit(candidate);
        let max_loss = width * Decimal::ONE_HUNDRED - credit;
        let breakeven = candidate.short.strike + candidate.credit_per_share();
        assemble(candidate, ctx, credit, max_loss, breakeven)
    }
}
