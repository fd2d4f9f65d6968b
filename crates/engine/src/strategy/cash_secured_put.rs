use premia_core::{StrategyKind, TradePacket};
use rust_decimal::Decimal;

use super::common::{assemble, lot_credit, short_legs};
use super::{Candidate, StrategyContext, TradeStrategy};

/// Sell one OTM put, fully collateralized by cash.
#[derive(Debug, Clone, Copy, Default)]
pub struct CashSecuredPut;

impl TradeStrategy for CashSecuredPut {
    fn kind(&self) -> StrategyKind {
        StrategyKind::CashSecuredPut
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

    fn candidate_to_packet(&self, candidate: &Candidate, ctx: &StrategyContext<'_>) -> Option<TradePacket> {
        let credit = lot_credit(candidate);
        // Assignment at the strike, cushioned by the premium.
        let max_loss = candidate.short.strike * Decimal::ONE_HUNDRED - credit;
        let breakeven = candidate.short.strike - candidate.credit_per_share();
        assemble(candidate, ctx, credit, max_loss, breakeven)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use premia_core::{get_default_settings, LegAction, SettingsPreset, Trend};
    use rust_decimal_macros::dec;

    #[test]
    fn picks_the_put_inside_the_delta_window() {
        let settings = get_default_settings(SettingsPreset::Balanced);
        let chain = chain();
        let signals = signals();
        let regime = regime(Trend::Uptrend);
        let ctx = StrategyContext {
            symbol: "XYZ",
            chain: &chain,
            underlying_price: dec!(100),
            signals: &signals,
            regime: &regime,
            settings: &settings,
            today: today(),
        };

        assert!(CashSecuredPut.should_consider(&ctx));
        let candidates = CashSecuredPut.find_candidates(&ctx);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].short.strike, dec!(95));

        let packet = CashSecuredPut.candidate_to_packet(&candidates[0], &ctx).unwrap();
        assert_eq!(packet.net_credit, dec!(200));
        assert_eq!(packet.max_loss, dec!(9300));
        assert_eq!(packet.breakeven, dec!(93));
        assert_eq!(packet.dte, 30);
        assert_eq!(packet.legs.len(), 1);
        assert_eq!(packet.legs[0].action, LegAction::SellToOpen);
        assert!((packet.short_delta + 0.27).abs() < 1e-9);
    }

    #[test]
    fn disabled_strategy_is_not_considered() {
        let mut settings = get_default_settings(SettingsPreset::Balanced);
        settings.strategies.cash_secured_put.enabled = false;
        let chain = chain();
        let signals = signals();
        let regime = regime(Trend::Uptrend);
        let ctx = StrategyContext {
            symbol: "XYZ",
            chain: &chain,
            underlying_price: dec!(100),
            signals: &signals,
            regime: &regime,
            settings: &settings,
            today: today(),
        };
        assert!(!CashSecuredPut.should_consider(&ctx));
    }

    #[test]
    fn downtrend_is_not_preferred() {
        let settings = get_default_settings(SettingsPreset::Balanced);
        let chain = chain();
        let signals = signals();
        let regime = regime(Trend::Downtrend);
        let ctx = StrategyContext {
            symbol: "XYZ",
            chain: &chain,
            underlying_price: dec!(100),
            signals: &signals,
            regime: &regime,
            settings: &settings,
            today: today(),
        };
        assert!(!CashSecuredPut.should_consider(&ctx));
    }
}
