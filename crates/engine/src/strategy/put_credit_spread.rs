use premia_core::{StrategyKind, TradePacket};
use rust_decimal::Decimal;

use super::common::{assemble, credit_spreads, lot_credit};
use super::{Candidate, StrategyContext, TradeStrategy};

/// Sell an OTM put, buy a lower-strike put for protection.
#[derive(Debug, Clone, Copy, Default)]
pub struct PutCreditSpread;

impl TradeStrategy for PutCreditSpread {
    fn kind(&self) -> StrategyKind {
        StrategyKind::PutCreditSpread
    }

    fn find_candidates(&self, ctx: &StrategyContext<'_>) -> Vec<Candidate> {
        credit_spreads(ctx, self.kind())
    }

    fn candidate_to_packet(&self, candidate: &Candidate, ctx: &StrategyContext<'_>) -> Option<TradePacket> {
        let long = candidate.long.as_ref()?;
        let width = candidate.short.strike - long.strike;
        let credit = lot_credit(candidate);
        let max_loss = width * Decimal::ONE_HUNDRED - credit;
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
    fn pairs_short_put_with_protective_put() {
        let settings = get_default_settings(SettingsPreset::Balanced);
        let chain = chain();
        let signals = signals();
        let regime = regime(Trend::StrongUptrend);
        let ctx = StrategyContext {
            symbol: "XYZ",
            chain: &chain,
            underlying_price: dec!(100),
            signals: &signals,
            regime: &regime,
            settings: &settings,
            today: today(),
        };

        let candidates = PutCreditSpread.find_candidates(&ctx);
        assert_eq!(candidates.len(), 1);
        let packet = PutCreditSpread.candidate_to_packet(&candidates[0], &ctx).unwrap();

        assert_eq!(packet.legs.len(), 2);
        assert_eq!(packet.legs[0].action, LegAction::SellToOpen);
        assert_eq!(packet.legs[0].strike, dec!(95));
        assert_eq!(packet.legs[1].action, LegAction::BuyToOpen);
        assert_eq!(packet.legs[1].strike, dec!(90));
        assert_eq!(packet.spread_width(), Some(dec!(5)));
        assert_eq!(packet.net_credit, dec!(102.50));
        assert_eq!(packet.max_loss, dec!(397.50));
        assert_eq!(packet.breakeven, dec!(93.98));
        assert!(packet.max_loss <= dec!(5) * dec!(100));
    }

    #[test]
    fn missing_long_leg_yields_no_packet() {
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
        let naked = Candidate {
            strategy: StrategyKind::PutCreditSpread,
            short: chain.find(premia_core::OptionRight::Put, dec!(95)).unwrap().clone(),
            long: None,
            dte: 30,
        };
        assert!(PutCreditSpread.candidate_to_packet(&naked, &ctx).is_none());
    }
}
