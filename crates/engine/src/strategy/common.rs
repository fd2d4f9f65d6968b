//! Filters and packet assembly shared by every strategy.

use chrono::Utc;
use premia_core::settings::LiquidityFilters;
use premia_core::{
    LegAction, LiquiditySnapshot, OptionContract, OptionLeg, OptionRight, StrategyKind,
    TradePacket,
};
use rust_decimal::Decimal;
use uuid::Uuid;

use super::{Candidate, StrategyContext};

/// Contract passes open interest, volume, spread and bid floors.
#[must_use]
pub fn is_liquid(contract: &OptionContract, filters: &LiquidityFilters) -> bool {
    contract.bid > Decimal::ZERO
        && contract.open_interest >= filters.min_open_interest
        && contract.volume >= filters.min_option_volume
        && contract.spread_pct() <= filters.max_bid_ask_spread_pct
}

/// Puts below spot, calls above.
#[must_use]
pub fn is_out_of_the_money(contract: &OptionContract, underlying_price: Decimal) -> bool {
    match contract.right {
        OptionRight::Put => contract.strike < underlying_price,
        OptionRight::Call => contract.strike > underlying_price,
    }
}

/// Symbol-level gates: earnings exclusion and underlying volume floor.
pub(super) fn symbol_is_tradable(ctx: &StrategyContext<'_>) -> bool {
    !ctx.signals.earnings_excluded
        && ctx.signals.average_volume >= ctx.settings.liquidity.min_underlying_volume
}

/// Short-leg candidates for `kind`: right type, OTM, delta and DTE in the
/// strategy window, liquid. Ordered by strike ascending.
pub(super) fn short_legs<'a>(ctx: &StrategyContext<'a>, kind: StrategyKind) -> Vec<&'a OptionContract> {
    if !symbol_is_tradable(ctx) {
        return Vec::new();
    }
    let settings = ctx.strategy_settings(kind);
    if !settings.dte_in_range(ctx.dte()) {
        return Vec::new();
    }
    ctx.chain
        .by_right(kind.short_right())
        .into_iter()
        .filter(|c| is_out_of_the_money(c, ctx.underlying_price))
        .filter(|c| settings.delta_in_range(c.abs_delta()))
        .filter(|c| is_liquid(c, &ctx.settings.liquidity))
        .collect()
}

/// Pairs each short leg with the long leg exactly `spread_width` further
/// out of the money. Pairs without a liquid long leg or a positive credit
/// are dropped.
pub(super) fn credit_spreads(ctx: &StrategyContext<'_>, kind: StrategyKind) -> Vec<Candidate> {
    let Some(width) = ctx.strategy_settings(kind).spread_width else {
        return Vec::new();
    };
    if width <= Decimal::ZERO {
        return Vec::new();
    }

    short_legs(ctx, kind)
        .into_iter()
        .filter_map(|short| {
            let long_strike = match short.right {
                OptionRight::Put => short.strike - width,
                OptionRight::Call => short.strike + width,
            };
            let long = ctx.chain.find(short.right, long_strike)?;
            if !is_liquid(long, &ctx.settings.liquidity) {
                return None;
            }
            let candidate = Candidate {
                strategy: kind,
                short: short.clone(),
                long: Some(long.clone()),
                dte: ctx.dte(),
            };
            (candidate.credit_per_share() > Decimal::ZERO).then_some(candidate)
        })
        .collect()
}

/// One-lot leg at the contract's mid.
pub(super) fn leg(action: LegAction, contract: &OptionContract) -> OptionLeg {
    OptionLeg {
        action,
        quantity: 1,
        strike: contract.strike,
        right: contract.right,
        expiration: contract.expiration,
        option_symbol: contract.symbol.clone(),
        premium: contract.mid(),
        delta: contract.greeks.delta,
    }
}

/// Dollar credit for one lot.
pub(super) fn lot_credit(candidate: &Candidate) -> Decimal {
    (candidate.credit_per_share() * Decimal::ONE_HUNDRED).round_dp(2)
}

/// Assembles a packet; rejects non-positive credit or max loss.
pub(super) fn assemble(
    candidate: &Candidate,
    ctx: &StrategyContext<'_>,
    net_credit: Decimal,
    max_loss: Decimal,
    breakeven: Decimal,
) -> Option<TradePacket> {
    if net_credit <= Decimal::ZERO || max_loss <= Decimal::ZERO {
        return None;
    }

    let mut legs = vec![leg(LegAction::SellToOpen, &candidate.short)];
    if let Some(long) = &candidate.long {
        legs.push(leg(LegAction::BuyToOpen, long));
    }

    Some(TradePacket {
        id: Uuid::new_v4(),
        symbol: ctx.symbol.to_string(),
        strategy: candidate.strategy,
        legs,
        net_credit,
        max_loss,
        dte: candidate.dte,
        expiration: candidate.short.expiration,
        short_delta: candidate.short.greeks.delta,
        breakeven: breakeven.round_dp(2),
        underlying_price: ctx.underlying_price,
        liquidity: LiquiditySnapshot {
            open_interest: candidate.short.open_interest,
            volume: candidate.short.volume,
            bid_ask_spread_pct: candidate.short.spread_pct(),
        },
        score: 0.0,
        score_breakdown: None,
        created_at: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use premia_core::{get_default_settings, SettingsPreset, Trend};
    use rust_decimal_macros::dec;

    #[test]
    fn liquidity_floors() {
        let filters = get_default_settings(SettingsPreset::Balanced).liquidity;
        let good = contract(OptionRight::Put, dec!(95), dec!(1.95), dec!(2.05), -0.27);
        assert!(is_liquid(&good, &filters));

        let mut no_bid = good.clone();
        no_bid.bid = Decimal::ZERO;
        assert!(!is_liquid(&no_bid, &filters));

        let mut thin = good.clone();
        thin.open_interest = 50;
        assert!(!is_liquid(&thin, &filters));

        let wide = contract(OptionRight::Put, dec!(95), dec!(1.00), dec!(2.00), -0.27);
        assert!(!is_liquid(&wide, &filters));
    }

    #[test]
    fn moneyness_by_right() {
        let put = contract(OptionRight::Put, dec!(95), dec!(1), dec!(1.1), -0.3);
        let call = contract(OptionRight::Call, dec!(95), dec!(6), dec!(6.2), 0.7);
        assert!(is_out_of_the_money(&put, dec!(100)));
        assert!(!is_out_of_the_money(&call, dec!(100)));
    }

    #[test]
    fn earnings_exclusion_blocks_every_short_leg() {
        let settings = get_default_settings(SettingsPreset::Balanced);
        let chain = chain();
        let mut signals = signals();
        signals.earnings_excluded = true;
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
        assert!(short_legs(&ctx, StrategyKind::CashSecuredPut).is_empty());
    }

    #[test]
    fn thin_underlying_blocks_candidates() {
        let settings = get_default_settings(SettingsPreset::Balanced);
        let chain = chain();
        let mut signals = signals();
        signals.average_volume = 10_000;
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
        assert!(credit_spreads(&ctx, StrategyKind::PutCreditSpread).is_empty());
    }

    #[test]
    fn spread_needs_exact_long_strike() {
        let mut settings = get_default_settings(SettingsPreset::Balanced);
        settings.strategies.put_credit_spread.spread_width = Some(dec!(7));
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
        assert!(credit_spreads(&ctx, StrategyKind::PutCreditSpread).is_empty());
    }
}
