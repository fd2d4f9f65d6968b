//! Text and JSON rendering shared by commands.

use anyhow::Result;
use premia_core::{MarketRegime, TradePacket};
use serde::Serialize;

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Strikes and rights of a packet, e.g. `95P/90P`.
pub fn strikes(packet: &TradePacket) -> String {
    packet
        .legs
        .iter()
        .map(|leg| format!("{}{}", leg.strike.normalize(), leg.right))
        .collect::<Vec<_>>()
        .join("/")
}

pub fn regime_line(regime: &MarketRegime) -> String {
    format!(
        "{} {} | trend {} | volatility {} ({:.1}) | {:?} | breadth {:?} ({:.0}% above MA)",
        regime.benchmark,
        regime.benchmark_price,
        regime.trend,
        regime.volatility,
        regime.volatility_index,
        regime.risk,
        regime.breadth.assessment,
        regime.breadth.pct_above_ma,
    )
}

pub fn print_packet_table(packets: &[TradePacket]) {
    println!(
        "{:<6} {:<20} {:<10} {:>4} {:<12} {:>9} {:>9} {:>7} {:>6}",
        "SYMBOL", "STRATEGY", "EXPIRY", "DTE", "STRIKES", "CREDIT", "MAX LOSS", "DELTA", "SCORE"
    );
    for p in packets {
        println!(
            "{:<6} {:<20} {:<10} {:>4} {:<12} {:>9} {:>9} {:>7.2} {:>6.1}",
            p.symbol,
            p.strategy.label(),
            p.expiration,
            p.dte,
            strikes(p),
            p.net_credit,
            p.max_loss,
            p.short_delta,
            p.score,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use premia_core::{LegAction, LiquiditySnapshot, OptionLeg, OptionRight, StrategyKind};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    #[test]
    fn strikes_render_per_leg() {
        let expiration = NaiveDate::from_ymd_opt(2024, 12, 20).unwrap();
        let leg = |strike: Decimal, action| OptionLeg {
            action,
            quantity: 1,
            strike,
            right: OptionRight::Put,
            expiration,
            option_symbol: String::new(),
            premium: Decimal::ZERO,
            delta: 0.0,
        };
        let packet = TradePacket {
            id: Default::default(),
            symbol: "SPY".to_string(),
            strategy: StrategyKind::PutCreditSpread,
            legs: vec![leg(dec!(450.00), LegAction::SellToOpen), leg(dec!(445.5), LegAction::BuyToOpen)],
            net_credit: dec!(120),
            max_loss: dec!(330),
            dte: 30,
            expiration,
            short_delta: -0.25,
            breakeven: dec!(448.80),
            underlying_price: dec!(470),
            liquidity: LiquiditySnapshot {
                open_interest: 1000,
                volume: 100,
                bid_ask_spread_pct: 3.0,
            },
            score: 60.0,
            score_breakdown: None,
            created_at: Utc::now(),
        };
        assert_eq!(strikes(&packet), "450P/445.5P");
    }
}
