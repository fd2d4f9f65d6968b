//! Scoring and portfolio-level filtering of trade packets.

use std::collections::HashMap;

use premia_core::{
    MarketRegime, ScoreBreakdown, StrategyKind, TradePacket, TradingSettings, Trend,
    VolatilityLevel,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Weights and saturation points for the composite score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub return_weight: f64,
    pub probability_weight: f64,
    pub liquidity_weight: f64,
    /// Annualized return at which the return term saturates (0.5 = 50%).
    pub return_target: f64,
    /// Open interest at which the depth half of the liquidity term saturates.
    pub open_interest_target: f64,
    pub trend_bonus: f64,
    pub strong_trend_bonus: f64,
    pub counter_trend_penalty: f64,
    pub strong_counter_trend_penalty: f64,
    /// Applied to undefined-risk structures in elevated or high volatility.
    pub volatility_penalty: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            return_weight: 0.4,
            probability_weight: 0.4,
            liquidity_weight: 0.2,
            return_target: 0.5,
            open_interest_target: 1000.0,
            trend_bonus: 5.0,
            strong_trend_bonus: 10.0,
            counter_trend_penalty: 10.0,
            strong_counter_trend_penalty: 15.0,
            volatility_penalty: 10.0,
        }
    }
}

impl ScoringWeights {
    /// Bonus or penalty for how the strategy's direction lines up with the regime.
    #[must_use]
    pub fn regime_adjustment(&self, strategy: StrategyKind, regime: &MarketRegime) -> f64 {
        let aligned = match (regime.trend, strategy.is_bullish()) {
            (Trend::Neutral, _) => 0.0,
            (Trend::StrongUptrend, true) | (Trend::StrongDowntrend, false) => self.strong_trend_bonus,
            (Trend::Uptrend, true) | (Trend::Downtrend, false) => self.trend_bonus,
            (Trend::Downtrend, true) | (Trend::Uptrend, false) => -self.counter_trend_penalty,
            (Trend::StrongDowntrend, true) | (Trend::StrongUptrend, false) => {
                -self.strong_counter_trend_penalty
            }
        };

        let volatility = if strategy.is_defined_risk() {
            0.0
        } else {
            match regime.volatility {
                VolatilityLevel::Elevated | VolatilityLevel::High => -self.volatility_penalty,
                VolatilityLevel::Panic => -2.0 * self.volatility_penalty,
                VolatilityLevel::Low | VolatilityLevel::Normal => 0.0,
            }
        };

        aligned + volatility
    }
}

/// Scores one packet in `[0, 100]`. Returns a new packet; the input is untouched.
#[must_use]
pub fn score_packet(
    packet: &TradePacket,
    regime: &MarketRegime,
    settings: &TradingSettings,
    weights: &ScoringWeights,
) -> TradePacket {
    let annualized_return = if packet.dte > 0 {
        packet.return_on_risk() * 365.0 / packet.dte as f64
    } else {
        0.0
    };
    let return_score = if weights.return_target > 0.0 {
        (annualized_return / weights.return_target).clamp(0.0, 1.0) * 100.0
    } else {
        0.0
    };

    let probability_of_profit = ((1.0 - packet.short_delta.abs()) * 100.0).clamp(0.0, 100.0);

    let depth = if weights.open_interest_target > 0.0 {
        (packet.liquidity.open_interest as f64 / weights.open_interest_target).min(1.0)
    } else {
        1.0
    };
    let max_spread = settings.liquidity.max_bid_ask_spread_pct;
    let tightness = if max_spread > 0.0 {
        1.0 - (packet.liquidity.bid_ask_spread_pct / max_spread).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let liquidity_score = depth * 50.0 + tightness * 50.0;

    let regime_adjustment = weights.regime_adjustment(packet.strategy, regime);

    let score = (weights.return_weight * return_score
        + weights.probability_weight * probability_of_profit
        + weights.liquidity_weight * liquidity_score
        + regime_adjustment)
        .clamp(0.0, 100.0);

    packet.with_score(
        score,
        ScoreBreakdown {
            annualized_return,
            return_score,
            probability_of_profit,
            liquidity_score,
            regime_adjustment,
        },
    )
}

/// Ranked packets plus how many each filter stage removed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RankingOutcome {
    pub ranked: Vec<TradePacket>,
    /// Packets that went into ranking.
    pub scored: usize,
    pub dropped_min_score: usize,
    pub dropped_strategy_cap: usize,
    pub dropped_symbol_cap: usize,
    pub dropped_risk_budget: usize,
    /// Sum of `max_loss` over `ranked`.
    pub committed_risk: Decimal,
}

#[derive(Debug, Clone, Default)]
pub struct TradeRanker {
    weights: ScoringWeights,
}

impl TradeRanker {
    #[must_use]
    pub fn new(weights: ScoringWeights) -> Self {
        Self { weights }
    }

    #[must_use]
    pub fn weights(&self) -> &ScoringWeights {
        &self.weights
    }

    /// Scores, then filters in order: min score, sort by score, per-strategy
    /// cap, per-symbol cap, greedy total-risk budget.
    #[must_use]
    pub fn rank(
        &self,
        packets: &[TradePacket],
        regime: &MarketRegime,
        settings: &TradingSettings,
    ) -> RankingOutcome {
        let ranking = &settings.ranking;
        let mut outcome = RankingOutcome {
            scored: packets.len(),
            ..RankingOutcome::default()
        };

        let mut scored: Vec<TradePacket> = packets
            .iter()
            .map(|p| score_packet(p, regime, settings, &self.weights))
            .filter(|p| {
                let keep = p.score >= ranking.min_score;
                if !keep {
                    outcome.dropped_min_score += 1;
                }
                keep
            })
            .collect();

        // Ties broken by lower max loss, then symbol, for stable output.
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.max_loss.cmp(&b.max_loss))
                .then_with(|| a.symbol.cmp(&b.symbol))
        });

        let mut per_strategy: HashMap<StrategyKind, usize> = HashMap::new();
        let mut survivors = Vec::with_capacity(scored.len());
        for packet in scored {
            let count = per_strategy.entry(packet.strategy).or_default();
            if *count >= ranking.top_per_strategy {
                outcome.dropped_strategy_cap += 1;
                continue;
            }
            *count += 1;
            survivors.push(packet);
        }

        let mut per_symbol: HashMap<String, usize> = HashMap::new();
        let mut capped = Vec::with_capacity(survivors.len());
        for packet in survivors {
            let count = per_symbol.entry(packet.symbol.clone()).or_default();
            if *count >= ranking.max_per_symbol {
                outcome.dropped_symbol_cap += 1;
                continue;
            }
            *count += 1;
            capped.push(packet);
        }

        let budget = settings.total_risk_budget();
        for packet in capped {
            if outcome.committed_risk + packet.max_loss > budget {
                outcome.dropped_risk_budget += 1;
                continue;
            }
            outcome.committed_risk += packet.max_loss;
            outcome.ranked.push(packet);
        }

        tracing::debug!(
            scored = outcome.scored,
            ranked = outcome.ranked.len(),
            below_min_score = outcome.dropped_min_score,
            strategy_cap = outcome.dropped_strategy_cap,
            symbol_cap = outcome.dropped_symbol_cap,
            risk_budget = outcome.dropped_risk_budget,
            committed_risk = %outcome.committed_risk,
            "ranking complete"
        );

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::test_support::regime;
    use chrono::{NaiveDate, Utc};
    use premia_core::{get_default_settings, LiquiditySnapshot, SettingsPreset};
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn packet(symbol: &str, strategy: StrategyKind, credit: Decimal, max_loss: Decimal, delta: f64) -> TradePacket {
        TradePacket {
            id: Uuid::new_v4(),
            symbol: symbol.to_string(),
            strategy,
            legs: Vec::new(),
            net_credit: credit,
            max_loss,
            dte: 30,
            expiration: NaiveDate::from_ymd_opt(2024, 12, 20).unwrap(),
            short_delta: delta,
            breakeven: dec!(95),
            underlying_price: dec!(100),
            liquidity: LiquiditySnapshot {
                open_interest: 2000,
                volume: 500,
                bid_ask_spread_pct: 5.0,
            },
            score: 0.0,
            score_breakdown: None,
            created_at: Utc::now(),
        }
    }

    fn loose_settings() -> TradingSettings {
        let mut settings = get_default_settings(SettingsPreset::Balanced);
        settings.ranking.min_score = 0.0;
        settings.ranking.top_per_strategy = 100;
        settings.ranking.max_per_symbol = 100;
        settings
    }

    #[test]
    fn score_stays_in_bounds() {
        let settings = loose_settings();
        let weights = ScoringWeights::default();
        for trend in Trend::all() {
            for p in [
                packet("A", StrategyKind::PutCreditSpread, dec!(400), dec!(100), -0.05),
                packet("A", StrategyKind::CoveredCall, dec!(1), dec!(10000), 0.95),
            ] {
                let scored = score_packet(&p, &regime(trend), &settings, &weights);
                assert!((0.0..=100.0).contains(&scored.score));
                assert!(scored.score_breakdown.is_some());
                assert_eq!(p.score, 0.0);
            }
        }
    }

    #[test]
    fn regime_alignment_favors_matching_direction() {
        let weights = ScoringWeights::default();
        let up = regime(Trend::StrongUptrend);
        let down = regime(Trend::StrongDowntrend);
        assert!(weights.regime_adjustment(StrategyKind::PutCreditSpread, &up) > 0.0);
        assert!(weights.regime_adjustment(StrategyKind::PutCreditSpread, &down) < 0.0);
        assert!(weights.regime_adjustment(StrategyKind::CallCreditSpread, &down) > 0.0);
        assert!(weights.regime_adjustment(StrategyKind::CallCreditSpread, &up) < 0.0);
    }

    #[test]
    fn elevated_volatility_penalizes_undefined_risk_only() {
        let weights = ScoringWeights::default();
        let mut r = regime(Trend::Neutral);
        r.volatility = VolatilityLevel::High;
        assert_eq!(weights.regime_adjustment(StrategyKind::CashSecuredPut, &r), -10.0);
        assert_eq!(weights.regime_adjustment(StrategyKind::PutCreditSpread, &r), 0.0);
        r.volatility = VolatilityLevel::Panic;
        assert_eq!(weights.regime_adjustment(StrategyKind::CoveredCall, &r), -20.0);
    }

    #[test]
    fn min_score_drops_low_scores() {
        let mut settings = loose_settings();
        settings.ranking.min_score = 99.0;
        let packets = vec![packet("A", StrategyKind::PutCreditSpread, dec!(100), dec!(400), -0.25)];
        let outcome = TradeRanker::default().rank(&packets, &regime(Trend::Neutral), &settings);
        assert!(outcome.ranked.is_empty());
        assert_eq!(outcome.dropped_min_score, 1);
    }

    #[test]
    fn caps_per_strategy_and_symbol() {
        let mut settings = loose_settings();
        settings.ranking.top_per_strategy = 2;
        settings.ranking.max_per_symbol = 1;

        let mut packets = Vec::new();
        for symbol in ["A", "B", "C"] {
            for strategy in [StrategyKind::PutCreditSpread, StrategyKind::CallCreditSpread] {
                packets.push(packet(symbol, strategy, dec!(100), dec!(400), -0.25));
                packets.push(packet(symbol, strategy, dec!(90), dec!(410), -0.25));
            }
        }

        let outcome = TradeRanker::default().rank(&packets, &regime(Trend::Neutral), &settings);

        let mut by_strategy: HashMap<StrategyKind, usize> = HashMap::new();
        let mut by_symbol: HashMap<String, usize> = HashMap::new();
        for p in &outcome.ranked {
            *by_strategy.entry(p.strategy).or_default() += 1;
            *by_symbol.entry(p.symbol.clone()).or_default() += 1;
        }
        assert!(by_strategy.values().all(|n| *n <= 2));
        assert!(by_symbol.values().all(|n| *n <= 1));
        assert_eq!(outcome.scored, 12);
        assert_eq!(outcome.dropped_strategy_cap, 8);
        assert_eq!(
            outcome.ranked.len()
                + outcome.dropped_min_score
                + outcome.dropped_strategy_cap
                + outcome.dropped_symbol_cap
                + outcome.dropped_risk_budget,
            12
        );
    }

    #[test]
    fn output_is_sorted_by_score() {
        let settings = loose_settings();
        let packets = vec![
            packet("A", StrategyKind::PutCreditSpread, dec!(50), dec!(450), -0.30),
            packet("B", StrategyKind::PutCreditSpread, dec!(150), dec!(350), -0.15),
            packet("C", StrategyKind::PutCreditSpread, dec!(100), dec!(400), -0.22),
        ];
        let outcome = TradeRanker::default().rank(&packets, &regime(Trend::Neutral), &settings);
        let scores: Vec<f64> = outcome.ranked.iter().map(|p| p.score).collect();
        assert!(scores.windows(2).all(|w| w[0] >= w[1]));
        assert_eq!(outcome.ranked[0].symbol, "B");
    }

    #[test]
    fn risk_budget_is_greedy_and_skips_oversized() {
        let mut settings = loose_settings();
        // 20% of 10,000 = 2,000 budget
        settings.account_size = dec!(10000);
        let packets = vec![
            packet("A", StrategyKind::PutCreditSpread, dec!(200), dec!(1200), -0.10),
            packet("B", StrategyKind::PutCreditSpread, dec!(100), dec!(1000), -0.20),
            packet("C", StrategyKind::PutCreditSpread, dec!(40), dec!(700), -0.25),
        ];
        let outcome = TradeRanker::default().rank(&packets, &regime(Trend::Neutral), &settings);
        let symbols: Vec<&str> = outcome.ranked.iter().map(|p| p.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["A", "C"]);
        assert_eq!(outcome.dropped_risk_budget, 1);
        assert_eq!(outcome.committed_risk, dec!(1900));
        assert!(outcome.committed_risk <= settings.total_risk_budget());
    }
}
