//! Plain-language summary of a market regime.

use chrono::{DateTime, Utc};
use premia_core::{BreadthAssessment, MarketRegime, RiskMode, StrategyKind, Trend, VolatilityLevel};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketNarrative {
    pub title: String,
    pub summary: String,
    /// Best fits for the regime, most preferred first.
    pub preferred_strategies: Vec<StrategyKind>,
    pub cautions: Vec<String>,
    pub workspace_id: Option<String>,
    pub generated_at: DateTime<Utc>,
}

/// Builds the narrative for `regime`. Deterministic apart from `generated_at`.
#[must_use]
pub fn generate_narrative(regime: &MarketRegime, workspace_id: Option<&str>) -> MarketNarrative {
    MarketNarrative {
        title: title(regime),
        summary: summary(regime),
        preferred_strategies: preferred_strategies(regime),
        cautions: cautions(regime),
        workspace_id: workspace_id.map(str::to_string),
        generated_at: Utc::now(),
    }
}

fn title(regime: &MarketRegime) -> String {
    let tone = match regime.trend {
        Trend::StrongUptrend => "Strong uptrend",
        Trend::Uptrend => "Uptrend",
        Trend::Neutral => "Range-bound market",
        Trend::Downtrend => "Downtrend",
        Trend::StrongDowntrend => "Strong downtrend",
    };
    let risk = match regime.risk {
        RiskMode::RiskOn => "risk-on",
        RiskMode::RiskOff => "risk-off",
    };
    format!("{tone}, {} volatility, {risk}", regime.volatility)
}

fn summary(regime: &MarketRegime) -> String {
    let breadth = match regime.breadth.assessment {
        BreadthAssessment::Broad => "broad participation",
        BreadthAssessment::Mixed => "mixed participation",
        BreadthAssessment::Narrow => "narrow participation",
    };
    format!(
        "{} is in a {} at {}. The volatility proxy reads {:.1} ({} volatility). \
         {:.0}% of the basket trades above its moving average ({breadth}, {} symbols).",
        regime.benchmark,
        regime.trend,
        regime.benchmark_price.round_dp(2),
        regime.volatility_index,
        regime.volatility,
        regime.breadth.pct_above_ma,
        regime.breadth.sample_size,
    )
}

fn preferred_strategies(regime: &MarketRegime) -> Vec<StrategyKind> {
    let mut preferred = match regime.trend {
        Trend::StrongUptrend | Trend::Uptrend => vec![
            StrategyKind::PutCreditSpread,
            StrategyKind::CashSecuredPut,
            StrategyKind::CoveredCall,
        ],
        Trend::Neutral => vec![
            StrategyKind::CoveredCall,
            StrategyKind::CashSecuredPut,
            StrategyKind::PutCreditSpread,
            StrategyKind::CallCreditSpread,
        ],
        Trend::Downtrend | Trend::StrongDowntrend => vec![StrategyKind::CallCreditSpread],
    };

    // Panic keeps only structures with a capped loss.
    if regime.volatility == VolatilityLevel::Panic {
        preferred.retain(|k| k.is_defined_risk());
    }
    preferred
}

fn cautions(regime: &MarketRegime) -> Vec<String> {
    let mut cautions = Vec::new();
    match regime.volatility {
        VolatilityLevel::Elevated => {
            cautions.push("Elevated volatility: reduce position sizes".to_string());
        }
        VolatilityLevel::High => {
            cautions.push("High volatility: reduce position sizes and favor defined-risk spreads".to_string());
        }
        VolatilityLevel::Panic => {
            cautions.push("Panic volatility: reduce position sizes, defined-risk only".to_string());
        }
        VolatilityLevel::Low => {
            cautions.push("Low volatility: premiums are thin".to_string());
        }
        VolatilityLevel::Normal => {}
    }
    if regime.breadth.assessment == BreadthAssessment::Narrow {
        cautions.push("Narrow breadth: few symbols are carrying the market".to_string());
    }
    if regime.risk == RiskMode::RiskOff {
        cautions.push("Risk-off conditions: be selective with new short premium".to_string());
    }
    cautions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::test_support::regime;

    #[test]
    fn calm_uptrend_has_no_cautions() {
        let narrative = generate_narrative(&regime(Trend::Uptrend), Some("ws-1"));
        assert!(narrative.cautions.is_empty());
        assert_eq!(narrative.workspace_id.as_deref(), Some("ws-1"));
        assert_eq!(narrative.preferred_strategies[0], StrategyKind::PutCreditSpread);
        assert!(narrative.title.starts_with("Uptrend"));
        assert!(narrative.summary.contains("SPY"));
    }

    #[test]
    fn elevated_volatility_says_reduce_sizes() {
        let mut r = regime(Trend::Neutral);
        r.volatility = VolatilityLevel::Elevated;
        let narrative = generate_narrative(&r, None);
        assert!(narrative.cautions.iter().any(|c| c.contains("reduce position sizes")));
    }

    #[test]
    fn narrow_breadth_and_risk_off_are_flagged() {
        let mut r = regime(Trend::Downtrend);
        r.breadth.assessment = BreadthAssessment::Narrow;
        r.risk = RiskMode::RiskOff;
        let narrative = generate_narrative(&r, None);
        assert_eq!(narrative.cautions.len(), 2);
        assert_eq!(narrative.preferred_strategies, vec![StrategyKind::CallCreditSpread]);
    }

    #[test]
    fn panic_keeps_defined_risk_only() {
        let mut r = regime(Trend::Uptrend);
        r.volatility = VolatilityLevel::Panic;
        let narrative = generate_narrative(&r, None);
        assert_eq!(narrative.preferred_strategies, vec![StrategyKind::PutCreditSpread]);
    }

    #[test]
    fn same_regime_same_text() {
        let r = regime(Trend::StrongDowntrend);
        let a = generate_narrative(&r, None);
        let b = generate_narrative(&r, None);
        assert_eq!(a.title, b.title);
        assert_eq!(a.summary, b.summary);
        assert_eq!(a.cautions, b.cautions);
    }
}
