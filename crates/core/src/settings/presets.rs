use rust_decimal_macros::dec;

use super::{
    ExecutionSwitches, LiquidityFilters, RankingSettings, RiskLimits, SettingsPreset,
    StrategySet, StrategySettings, TradingSettings, UniverseSettings,
};
use crate::regime::Trend;

const DEFAULT_SYMBOLS: [&str; 8] = ["SPY", "QQQ", "IWM", "AAPL", "MSFT", "NVDA", "AMZN", "GOOGL"];
const DEFAULT_REGIME_SYMBOLS: [&str; 4] = ["SPY", "QQQ", "IWM", "DIA"];

fn bullish_trends() -> Vec<Trend> {
    vec![Trend::Neutral, Trend::Uptrend, Trend::StrongUptrend]
}

fn bearish_trends() -> Vec<Trend> {
    vec![Trend::StrongDowntrend, Trend::Downtrend, Trend::Neutral]
}

fn universe() -> UniverseSettings {
    UniverseSettings {
        symbols: DEFAULT_SYMBOLS.iter().map(|s| (*s).to_string()).collect(),
        regime_symbols: DEFAULT_REGIME_SYMBOLS.iter().map(|s| (*s).to_string()).collect(),
    }
}

pub(super) fn for_preset(preset: SettingsPreset) -> TradingSettings {
    match preset {
        SettingsPreset::Conservative => conservative(),
        SettingsPreset::Balanced => balanced(),
        SettingsPreset::Aggressive => aggressive(),
        SettingsPreset::Custom => TradingSettings {
            preset: SettingsPreset::Custom,
            ..balanced()
        },
    }
}

fn conservative() -> TradingSettings {
    let window = |delta_min: f64, delta_max: f64, width: Option<rust_decimal::Decimal>, trends| {
        StrategySettings {
            enabled: true,
            min_dte: 30,
            max_dte: 45,
            target_delta_min: delta_min,
            target_delta_max: delta_max,
            spread_width: width,
            preferred_trends: trends,
        }
    };

    TradingSettings {
        preset: SettingsPreset::Conservative,
        account_size: dec!(100000),
        risk: RiskLimits {
            max_risk_per_trade_pct: dec!(2),
            max_total_risk_pct: dec!(10),
            max_daily_risk_pct: dec!(4),
        },
        liquidity: LiquidityFilters {
            min_underlying_volume: 2_000_000,
            min_open_interest: 500,
            min_option_volume: 50,
            max_bid_ask_spread_pct: 10.0,
        },
        earnings_exclusion_days: 14,
        strategies: StrategySet {
            cash_secured_put: window(0.15, 0.25, None, vec![Trend::Uptrend, Trend::StrongUptrend]),
            covered_call: window(0.15, 0.25, None, bullish_trends()),
            put_credit_spread: window(0.15, 0.25, Some(dec!(5)), vec![Trend::Uptrend, Trend::StrongUptrend]),
            call_credit_spread: window(0.15, 0.25, Some(dec!(5)), vec![Trend::Downtrend, Trend::StrongDowntrend]),
        },
        ranking: RankingSettings {
            min_score: 60.0,
            top_per_strategy: 3,
            max_per_symbol: 1,
        },
        universe: universe(),
        execution: ExecutionSwitches::default(),
    }
}

fn balanced() -> TradingSettings {
    let window = |delta_min: f64, delta_max: f64, width: Option<rust_decimal::Decimal>, trends| {
        StrategySettings {
            enabled: true,
            min_dte: 21,
            max_dte: 45,
            target_delta_min: delta_min,
            target_delta_max: delta_max,
            spread_width: width,
            preferred_trends: trends,
        }
    };

    TradingSettings {
        preset: SettingsPreset::Balanced,
        account_size: dec!(100000),
        risk: RiskLimits {
            max_risk_per_trade_pct: dec!(3),
            max_total_risk_pct: dec!(20),
            max_daily_risk_pct: dec!(8),
        },
        liquidity: LiquidityFilters {
            min_underlying_volume: 1_000_000,
            min_open_interest: 100,
            min_option_volume: 10,
            max_bid_ask_spread_pct: 15.0,
        },
        earnings_exclusion_days: 7,
        strategies: StrategySet {
            cash_secured_put: window(0.20, 0.30, None, bullish_trends()),
            covered_call: window(0.20, 0.35, None, bullish_trends()),
            put_credit_spread: window(0.20, 0.30, Some(dec!(5)), bullish_trends()),
            call_credit_spread: window(0.20, 0.30, Some(dec!(5)), bearish_trends()),
        },
        ranking: RankingSettings {
            min_score: 45.0,
            top_per_strategy: 5,
            max_per_symbol: 2,
        },
        universe: universe(),
        execution: ExecutionSwitches::default(),
    }
}

fn aggressive() -> TradingSettings {
    let window = |delta_min: f64, delta_max: f64, width: Option<rust_decimal::Decimal>, trends| {
        StrategySettings {
            enabled: true,
            min_dte: 14,
            max_dte: 45,
            target_delta_min: delta_min,
            target_delta_max: delta_max,
            spread_width: width,
            preferred_trends: trends,
        }
    };

    TradingSettings {
        preset: SettingsPreset::Aggressive,
        account_size: dec!(100000),
        risk: RiskLimits {
            max_risk_per_trade_pct: dec!(5),
            max_total_risk_pct: dec!(25),
            max_daily_risk_pct: dec!(15),
        },
        liquidity: LiquidityFilters {
            min_underlying_volume: 500_000,
            min_open_interest: 50,
            min_option_volume: 1,
            max_bid_ask_spread_pct: 25.0,
        },
        earnings_exclusion_days: 3,
        strategies: StrategySet {
            cash_secured_put: window(0.25, 0.40, None, Trend::all()),
            covered_call: window(0.25, 0.40, None, Trend::all()),
            put_credit_spread: window(0.25, 0.40, Some(dec!(10)), bullish_trends()),
            call_credit_spread: window(0.25, 0.40, Some(dec!(10)), bearish_trends()),
        },
        ranking: RankingSettings {
            min_score: 35.0,
            top_per_strategy: 10,
            max_per_symbol: 3,
        },
        universe: universe(),
        execution: ExecutionSwitches::default(),
    }
}
