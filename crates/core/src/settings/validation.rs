use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{TradingSettings, MAX_RISK_PER_TRADE_PCT_CAP, MAX_TOTAL_RISK_PCT_CAP};
use crate::error::ValidationError;
use crate::packet::StrategyKind;

/// Outcome of validating a settings object.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsValidation {
    pub valid: bool,
    pub errors: Vec<String>,
    /// Non-fatal observations (e.g. switches that have no effect).
    pub warnings: Vec<String>,
}

impl SettingsValidation {
    /// Converts into a `Result`, keeping only the errors.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if any rule was violated.
    pub fn into_result(self) -> Result<(), ValidationError> {
        if self.valid {
            Ok(())
        } else {
            Err(ValidationError::new(self.errors))
        }
    }
}

/// Checks every invariant a run depends on. Hard caps apply to every preset.
#[must_use]
pub fn validate_settings(settings: &TradingSettings) -> SettingsValidation {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if settings.account_size <= Decimal::ZERO {
        errors.push("account_size must be positive".to_string());
    }

    let risk = &settings.risk;
    if risk.max_risk_per_trade_pct <= Decimal::ZERO {
        errors.push("max_risk_per_trade_pct must be positive".to_string());
    }
    if risk.max_risk_per_trade_pct > MAX_RISK_PER_TRADE_PCT_CAP {
        errors.push(format!(
            "max_risk_per_trade_pct {} exceeds hard cap {}",
            risk.max_risk_per_trade_pct, MAX_RISK_PER_TRADE_PCT_CAP
        ));
    }
    if risk.max_total_risk_pct <= Decimal::ZERO {
        errors.push("max_total_risk_pct must be positive".to_string());
    }
    if risk.max_total_risk_pct > MAX_TOTAL_RISK_PCT_CAP {
        errors.push(format!(
            "max_total_risk_pct {} exceeds hard cap {}",
            risk.max_total_risk_pct, MAX_TOTAL_RISK_PCT_CAP
        ));
    }
    if risk.max_risk_per_trade_pct > risk.max_total_risk_pct {
        errors.push("max_risk_per_trade_pct cannot exceed max_total_risk_pct".to_string());
    }
    if risk.max_daily_risk_pct <= Decimal::ZERO || risk.max_daily_risk_pct > risk.max_total_risk_pct {
        errors.push("max_daily_risk_pct must be positive and at most max_total_risk_pct".to_string());
    }

    let liquidity = &settings.liquidity;
    if !(liquidity.max_bid_ask_spread_pct > 0.0 && liquidity.max_bid_ask_spread_pct <= 100.0) {
        errors.push("max_bid_ask_spread_pct must be within (0, 100]".to_string());
    }

    if settings.earnings_exclusion_days < 0 {
        errors.push("earnings_exclusion_days cannot be negative".to_string());
    }

    for kind in StrategyKind::all() {
        let s = settings.strategies.get(kind);
        let name = kind.label();
        if s.min_dte < 0 {
            errors.push(format!("{name}: min_dte cannot be negative"));
        }
        if s.min_dte > s.max_dte {
            errors.push(format!("{name}: min_dte {} exceeds max_dte {}", s.min_dte, s.max_dte));
        }
        if !(s.target_delta_min > 0.0 && s.target_delta_max < 1.0) {
            errors.push(format!("{name}: delta window must lie inside (0, 1)"));
        }
        if s.target_delta_min > s.target_delta_max {
            errors.push(format!(
                "{name}: target_delta_min {} exceeds target_delta_max {}",
                s.target_delta_min, s.target_delta_max
            ));
        }
        if kind.is_defined_risk() && !s.spread_width.is_some_and(|w| w > Decimal::ZERO) {
            errors.push(format!("{name}: spread_width must be positive"));
        }
        if s.enabled && s.preferred_trends.is_empty() {
            warnings.push(format!("{name}: enabled with no preferred trends, it will never run"));
        }
    }

    let ranking = &settings.ranking;
    if !(0.0..=100.0).contains(&ranking.min_score) {
        errors.push("min_score must be within [0, 100]".to_string());
    }
    if ranking.top_per_strategy == 0 {
        errors.push("top_per_strategy must be at least 1".to_string());
    }
    if ranking.max_per_symbol == 0 {
        errors.push("max_per_symbol must be at least 1".to_string());
    }

    if settings.universe.symbols.is_empty() {
        errors.push("universe.symbols cannot be empty".to_string());
    }
    if settings.universe.regime_symbols.is_empty() {
        errors.push("universe.regime_symbols cannot be empty".to_string());
    }
    for symbol in settings
        .universe
        .symbols
        .iter()
        .chain(settings.universe.regime_symbols.iter())
    {
        if symbol.is_empty() || !symbol.chars().all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-') {
            errors.push(format!("invalid symbol: {symbol:?}"));
        }
    }

    let exec = &settings.execution;
    if exec.broker_execution_enabled && !exec.trading_enabled {
        warnings.push("broker_execution_enabled has no effect while trading_enabled is off".to_string());
    }

    SettingsValidation {
        valid: errors.is_empty(),
        errors,
        warnings,
    }
}

impl TradingSettings {
    /// Validates and converts to a `Result`.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` listing every violated rule.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_settings(self).into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{get_default_settings, SettingsPreset};
    use rust_decimal_macros::dec;

    #[test]
    fn every_preset_validates() {
        for preset in SettingsPreset::builtin() {
            let result = validate_settings(&get_default_settings(preset));
            assert!(result.valid, "{preset}: {:?}", result.errors);
        }
        assert!(validate_settings(&get_default_settings(SettingsPreset::Custom)).valid);
    }

    #[test]
    fn per_trade_hard_cap_is_enforced() {
        let mut settings = get_default_settings(SettingsPreset::Aggressive);
        settings.risk.max_risk_per_trade_pct = dec!(5.01);
        let result = validate_settings(&settings);
        assert!(!result.valid);
        assert!(result.errors.iter().any(|e| e.contains("hard cap")));
    }

    #[test]
    fn total_hard_cap_is_enforced() {
        let mut settings = get_default_settings(SettingsPreset::Aggressive);
        settings.risk.max_total_risk_pct = dec!(30);
        assert!(settings.validate().is_err());
    }

    #[test]
    fn accepted_settings_never_exceed_hard_caps() {
        for per_trade in [dec!(0.5), dec!(2), dec!(5), dec!(6), dec!(10)] {
            for total in [dec!(5), dec!(20), dec!(25), dec!(26), dec!(50)] {
                let mut settings = get_default_settings(SettingsPreset::Balanced);
                settings.risk.max_risk_per_trade_pct = per_trade;
                settings.risk.max_total_risk_pct = total;
                settings.risk.max_daily_risk_pct = total.min(dec!(5));
                if validate_settings(&settings).valid {
                    assert!(per_trade <= dec!(5));
                    assert!(total <= dec!(25));
                }
            }
        }
    }

    #[test]
    fn inverted_dte_window_is_rejected() {
        let mut settings = get_default_settings(SettingsPreset::Balanced);
        settings.strategies.cash_secured_put.min_dte = 50;
        settings.strategies.cash_secured_put.max_dte = 30;
        let result = validate_settings(&settings);
        assert!(result.errors.iter().any(|e| e.contains("min_dte 50 exceeds max_dte 30")));
    }

    #[test]
    fn inverted_delta_window_is_rejected() {
        let mut settings = get_default_settings(SettingsPreset::Balanced);
        settings.strategies.put_credit_spread.target_delta_min = 0.4;
        settings.strategies.put_credit_spread.target_delta_max = 0.2;
        assert!(!validate_settings(&settings).valid);
    }

    #[test]
    fn spreads_need_width() {
        let mut settings = get_default_settings(SettingsPreset::Balanced);
        settings.strategies.call_credit_spread.spread_width = None;
        assert!(!validate_settings(&settings).valid);
    }

    #[test]
    fn broker_switch_without_master_is_a_warning() {
        let mut settings = get_default_settings(SettingsPreset::Balanced);
        settings.execution.broker_execution_enabled = true;
        let result = validate_settings(&settings);
        assert!(result.valid);
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn empty_universe_is_rejected() {
        let mut settings = get_default_settings(SettingsPreset::Balanced);
        settings.universe.symbols.clear();
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("universe.symbols"));
    }
}
