//! Recompute against the simulated provider, then route the ranked packets
//! through the execution manager the way `premia execute` does.

use std::sync::Arc;

use premia_broker::{
    BrokerExecutionManager, ExecutionRoute, PaperBrokerProvider, ProposalStatus,
};
use premia_core::{get_default_settings, SettingsPreset, StrategyKind, TradingSettings, Trend};
use premia_engine::{Engine, RecomputeOptions};
use premia_market_data::SimulatedProvider;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn options() -> RecomputeOptions {
    RecomputeOptions {
        symbols: Some(vec!["AAPL".to_string(), "SPY".to_string(), "QQQ".to_string()]),
        max_expirations: Some(2),
        ..RecomputeOptions::default()
    }
}

fn paper_settings() -> TradingSettings {
    let mut settings = get_default_settings(SettingsPreset::Balanced);
    for kind in StrategyKind::all() {
        settings.strategies.get_mut(kind).preferred_trends = Trend::all();
    }
    settings.execution.trading_enabled = true;
    settings
}

#[tokio::test]
async fn ranked_packets_route_to_paper() {
    let engine = Engine::new(Arc::new(SimulatedProvider::new()));
    let settings = paper_settings();
    let result = engine.recompute(&settings, options()).await.unwrap();

    let manager = BrokerExecutionManager::new(Arc::new(PaperBrokerProvider::new(dec!(100000))), dec!(100000));
    for packet in result.ranked.iter().take(5) {
        let proposal = manager.propose(packet, 1);
        let _ = manager.approve(proposal.id, &settings).await;
    }

    let mut executed_risk = Decimal::ZERO;
    for proposal in manager.proposals() {
        match proposal.status {
            ProposalStatus::Executed => {
                let report = proposal.report.unwrap();
                assert_eq!(report.route, ExecutionRoute::Paper);
                assert!(report.order.is_some());
                executed_risk += proposal.request.total_max_loss();
            }
            ProposalStatus::Rejected => {
                // Undefined-risk packets can exceed the per-trade cap.
                let reason = proposal.reason.unwrap();
                assert!(reason.contains("risk limit"), "{reason}");
            }
            other => panic!("unexpected status {other:?}"),
        }
    }
    assert_eq!(manager.daily_committed_risk(), executed_risk);
    assert!(executed_risk <= settings.daily_risk_budget());
}

#[tokio::test]
async fn default_settings_route_nothing() {
    let engine = Engine::new(Arc::new(SimulatedProvider::new()));
    let settings = get_default_settings(SettingsPreset::Balanced);
    let result = engine.recompute(&settings, options()).await.unwrap();

    let manager = BrokerExecutionManager::new(Arc::new(PaperBrokerProvider::new(dec!(100000))), dec!(100000));
    for packet in &result.ranked {
        let proposal = manager.propose(packet, 1);
        assert!(manager.approve(proposal.id, &settings).await.is_err());
    }

    assert!(manager
        .proposals()
        .iter()
        .all(|p| p.status == ProposalStatus::Rejected));
    assert_eq!(manager.daily_committed_risk(), Decimal::ZERO);
    let account = manager.account_info(ExecutionRoute::Paper).await.unwrap();
    assert_eq!(account.cash, dec!(100000));
}
