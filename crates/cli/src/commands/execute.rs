//! `premia execute`: recompute, then propose and approve the top packets.
//!
//! Every approval goes through the execution manager's gates, so with
//! default settings (trading disabled) nothing is routed.

use anyhow::Result;
use clap::Args;
use premia_broker::{create_broker, BrokerExecutionManager, ExecutionRoute, ProposalStatus};
use premia_core::AppConfig;
use premia_engine::Engine;

use super::output::{print_json, strikes};
use super::recompute::RunArgs;

#[derive(Args, Debug)]
pub struct ExecuteArgs {
    #[command(flatten)]
    pub run: RunArgs,

    /// Ranked packets to route
    #[arg(long, default_value = "3")]
    pub top: usize,

    /// Lots per packet
    #[arg(long, default_value = "1")]
    pub quantity: u32,

    /// Turn the trading master switch on for this run
    #[arg(long)]
    pub enable_trading: bool,
}

pub async fn run(engine: &Engine, config: &AppConfig, args: ExecuteArgs, json: bool) -> Result<()> {
    let mut settings = args.run.settings.load()?;
    if args.enable_trading {
        settings.execution.trading_enabled = true;
    }

    let result = engine.recompute(&settings, args.run.options()?).await?;
    let manager = BrokerExecutionManager::new(create_broker(&config.broker)?, config.broker.paper_starting_cash);

    tracing::info!(
        ranked = result.ranked.len(),
        top = args.top,
        trading_enabled = settings.execution.trading_enabled,
        "routing ranked packets"
    );

    for packet in result.ranked.iter().take(args.top) {
        let proposal = manager.propose(packet, args.quantity);
        if let Err(e) = manager.approve(proposal.id, &settings).await {
            tracing::warn!(proposal_id = %proposal.id, symbol = %packet.symbol, error = %e, "proposal not executed");
        }
    }

    let proposals = manager.proposals();
    if json {
        return print_json(&proposals);
    }

    if proposals.is_empty() {
        println!("no ranked packets to route");
        return Ok(());
    }
    for p in &proposals {
        let detail = match (&p.report, &p.reason) {
            (Some(report), _) => report.message.clone(),
            (None, Some(reason)) => reason.clone(),
            (None, None) => String::new(),
        };
        println!(
            "{:<6} {:<20} {:<12} x{:<3} {:<16} {}",
            p.packet.symbol,
            p.packet.strategy.label(),
            strikes(&p.packet),
            p.request.quantity,
            format!("{:?}", p.status),
            detail
        );
    }

    let routed_to_paper = proposals.iter().any(|p| {
        p.status == ProposalStatus::Executed && p.report.as_ref().is_some_and(|r| r.route == ExecutionRoute::Paper)
    });
    if routed_to_paper {
        let account = manager.account_info(ExecutionRoute::Paper).await?;
        println!();
        println!(
            "paper account: cash {} | buying power {} | committed today {}",
            account.cash,
            account.buying_power,
            manager.daily_committed_risk()
        );
    }
    Ok(())
}
