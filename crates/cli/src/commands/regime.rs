//! `premia regime` and `premia narrative`.

use anyhow::Result;
use clap::Args;
use premia_core::TradingSettings;
use premia_engine::Engine;

use super::output::{print_json, regime_line};

#[derive(Args, Debug)]
pub struct RegimeArgs {
    /// Comma-separated regime basket; defaults to the preset basket
    #[arg(long, value_delimiter = ',')]
    pub symbols: Vec<String>,
}

#[derive(Args, Debug)]
pub struct NarrativeArgs {
    #[command(flatten)]
    pub regime: RegimeArgs,

    /// Workspace id echoed into the narrative
    #[arg(long)]
    pub workspace: Option<String>,
}

fn basket(symbols: Vec<String>) -> Vec<String> {
    if symbols.is_empty() {
        TradingSettings::default().universe.regime_symbols
    } else {
        symbols
    }
}

pub async fn run_regime(engine: &Engine, args: RegimeArgs, json: bool) -> Result<()> {
    let regime = engine.get_market_regime(&basket(args.symbols)).await?;
    if json {
        return print_json(&regime);
    }
    println!("{}", regime_line(&regime));
    Ok(())
}

pub async fn run_narrative(engine: &Engine, args: NarrativeArgs, json: bool) -> Result<()> {
    let narrative = engine
        .generate_market_narrative(&basket(args.regime.symbols), args.workspace.as_deref())
        .await?;
    if json {
        return print_json(&narrative);
    }
    println!("{}", narrative.title);
    println!("{}", narrative.summary);
    let preferred: Vec<&str> = narrative.preferred_strategies.iter().map(|s| s.label()).collect();
    println!("preferred: {}", preferred.join(", "));
    for caution in &narrative.cautions {
        println!("caution: {caution}");
    }
    Ok(())
}
