//! `premia recompute`: full pipeline, ranked packets out.

use std::collections::HashMap;

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use clap::Args;
use premia_engine::{Engine, RecomputeOptions, RecomputeResult};

use super::output::{print_json, print_packet_table, regime_line};
use super::settings::SettingsArgs;

/// Inputs shared by every command that runs the pipeline.
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub settings: SettingsArgs,

    /// Comma-separated symbols overriding the settings universe
    #[arg(long, value_delimiter = ',')]
    pub symbols: Vec<String>,

    /// Next earnings dates as SYMBOL=YYYY-MM-DD, comma-separated
    #[arg(long, value_delimiter = ',')]
    pub earnings: Vec<String>,

    /// Date the run treats as today (YYYY-MM-DD)
    #[arg(long)]
    pub as_of: Option<NaiveDate>,

    /// Expirations scanned per symbol
    #[arg(long)]
    pub max_expirations: Option<usize>,

    /// Workspace id echoed into the narrative
    #[arg(long)]
    pub workspace: Option<String>,
}

impl RunArgs {
    /// # Errors
    /// Returns an error if an `--earnings` entry is malformed.
    pub fn options(&self) -> Result<RecomputeOptions> {
        Ok(RecomputeOptions {
            symbols: (!self.symbols.is_empty()).then(|| self.symbols.clone()),
            earnings: parse_earnings(&self.earnings)?,
            as_of: self.as_of,
            max_expirations: self.max_expirations,
            workspace_id: self.workspace.clone(),
            ..RecomputeOptions::default()
        })
    }
}

/// Parses `SYMBOL=YYYY-MM-DD` entries.
pub fn parse_earnings(entries: &[String]) -> Result<HashMap<String, NaiveDate>> {
    entries
        .iter()
        .map(|entry| -> Result<(String, NaiveDate)> {
            let (symbol, date) = entry
                .split_once('=')
                .ok_or_else(|| anyhow!("expected SYMBOL=YYYY-MM-DD, got {entry:?}"))?;
            let date = date
                .trim()
                .parse::<NaiveDate>()
                .with_context(|| format!("invalid earnings date for {symbol}"))?;
            Ok((symbol.trim().to_uppercase(), date))
        })
        .collect()
}

#[derive(Args, Debug)]
pub struct RecomputeArgs {
    #[command(flatten)]
    pub run: RunArgs,

    /// Ranked packets to print
    #[arg(long, default_value = "20")]
    pub limit: usize,
}

pub async fn run(engine: &Engine, args: RecomputeArgs, json: bool) -> Result<()> {
    let settings = args.run.settings.load()?;
    let result = engine.recompute(&settings, args.run.options()?).await?;

    if json {
        return print_json(&result);
    }
    print_summary(&result, args.limit);
    Ok(())
}

pub fn print_summary(result: &RecomputeResult, limit: usize) {
    let stats = &result.stats;
    println!("run {} as of {} ({} ms)", result.run_id, result.as_of, stats.duration_ms);
    println!("{}", regime_line(&result.regime));
    println!("{}: {}", result.narrative.title, result.narrative.summary);
    for caution in &result.narrative.cautions {
        println!("  caution: {caution}");
    }
    println!();

    println!(
        "symbols {} ({} with candidates) | expirations {} | candidates {} | ranked {}",
        stats.symbols_processed,
        stats.symbols_with_candidates,
        stats.expirations_scanned,
        stats.candidates_generated,
        stats.candidates_after_filtering,
    );
    for (strategy, count) in &stats.by_strategy {
        println!("  {}: {count}", strategy.label());
    }
    println!(
        "dropped: score {} | strategy cap {} | symbol cap {} | risk budget {} | committed risk {}",
        stats.dropped_min_score,
        stats.dropped_strategy_cap,
        stats.dropped_symbol_cap,
        stats.dropped_risk_budget,
        stats.committed_risk,
    );
    for error in &stats.errors {
        println!("  error: {error}");
    }
    println!();

    if result.ranked.is_empty() {
        println!("no packets passed ranking");
    } else {
        let shown = &result.ranked[..result.ranked.len().min(limit)];
        print_packet_table(shown);
    }
}
