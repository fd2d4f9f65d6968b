//! `premia analyze SYMBOL`.

use anyhow::Result;
use chrono::NaiveDate;
use clap::Args;
use premia_engine::Engine;

use super::output::print_json;
use super::settings::SettingsArgs;

#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    /// Ticker to analyze
    pub symbol: String,

    #[command(flatten)]
    pub settings: SettingsArgs,

    /// Next earnings date (YYYY-MM-DD)
    #[arg(long)]
    pub earnings: Option<NaiveDate>,
}

fn fmt_opt(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{v:.2}"))
}

pub async fn run(engine: &Engine, args: AnalyzeArgs, json: bool) -> Result<()> {
    let settings = args.settings.load()?;
    let symbol = args.symbol.trim().to_uppercase();
    let signals = engine.analyze_symbol(&symbol, &settings, args.earnings).await?;

    if json {
        return print_json(&signals);
    }
    println!("{} {} ({:+.2}%) trend {}", signals.symbol, signals.price, signals.change_pct, signals.trend);
    println!(
        "SMA 20/50/200: {} / {} / {}",
        fmt_opt(signals.sma_20),
        fmt_opt(signals.sma_50),
        fmt_opt(signals.sma_200)
    );
    println!("RSI 14: {}", fmt_opt(signals.rsi_14));
    println!(
        "HV {:.1}% | IV {} | IV rank {}",
        signals.historical_volatility * 100.0,
        fmt_opt(signals.implied_volatility.map(|iv| iv * 100.0)),
        fmt_opt(signals.iv_rank)
    );
    println!("average volume {}", signals.average_volume);
    match (signals.earnings_date, signals.days_to_earnings) {
        (Some(date), Some(days)) => println!(
            "earnings {date} in {days} days{}",
            if signals.earnings_excluded { " (excluded)" } else { "" }
        ),
        _ => println!("no earnings date"),
    }
    Ok(())
}
