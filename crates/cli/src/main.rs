use clap::{Parser, Subcommand};

mod commands;

use premia_core::{AppConfig, ConfigLoader};
use premia_engine::Engine;

use commands::{AnalyzeArgs, ExecuteArgs, NarrativeArgs, RecomputeArgs, RegimeArgs, SettingsCommand};

#[derive(Parser)]
#[command(name = "premia")]
#[command(about = "Options trade-generation engine", long_about = None)]
struct Cli {
    /// Config file path
    #[arg(short, long, global = true, default_value = "config/Config.toml")]
    config: String,

    /// Profile overlay (loads config/Config.{profile}.toml on top of the base file)
    #[arg(long, global = true, env = "PREMIA_PROFILE")]
    profile: Option<String>,

    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline and print ranked trade packets
    Recompute(RecomputeArgs),
    /// Classify current market conditions
    Regime(RegimeArgs),
    /// Describe the current regime in prose
    Narrative(NarrativeArgs),
    /// Compute signals for one symbol
    Analyze(AnalyzeArgs),
    /// Inspect, validate and compare trading settings
    #[command(subcommand)]
    Settings(SettingsCommand),
    /// Recompute, then route the top packets through the execution manager
    Execute(ExecuteArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so --json output stays clean.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Settings(command) => commands::settings::run(command, cli.json)?,
        Commands::Recompute(args) => {
            let (engine, _) = load_engine(cli.profile.as_deref(), &cli.config)?;
            commands::recompute::run(&engine, args, cli.json).await?;
        }
        Commands::Regime(args) => {
            let (engine, _) = load_engine(cli.profile.as_deref(), &cli.config)?;
            commands::regime::run_regime(&engine, args, cli.json).await?;
        }
        Commands::Narrative(args) => {
            let (engine, _) = load_engine(cli.profile.as_deref(), &cli.config)?;
            commands::regime::run_narrative(&engine, args, cli.json).await?;
        }
        Commands::Analyze(args) => {
            let (engine, _) = load_engine(cli.profile.as_deref(), &cli.config)?;
            commands::analyze::run(&engine, args, cli.json).await?;
        }
        Commands::Execute(args) => {
            let (engine, config) = load_engine(cli.profile.as_deref(), &cli.config)?;
            commands::execute::run(&engine, &config, args, cli.json).await?;
        }
    }

    Ok(())
}

/// Loads configuration and builds the engine it describes.
fn load_engine(profile: Option<&str>, config_path: &str) -> anyhow::Result<(Engine, AppConfig)> {
    let config = match profile {
        Some(profile) => ConfigLoader::load_with_profile(profile)?,
        None => ConfigLoader::load_from(config_path)?,
    };
    tracing::debug!(provider = ?config.provider.kind, broker = ?config.broker.kind, "configuration loaded");
    let engine = Engine::from_config(&config)?;
    Ok((engine, config))
}
