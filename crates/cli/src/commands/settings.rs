//! `premia settings`: show, validate and diff trading settings.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use premia_core::{calculate_settings_diff, get_default_settings, validate_settings, SettingsPreset, TradingSettings};

use super::output::print_json;

/// Where a command's trading settings come from.
#[derive(Args, Debug, Clone)]
pub struct SettingsArgs {
    /// Built-in preset (conservative, balanced, aggressive, custom)
    #[arg(long, default_value = "balanced")]
    pub preset: SettingsPreset,

    /// JSON settings file; takes precedence over --preset
    #[arg(long)]
    pub settings: Option<PathBuf>,
}

impl SettingsArgs {
    /// # Errors
    /// Returns an error if the settings file cannot be read or parsed.
    pub fn load(&self) -> Result<TradingSettings> {
        match &self.settings {
            Some(path) => read_settings_file(path),
            None => Ok(get_default_settings(self.preset)),
        }
    }
}

fn read_settings_file(path: &Path) -> Result<TradingSettings> {
    let text = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("failed to parse settings from {}", path.display()))
}

/// A preset name or a path to a JSON settings file.
fn resolve(source: &str) -> Result<TradingSettings> {
    match source.parse::<SettingsPreset>() {
        Ok(preset) => Ok(get_default_settings(preset)),
        Err(_) => read_settings_file(Path::new(source)),
    }
}

#[derive(Subcommand, Debug)]
pub enum SettingsCommand {
    /// Print settings as JSON
    Show(SettingsArgs),
    /// Check settings against every rule and hard cap
    Validate(SettingsArgs),
    /// List changed fields between two presets or files
    Diff {
        /// Preset name or JSON file
        from: String,
        /// Preset name or JSON file
        to: String,
    },
}

/// # Errors
/// Returns an error on unreadable input or, for `validate`, invalid settings.
pub fn run(command: SettingsCommand, json: bool) -> Result<()> {
    match command {
        SettingsCommand::Show(args) => print_json(&args.load()?),
        SettingsCommand::Validate(args) => {
            let settings = args.load()?;
            let validation = validate_settings(&settings);
            if json {
                print_json(&validation)?;
            } else {
                for warning in &validation.warnings {
                    println!("warning: {warning}");
                }
                for error in &validation.errors {
                    println!("error: {error}");
                }
                if validation.valid {
                    println!("{} settings are valid", settings.preset);
                }
            }
            if !validation.valid {
                bail!("{} validation error(s)", validation.errors.len());
            }
            Ok(())
        }
        SettingsCommand::Diff { from, to } => {
            let changes = calculate_settings_diff(&resolve(&from)?, &resolve(&to)?);
            if json {
                return print_json(&changes);
            }
            if changes.is_empty() {
                println!("no differences");
            }
            for change in &changes {
                println!("{}: {} -> {}", change.path, change.old, change.new);
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_resolve_by_name() {
        let settings = resolve("Aggressive").unwrap();
        assert_eq!(settings.preset, SettingsPreset::Aggressive);
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = resolve("no/such/settings.json").unwrap_err();
        assert!(err.to_string().contains("no/such/settings.json"));
    }

    #[test]
    fn settings_file_round_trips() {
        let path = std::env::temp_dir().join(format!("premia-settings-{}.json", std::process::id()));
        let mut settings = get_default_settings(SettingsPreset::Conservative);
        settings.earnings_exclusion_days = 21;
        std::fs::write(&path, serde_json::to_string(&settings).unwrap()).unwrap();

        let args = SettingsArgs {
            preset: SettingsPreset::Balanced,
            settings: Some(path.clone()),
        };
        let loaded = args.load().unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(loaded, settings);
    }
}
