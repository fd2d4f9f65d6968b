use crate::config::AppConfig;
use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Json, Toml},
    Figment,
};
use std::path::Path;

/// Environment variable prefix; nested keys use `__` (e.g. `PREMIA_PROVIDER__KIND`).
pub const ENV_PREFIX: &str = "PREMIA_";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads configuration by merging `config/Config.toml`, environment variables, and JSON.
    ///
    /// Missing files fall back to defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration files cannot be parsed.
    pub fn load() -> Result<AppConfig> {
        Self::figment(Path::new("config/Config.toml"), None)
            .extract()
            .context("failed to load configuration")
    }

    /// Loads configuration with a profile overlay (`config/Config.{profile}.toml`).
    ///
    /// # Errors
    ///
    /// Returns an error if configuration files cannot be parsed.
    pub fn load_with_profile(profile: &str) -> Result<AppConfig> {
        let overlay = format!("config/Config.{profile}.toml");
        Self::figment(Path::new("config/Config.toml"), Some(Path::new(&overlay)))
            .extract()
            .with_context(|| format!("failed to load configuration for profile {profile}"))
    }

    /// Loads configuration from an explicit TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be parsed.
    pub fn load_from(path: impl AsRef<Path>) -> Result<AppConfig> {
        let path = path.as_ref();
        Self::figment(path, None)
            .extract()
            .with_context(|| format!("failed to load configuration from {}", path.display()))
    }

    fn figment(base: &Path, overlay: Option<&Path>) -> Figment {
        let mut figment = Figment::new().merge(Toml::file(base));
        if let Some(overlay) = overlay {
            figment = figment.merge(Toml::file(overlay));
        }
        figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .join(Json::file("config/Config.json"))
    }
}
