//! Configuration file handling for the gilde CLI
//!
//! The file holds a serialized [`gilde::Config`]; command-line flags and
//! environment variables override it per run.

use anyhow::{Context, Result};
use gilde::Config;
use std::fs;
use std::path::{Path, PathBuf};

/// Get the path to the config file
pub fn config_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .context("Could not determine config directory")?
        .join("gilde");

    Ok(config_dir.join("config.toml"))
}

/// Load configuration from file, or the defaults if it doesn't exist
pub fn load() -> Result<Config> {
    load_from(&config_path()?)
}

pub fn load_from(path: &Path) -> Result<Config> {
    Config::load(path).with_context(|| format!("Failed to load config from {}", path.display()))
}

/// Save configuration to file
pub fn save(config: &Config) -> Result<PathBuf> {
    let path = config_path()?;
    save_to(config, &path)?;
    Ok(path)
}

pub fn save_to(config: &Config, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| {
            format!("Failed to create config directory at {}", parent.display())
        })?;
    }

    let contents = toml::to_string_pretty(config).context("Failed to serialize config")?;

    fs::write(path, contents)
        .with_context(|| format!("Failed to write config to {}", path.display()))?;

    Ok(())
}

/// Apply per-run overrides from flags and environment
pub fn resolve(
    mut config: Config,
    game_path: Option<PathBuf>,
    output_path: Option<PathBuf>,
) -> Config {
    if let Some(path) = game_path {
        config.game_path = path;
    }
    if let Some(path) = output_path {
        config.output_path = path;
    }
    config
}

/// Fail early when no game directory is known
pub fn require_game_path(config: &Config) -> Result<()> {
    if config.game_path.as_os_str().is_empty() {
        anyhow::bail!(
            "No game path configured. Run `gilde configure --set-game-path <dir>` or set GILDE_GAME_PATH"
        );
    }
    if !config.game_path.is_dir() {
        anyhow::bail!("Game path {} is not a directory", config.game_path.display());
    }
    Ok(())
}
