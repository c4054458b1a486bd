//! Configuration command handlers
//!
//! Handles the `configure` subcommand for setting up gilde defaults.

use crate::config;
use anyhow::Result;
use gilde::Config;
use std::path::PathBuf;

/// Handle the configure command
pub fn handle(
    game_path: Option<PathBuf>,
    output_path: Option<PathBuf>,
    use_cache: Option<bool>,
    show: bool,
) -> Result<()> {
    let mut config = config::load()?;

    if show {
        show_config(&config);
        return Ok(());
    }

    if !apply(&mut config, game_path, output_path, use_cache) {
        show_usage();
        return Ok(());
    }

    let path = config::save(&config)?;
    show_config(&config);
    println!("Config saved to: {}", path.display());

    Ok(())
}

/// Returns whether anything changed
fn apply(
    config: &mut Config,
    game_path: Option<PathBuf>,
    output_path: Option<PathBuf>,
    use_cache: Option<bool>,
) -> bool {
    let mut changed = false;
    if let Some(path) = game_path {
        config.game_path = path;
        changed = true;
    }
    if let Some(path) = output_path {
        config.output_path = path;
        changed = true;
    }
    if let Some(flag) = use_cache {
        config.use_cache = flag;
        changed = true;
    }
    changed
}

fn show_config(config: &Config) {
    if config.game_path.as_os_str().is_empty() {
        println!("Game path:   (not configured)");
    } else {
        println!("Game path:   {}", config.game_path.display());
    }
    println!("Output path: {}", config.output_path.display());
    println!("Use cache:   {}", config.use_cache);

    if let Ok(path) = config::config_path() {
        println!("Config file: {}", path.display());
    }
}

fn show_usage() {
    println!("Usage: gilde configure --set-game-path <GAME_DIR>");
    println!("   or: gilde configure --set-output-path <DIR> --use-cache true");
    println!("   or: gilde configure --show");
}
