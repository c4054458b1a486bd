mod cli;
mod commands;
mod config;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cli::{Cli, Commands};
use commands::decode::Sink;

/// Configuration file merged with flags and environment, with a usable game path
fn runtime_config(game_path: Option<PathBuf>, output_path: Option<PathBuf>) -> Result<gilde::Config> {
    let config = config::resolve(config::load()?, game_path, output_path);
    config::require_game_path(&config)?;
    Ok(config)
}

fn main() -> Result<()> {
    let Cli {
        game_path,
        output_path,
        verbose,
        command,
    } = Cli::parse();

    let default_filter = if verbose {
        "gilde=debug,gilde_cli=debug"
    } else {
        "gilde=info,gilde_cli=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match command {
        Commands::Configure {
            game_path,
            output_path,
            use_cache,
            show,
        } => commands::configure::handle(game_path, output_path, use_cache, show),

        Commands::List { format } => {
            let config = runtime_config(game_path, output_path)?;
            commands::list::handle(&config, format)
        }

        Commands::Extract { archives, output } => {
            let config = runtime_config(game_path, output_path)?;
            commands::extract::handle(&config, &archives, output.as_deref())
        }

        Commands::Decode {
            paths,
            format,
            all,
            cache,
            stdout,
        } => {
            let config = runtime_config(game_path, output_path)?;
            let sink = if stdout {
                Sink::Stdout
            } else {
                Sink::Files {
                    use_cache: cache || config.use_cache,
                }
            };
            commands::decode::handle(&config, &paths, format, all, sink)
        }
    }
}
