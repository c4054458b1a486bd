//! CLI argument definitions for gilde

use clap::{Parser, Subcommand};
use gilde::Format;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "gilde")]
#[command(about = "Europa 1400 asset extractor and decoder", long_about = None)]
pub struct Cli {
    /// Game installation directory (overrides the configured one)
    #[arg(long, global = true, env = "GILDE_GAME_PATH")]
    pub game_path: Option<PathBuf>,

    /// Output directory for extracted and decoded files
    #[arg(long, global = true, env = "GILDE_OUTPUT_PATH")]
    pub output_path: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List the assets of a format found in the game directory
    #[command(visible_alias = "l")]
    List {
        /// Format name (bgf, baf, ed3, ogr, gfx, sbf, txs, aobj, ageb)
        format: Format,
    },

    /// Unpack archive containers
    #[command(visible_alias = "x")]
    Extract {
        /// Archives to unpack (default: every container the formats read from)
        archives: Vec<PathBuf>,

        /// Output directory (default: <output>/extracted/<archive name>)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Decode assets to JSON
    #[command(visible_alias = "d")]
    Decode {
        /// Logical asset paths, e.g. houses/ob_haus.bgf
        paths: Vec<String>,

        /// Decode as this format instead of detecting it; alone, decodes every asset of it
        #[arg(short, long)]
        format: Option<Format>,

        /// Decode every asset of every format
        #[arg(long, conflicts_with = "paths")]
        all: bool,

        /// Skip assets whose JSON output already exists
        #[arg(long)]
        cache: bool,

        /// Print the decoded tree instead of writing files
        #[arg(long)]
        stdout: bool,
    },

    /// Configure default settings
    #[command(visible_alias = "c")]
    Configure {
        /// Set the game installation directory
        #[arg(long = "set-game-path")]
        game_path: Option<PathBuf>,

        /// Set the output directory
        #[arg(long = "set-output-path")]
        output_path: Option<PathBuf>,

        /// Skip already decoded assets by default
        #[arg(long)]
        use_cache: Option<bool>,

        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_args() {
        let cli = Cli::try_parse_from([
            "gilde",
            "-v",
            "decode",
            "houses/ob_haus.bgf",
            "--format",
            "BGF",
            "--cache",
        ])
        .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Decode {
                paths,
                format,
                all,
                cache,
                stdout,
            } => {
                assert_eq!(paths, ["houses/ob_haus.bgf"]);
                assert_eq!(format, Some(Format::Bgf));
                assert!(!all);
                assert!(cache);
                assert!(!stdout);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_format_rejected() {
        assert!(Cli::try_parse_from(["gilde", "list", "wav"]).is_err());
        assert!(Cli::try_parse_from(["gilde", "decode", "a.bgf", "--all"]).is_err());
    }

    #[test]
    fn test_global_game_path() {
        let cli = Cli::try_parse_from(["gilde", "list", "sbf", "--game-path", "/games/gilde"])
            .unwrap();
        assert_eq!(cli.game_path, Some(PathBuf::from("/games/gilde")));
        assert!(matches!(cli.command, Commands::List { format: Format::Sbf }));
    }
}
