//! Decoder configuration
//!
//! Passed explicitly into [`crate::Decoder`]; there is no global options
//! object. The CLI fills it from `config.toml`, flags and environment.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::Result;

pub const DEFAULT_OUTPUT_PATH: &str = "output";
pub const EXTRACTED_DIR: &str = "extracted";
pub const DECODED_DIR: &str = "decoded";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Game installation directory (contains `Resources/`, `GFX/`, `sfx/`, `Data/`)
    pub game_path: PathBuf,
    pub output_path: PathBuf,
    /// Skip assets whose decoded output already exists
    pub use_cache: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            game_path: PathBuf::new(),
            output_path: PathBuf::from(DEFAULT_OUTPUT_PATH),
            use_cache: false,
        }
    }
}

impl Config {
    pub fn new(game_path: impl Into<PathBuf>) -> Self {
        Self {
            game_path: game_path.into(),
            ..Self::default()
        }
    }

    pub fn with_output_path(mut self, output_path: impl Into<PathBuf>) -> Self {
        self.output_path = output_path.into();
        self
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Load from a TOML file; a missing file yields the defaults
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// A path below the game directory
    pub fn game_file(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.game_path.join(relative)
    }

    pub fn extracted_dir(&self) -> PathBuf {
        self.output_path.join(EXTRACTED_DIR)
    }

    pub fn decoded_dir(&self) -> PathBuf {
        self.output_path.join(DECODED_DIR)
    }
}
