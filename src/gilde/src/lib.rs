//! Asset decoding for Europa 1400 (Die Gilde)
//!
//! The game ships its assets as loose files and inside zip-compatible
//! containers (`objects.bin`, `scenes.bin`, ...). This crate provides:
//!
//! - [`VirtualPath`]: one path type for plain files, directories, archive
//!   containers and entries inside them
//! - [`Cursor`] and the [`schema`] field algebra: declarative struct parsing
//!   with optional/conditional/computed/array/greedy/pointer/nested fields
//! - [`formats`]: schemas for every supported binary format
//! - [`Decoder`]: resolves a logical asset path and decodes it into a [`Value`]
//!   tree tagged with that path
//!
//! # Formats
//!
//! | Format | Suffix | Contents |
//! |--------|--------|----------|
//! | BGF | `.bgf` | 3D objects (textures, per-object models, render mapping) |
//! | BAF | `.baf` | Keyframed vertex animations (+ `.ini` timing sidecar) |
//! | ED3 | `.ed3` | Scene graphs (city blocks, dummies, cameras, objects, lights) |
//! | OGR | `.ogr` | Object groups |
//! | GFX | `.gfx` | Sprite atlases (shape banks) |
//! | SBF | `.sbf` | Soundbanks |
//! | TXS | `.txs` | Texture-name tables |
//! | A_Obj / A_Geb | `.dat` | Object and building tables |

pub mod config;
pub mod cursor;
pub mod formats;
pub mod pipeline;
pub mod schema;
pub mod value;
pub mod vpath;

pub use config::Config;
pub use cursor::Cursor;
pub use formats::Format;
pub use pipeline::{Decoded, Decoder};
pub use schema::{Expr, Field, ParseError, Schema, SchemaError};
pub use value::{Record, Value};
pub use vpath::{Kind as PathKind, VirtualPath};

use std::path::PathBuf;

/// Errors from path resolution and asset decoding
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Not found: '{target}' in {container}")]
    NotFound { container: PathBuf, target: String },

    #[error("Not a directory or archive: {0}")]
    NotADirectoryOrArchive(PathBuf),

    #[error("{path} is not under {root}")]
    NotUnderRoot { path: PathBuf, root: PathBuf },

    #[error("Could not determine format for {0}")]
    UnknownFormat(String),

    #[error(
        "Malformed {format} asset {path} at offset 0x{offset:x} ({field}): expected {expected}, found {found}"
    )]
    MalformedAsset {
        format: Format,
        path: String,
        field: String,
        offset: usize,
        expected: String,
        found: String,
    },

    #[error("{format} asset {path}: field '{field}' depends on absent value '{reference}'")]
    MissingReference {
        format: Format,
        path: String,
        field: String,
        reference: String,
    },

    #[error("Invalid schema: {0}")]
    Schema(#[from] SchemaError),

    #[error("Invalid animation settings in {path}: {reason}")]
    Settings { path: PathBuf, reason: String },

    #[error("Invalid configuration: {0}")]
    Config(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Attach format and asset path to a parse failure
    pub fn from_parse(format: Format, path: impl Into<String>, err: ParseError) -> Self {
        let path = path.into();
        match err {
            ParseError::Malformed {
                field,
                offset,
                expected,
                found,
            } => Error::MalformedAsset {
                format,
                path,
                field,
                offset,
                expected,
                found,
            },
            ParseError::MissingReference { field, reference } => Error::MissingReference {
                format,
                path,
                field,
                reference,
            },
        }
    }

    /// Whether this error came from the bytes of the asset rather than from locating it
    pub fn is_decode_failure(&self) -> bool {
        matches!(
            self,
            Error::MalformedAsset { .. } | Error::MissingReference { .. }
        )
    }
}
