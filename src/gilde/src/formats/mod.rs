//! Format registry
//!
//! Every supported asset format with its schema, the game directories or
//! archives it is found in, and the output sub-directory decoded assets go
//! to.

pub mod baf;
pub mod bgf;
pub mod common;
pub mod ed3;
pub mod gfx;
pub mod ogr;
pub mod sbf;
pub mod tables;
pub mod txs;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::schema::{Schema, SchemaError};
use crate::vpath::VirtualPath;
use crate::Error;

const RESOURCES_ANIMATIONS_BIN: &str = "Resources/animations.bin";
const RESOURCES_GROUPS_BIN: &str = "Resources/groups.bin";
const RESOURCES_OBJECTS_BIN: &str = "Resources/objects.bin";
const RESOURCES_SCENES_BIN: &str = "Resources/scenes.bin";
const GFX_DIR: &str = "GFX";
const SFX_DIR: &str = "sfx";
const DATA_DIR: &str = "Data";

pub const A_OBJ_DAT: &str = "A_Obj.dat";
pub const A_GEB_DAT: &str = "A_Geb.dat";

/// Sidecar suffix of animation timing files
pub const INI_SUFFIX: &str = ".ini";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Bgf,
    Baf,
    Ed3,
    Ogr,
    Gfx,
    Sbf,
    Txs,
    AObj,
    AGeb,
}

impl Format {
    /// Detection order: named formats are listed last but always checked first
    pub const ALL: [Format; 9] = [
        Format::Bgf,
        Format::Baf,
        Format::Ed3,
        Format::Ogr,
        Format::Gfx,
        Format::Sbf,
        Format::Txs,
        Format::AObj,
        Format::AGeb,
    ];

    pub fn suffix(self) -> &'static str {
        match self {
            Format::Bgf => ".bgf",
            Format::Baf => ".baf",
            Format::Ed3 => ".ed3",
            Format::Ogr => ".ogr",
            Format::Gfx => ".gfx",
            Format::Sbf => ".sbf",
            Format::Txs => ".txs",
            Format::AObj | Format::AGeb => ".dat",
        }
    }

    /// Fixed file name for single-file formats
    pub fn file_name(self) -> Option<&'static str> {
        match self {
            Format::AObj => Some(A_OBJ_DAT),
            Format::AGeb => Some(A_GEB_DAT),
            _ => None,
        }
    }

    /// Where the game keeps this format, relative to the game directory
    pub fn source_roots(self) -> &'static [&'static str] {
        match self {
            Format::Bgf => &[RESOURCES_OBJECTS_BIN, RESOURCES_SCENES_BIN],
            Format::Baf => &[RESOURCES_ANIMATIONS_BIN],
            Format::Ed3 => &[RESOURCES_SCENES_BIN],
            Format::Ogr => &[RESOURCES_GROUPS_BIN],
            Format::Gfx => &[GFX_DIR],
            Format::Sbf => &[SFX_DIR],
            Format::Txs => &[RESOURCES_OBJECTS_BIN],
            Format::AObj | Format::AGeb => &[DATA_DIR],
        }
    }

    /// Sub-directory of the decoded output
    pub fn output_dir(self) -> &'static str {
        match self {
            Format::Bgf => "objects",
            Format::Baf => "animations",
            Format::Ed3 => "scenes",
            Format::Ogr => "groups",
            Format::Gfx => "gfx",
            Format::Sbf => "sfx",
            Format::Txs => "txs",
            Format::AObj | Format::AGeb => ".",
        }
    }

    pub fn schema(self) -> Result<Arc<Schema>, SchemaError> {
        match self {
            Format::Bgf => bgf::schema(),
            Format::Baf => baf::schema(),
            Format::Ed3 => ed3::schema(),
            Format::Ogr => ogr::schema(),
            Format::Gfx => gfx::schema(),
            Format::Sbf => sbf::schema(),
            Format::Txs => txs::schema(),
            Format::AObj => tables::aobj_schema(),
            Format::AGeb => tables::ageb_schema(),
        }
    }

    /// Whether `path` names an asset of this format
    pub fn matches(self, path: &VirtualPath) -> bool {
        match self.file_name() {
            Some(name) => path
                .file_name()
                .is_some_and(|own| VirtualPath::normalize(own) == VirtualPath::normalize(name)),
            None => path.has_suffix(self.suffix()),
        }
    }

    /// Pick the format of `path`: fixed file names first, then suffixes
    pub fn detect(path: &VirtualPath) -> Option<Format> {
        let named = Self::ALL.into_iter().filter(|f| f.file_name().is_some());
        let suffixed = Self::ALL.into_iter().filter(|f| f.file_name().is_none());
        named.chain(suffixed).find(|format| format.matches(path))
    }
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bgf => write!(f, "bgf"),
            Self::Baf => write!(f, "baf"),
            Self::Ed3 => write!(f, "ed3"),
            Self::Ogr => write!(f, "ogr"),
            Self::Gfx => write!(f, "gfx"),
            Self::Sbf => write!(f, "sbf"),
            Self::Txs => write!(f, "txs"),
            Self::AObj => write!(f, "aobj"),
            Self::AGeb => write!(f, "ageb"),
        }
    }
}

impl std::str::FromStr for Format {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "bgf" => Ok(Self::Bgf),
            "baf" => Ok(Self::Baf),
            "ed3" => Ok(Self::Ed3),
            "ogr" => Ok(Self::Ogr),
            "gfx" => Ok(Self::Gfx),
            "sbf" => Ok(Self::Sbf),
            "txs" => Ok(Self::Txs),
            "aobj" | "a_obj" => Ok(Self::AObj),
            "ageb" | "a_geb" => Ok(Self::AGeb),
            _ => Err(Error::UnknownFormat(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_schema_builds() {
        for format in Format::ALL {
            let schema = format.schema().unwrap();
            assert!(!schema.fields().is_empty(), "{format}");
        }
    }

    #[test]
    fn test_detect() {
        let cases = [
            ("houses/ob_haus.bgf", Some(Format::Bgf)),
            ("Resources/animations.bin/walk.BAF", Some(Format::Baf)),
            ("scenes/town.ed3", Some(Format::Ed3)),
            ("Data/A_Obj.dat", Some(Format::AObj)),
            ("data/a_geb.DAT", Some(Format::AGeb)),
            ("Data/character_names.dat", None),
            ("GFX/Gilde_add_on_german.gfx", Some(Format::Gfx)),
            ("walk.ini", None),
        ];
        for (path, expected) in cases {
            assert_eq!(Format::detect(&VirtualPath::new(path)), expected, "{path}");
        }
    }

    #[test]
    fn test_names_round_trip() {
        for format in Format::ALL {
            let parsed: Format = format.to_string().parse().unwrap();
            assert_eq!(parsed, format);
        }
        assert_eq!(".BGF".parse::<Format>().unwrap(), Format::Bgf);
        assert!(matches!(
            "wav".parse::<Format>().unwrap_err(),
            Error::UnknownFormat(_)
        ));
        assert_eq!(
            serde_json::to_string(&Format::AObj).unwrap(),
            "\"aobj\""
        );
    }
}
