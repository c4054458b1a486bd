//! Decode pipeline
//!
//! [`Decoder`] turns a logical asset path (`houses/ob_haus.bgf`) into a
//! [`Decoded`] tree: pick the format, find the asset below one of the
//! format's source roots, read its bytes, run the schema and check that
//! every byte was read by a field that was kept.
//!
//! The decoder holds nothing but its [`Config`]; caching decoded output is
//! up to the caller.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, trace};

use crate::config::Config;
use crate::cursor::Cursor;
use crate::formats::baf::AnimationSettings;
use crate::formats::{Format, INI_SUFFIX};
use crate::value::Value;
use crate::vpath::VirtualPath;
use crate::{Error, Result};

/// A decoded asset, tagged with its path relative to the source root
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Decoded {
    pub format: Format,
    pub path: VirtualPath,
    pub root: Value,
}

/// Where the JSON rendering of an asset goes below `decoded_dir`
///
/// Formats read from more than one root get a sub-directory per root, so
/// `objects.bin/a.bgf` and `scenes.bin/a.bgf` never share an output file.
pub fn output_path(decoded_dir: &Path, format: Format, located: &Located) -> PathBuf {
    let mut dir = decoded_dir.join(format.output_dir());
    if format.source_roots().len() > 1 {
        if let Some(stem) = located.root.stem() {
            dir.push(stem.to_ascii_lowercase());
        }
    }
    let mut relative = located.logical.to_path_buf().into_os_string();
    relative.push(".json");
    dir.join(relative)
}

/// Where an asset was found
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Located {
    /// Source root (archive container or directory)
    pub root: VirtualPath,
    /// Path of the asset relative to `root`
    pub logical: VirtualPath,
}

impl Located {
    pub fn source(&self) -> VirtualPath {
        self.root.join(self.logical.as_str())
    }

    pub fn output_path(&self, decoded_dir: &Path, format: Format) -> PathBuf {
        output_path(decoded_dir, format, self)
    }
}

#[derive(Debug, Clone)]
pub struct Decoder {
    config: Config,
}

impl Decoder {
    pub fn new(config: &Config) -> Self {
        Self {
            config: config.clone(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Source roots of `format` below the game directory
    pub fn roots(&self, format: Format) -> Vec<VirtualPath> {
        format
            .source_roots()
            .iter()
            .map(|root| VirtualPath::new(self.config.game_file(root)))
            .collect()
    }

    /// Find `logical` below one of the roots of `format`
    ///
    /// Roots are tried in order. If no root has the path, the leading
    /// segment is dropped and the search repeats, so output-style paths such
    /// as `objects/houses/ob_haus.bgf` still resolve.
    pub fn locate(&self, format: Format, logical: &VirtualPath) -> Result<Located> {
        let roots = self.roots(format);
        let mut candidate = Some(logical.clone());

        while let Some(target) = candidate {
            for root in &roots {
                match root.find(&target, true) {
                    Ok(Some(found)) => {
                        return Ok(Located {
                            root: root.clone(),
                            logical: found,
                        })
                    }
                    Ok(None) => {}
                    // a root that is not installed
                    Err(Error::NotFound { .. }) => {
                        trace!(root = %root, "source root missing");
                    }
                    Err(err) => return Err(err),
                }
            }
            candidate = target.shift_left();
        }

        Err(Error::NotFound {
            container: roots
                .first()
                .map(VirtualPath::to_path_buf)
                .unwrap_or_else(|| self.config.game_path.clone()),
            target: logical.to_string(),
        })
    }

    /// Decode the asset at `logical`, detecting its format from the name
    pub fn decode(&self, logical: impl Into<VirtualPath>) -> Result<Decoded> {
        let logical = logical.into();
        let format =
            Format::detect(&logical).ok_or_else(|| Error::UnknownFormat(logical.to_string()))?;
        self.decode_as(format, &logical)
    }

    /// Decode the asset at `logical` as `format`
    pub fn decode_as(&self, format: Format, logical: &VirtualPath) -> Result<Decoded> {
        let located = self.locate(format, logical)?;
        self.decode_located(format, &located)
    }

    /// Decode an asset already found by [`Decoder::locate`] or [`Decoder::discover`]
    pub fn decode_located(&self, format: Format, located: &Located) -> Result<Decoded> {
        let bytes = located.source().read()?;
        let mut decoded = self.decode_bytes(format, &bytes, located.logical.clone())?;

        if format == Format::Baf {
            if let Some(settings) = self.animation_settings(located)? {
                if let Value::Record(record) = &mut decoded.root {
                    record.push("settings", settings.to_value());
                }
            }
        }

        Ok(decoded)
    }

    /// Run the schema of `format` over `bytes`; the whole input must be consumed
    pub fn decode_bytes(
        &self,
        format: Format,
        bytes: &[u8],
        logical: impl Into<VirtualPath>,
    ) -> Result<Decoded> {
        let logical = logical.into();
        let schema = format.schema()?;
        let mut cursor = Cursor::new(bytes);
        let record = schema
            .parse(&mut cursor)
            .map_err(|err| Error::from_parse(format, logical.as_str(), err))?;

        if let Some((start, end)) = cursor.first_gap() {
            let (expected, found) = if end == bytes.len() {
                ("end of data", format!("{} trailing bytes", end - start))
            } else {
                ("no unread bytes", format!("{} unread bytes", end - start))
            };
            return Err(Error::MalformedAsset {
                format,
                path: logical.to_string(),
                field: schema.name().to_string(),
                offset: start,
                expected: expected.to_string(),
                found,
            });
        }

        debug!(format = %format, path = %logical, bytes = bytes.len(), "decoded asset");
        Ok(Decoded {
            format,
            path: logical,
            root: Value::Record(record),
        })
    }

    /// Every asset of `format` across its roots, tagged with the root it was found in
    pub fn discover(&self, format: Format) -> Result<Vec<Located>> {
        let mut found = Vec::new();
        for root in self.roots(format) {
            let entries = match root.list_entries(None) {
                Ok(entries) => entries,
                Err(Error::NotFound { .. } | Error::NotADirectoryOrArchive(_)) => {
                    trace!(root = %root, "source root missing");
                    continue;
                }
                Err(err) => return Err(err),
            };
            found.extend(
                entries
                    .into_iter()
                    .filter(|entry| format.matches(entry))
                    .map(|logical| Located {
                        root: root.clone(),
                        logical,
                    }),
            );
        }
        debug!(format = %format, assets = found.len(), "discovered assets");
        Ok(found)
    }

    /// The `.ini` timing file next to an animation, if there is one
    fn animation_settings(&self, located: &Located) -> Result<Option<AnimationSettings>> {
        let sidecar = located.logical.with_suffix(INI_SUFFIX);
        let Some(found) = located.root.find(&sidecar, true)? else {
            return Ok(None);
        };
        let source = located.root.join(found.as_str());
        let bytes = source.read()?;
        AnimationSettings::from_bytes(&bytes, &source.to_path_buf()).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;
    use crate::vpath::tests::write_zip;

    fn txs_bytes(names: &[&str], rows: u32, columns: u32) -> Vec<u8> {
        let mut data = 0u32.to_le_bytes().to_vec();
        data.extend_from_slice(&rows.to_le_bytes());
        data.extend_from_slice(&columns.to_le_bytes());
        for name in names {
            data.extend_from_slice(name.as_bytes());
            data.push(0);
        }
        data
    }

    fn baf_bytes() -> Vec<u8> {
        let mut data = b"BGF\0\x30".to_vec();
        data.extend_from_slice(&0u32.to_le_bytes());
        data.push(0x01);
        data.extend_from_slice(&2u16.to_le_bytes());
        data.extend_from_slice(&[0xCD, 0xAB, 0x23]);
        data.extend_from_slice(&1u32.to_le_bytes());
        data.push(0x18);
        data.extend_from_slice(&0u32.to_le_bytes());
        data.push(0x19);
        data.extend_from_slice(&0u32.to_le_bytes());
        data.extend_from_slice(&[0x21, 0x28, 0x2F]);
        data
    }

    fn game_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        let resources = dir.path().join("Resources");
        fs::create_dir_all(&resources).unwrap();

        let walls = txs_bytes(&["wall", "roof"], 1, 2);
        let broken = txs_bytes(&["wall", "roof"], 1, 3);
        let mut long = txs_bytes(&["wall"], 1, 1);
        long.extend_from_slice(&[0xFF, 0xFF]);
        write_zip(
            &resources.join("objects.bin"),
            &[
                ("tex/walls.txs", walls.as_slice()),
                ("tex/broken.txs", broken.as_slice()),
                ("tex/long.txs", long.as_slice()),
            ],
        );

        let animation = baf_bytes();
        write_zip(
            &resources.join("animations.bin"),
            &[
                ("people/walk.baf", animation.as_slice()),
                (
                    "people/walk.ini",
                    &b"[4HEAD Studios Animation-Settings]\nNumKeys=1\nKeys=40\n"[..],
                ),
                ("people/run.baf", animation.as_slice()),
            ],
        );
        fs::create_dir_all(dir.path().join("sfx")).unwrap();
        dir
    }

    #[test]
    fn test_decode_from_archive() {
        let dir = game_dir();
        let decoder = Decoder::new(&Config::new(dir.path()));

        let decoded = decoder.decode("walls.txs").unwrap();
        assert_eq!(decoded.format, Format::Txs);
        assert_eq!(decoded.path.as_str(), "tex/walls.txs");
        assert_eq!(
            decoded.root.lookup("texture_names[1]").and_then(Value::as_text),
            Some("roof")
        );

        // identical input, identical output
        assert_eq!(decoder.decode("tex/walls.txs").unwrap(), decoded);
        // output-style prefix is shifted away
        assert_eq!(decoder.decode("txs/tex/walls.txs").unwrap(), decoded);
    }

    #[test]
    fn test_truncated_array_is_malformed() {
        let dir = game_dir();
        let decoder = Decoder::new(&Config::new(dir.path()));

        let err = decoder.decode("tex/broken.txs").unwrap_err();
        match err {
            Error::MalformedAsset {
                format,
                path,
                field,
                offset,
                ..
            } => {
                assert_eq!(format, Format::Txs);
                assert_eq!(path, "tex/broken.txs");
                assert!(field.starts_with("texture_names"), "{field}");
                assert_eq!(offset, txs_bytes(&["wall", "roof"], 1, 3).len());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_trailing_bytes_are_malformed() {
        let dir = game_dir();
        let decoder = Decoder::new(&Config::new(dir.path()));

        let err = decoder.decode("long.txs").unwrap_err();
        assert!(err.is_decode_failure());
        match err {
            Error::MalformedAsset { offset, found, .. } => {
                assert_eq!(offset, txs_bytes(&["wall"], 1, 1).len());
                assert!(found.contains("2 trailing"), "{found}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_animation_settings_attached() {
        let dir = game_dir();
        let decoder = Decoder::new(&Config::new(dir.path()));

        let walk = decoder.decode("walk.baf").unwrap();
        assert_eq!(walk.root.lookup("settings.num_keys"), Some(&Value::Int(1)));
        assert_eq!(
            walk.root.lookup("settings.key_times[0]"),
            Some(&Value::Float(0.5))
        );

        let run = decoder.decode("people/run.baf").unwrap();
        assert_eq!(run.root.lookup("settings"), None);
    }

    #[test]
    fn test_not_found_and_unknown() {
        let dir = game_dir();
        let decoder = Decoder::new(&Config::new(dir.path()));

        assert!(matches!(
            decoder.decode("missing.txs").unwrap_err(),
            Error::NotFound { .. }
        ));
        // the gfx directory is not installed
        assert!(matches!(
            decoder.decode("GFX/ui.gfx").unwrap_err(),
            Error::NotFound { .. }
        ));
        assert!(matches!(
            decoder.decode("readme.txt").unwrap_err(),
            Error::UnknownFormat(_)
        ));
    }

    #[test]
    fn test_discover_and_directory_roots() {
        let dir = game_dir();
        let sound = {
            let mut data = vec![0u8; 308];
            data.extend_from_slice(&0u32.to_le_bytes());
            data.extend_from_slice(&[0; 12]);
            data
        };
        fs::create_dir_all(dir.path().join("sfx/ambient")).unwrap();
        fs::write(dir.path().join("sfx/ambient/empty.sbf"), &sound).unwrap();

        let decoder = Decoder::new(&Config::new(dir.path()));
        let txs: Vec<String> = decoder
            .discover(Format::Txs)
            .unwrap()
            .iter()
            .map(|found| found.logical.to_string())
            .collect();
        assert_eq!(txs, ["tex/walls.txs", "tex/broken.txs", "tex/long.txs"]);

        assert!(decoder.discover(Format::Ogr).unwrap().is_empty());

        let sounds = decoder.discover(Format::Sbf).unwrap();
        assert_eq!(sounds.len(), 1);
        assert_eq!(sounds[0].logical, VirtualPath::new("ambient/empty.sbf"));
        let decoded = decoder.decode_located(Format::Sbf, &sounds[0]).unwrap();
        assert_eq!(decoded.root.lookup("soundbank_count"), Some(&Value::Int(0)));
        assert_eq!(
            sounds[0].output_path(Path::new("out/decoded"), Format::Sbf),
            Path::new("out/decoded/sfx/ambient/empty.sbf.json")
        );
    }

    #[test]
    fn test_same_name_in_two_roots_gets_two_outputs() {
        let dir = game_dir();
        let resources = dir.path().join("Resources");
        fs::remove_file(resources.join("objects.bin")).unwrap();
        write_zip(&resources.join("objects.bin"), &[("houses/a.bgf", &b"x"[..])]);
        write_zip(&resources.join("scenes.bin"), &[("houses/a.bgf", &b"y"[..])]);

        let decoder = Decoder::new(&Config::new(dir.path()));
        let found = decoder.discover(Format::Bgf).unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].logical, found[1].logical);

        let out = Path::new("decoded");
        assert_eq!(
            found[0].output_path(out, Format::Bgf),
            Path::new("decoded/objects/objects/houses/a.bgf.json")
        );
        assert_eq!(
            found[1].output_path(out, Format::Bgf),
            Path::new("decoded/objects/scenes/houses/a.bgf.json")
        );
    }

    #[test]
    fn test_bytes_touched_by_failed_attempts_still_count_as_unread() {
        let decoder = Decoder::new(&Config::default());
        let header = [0xAA, 0xAA, 0xAA, 0xAA];
        decoder.decode_bytes(Format::Ogr, &header, "empty.ogr").unwrap();

        let mut junk = header.to_vec();
        junk.extend_from_slice(&[0x41, 0x00]);
        match decoder.decode_bytes(Format::Ogr, &junk, "junk.ogr").unwrap_err() {
            Error::MalformedAsset { offset, found, .. } => {
                assert_eq!(offset, 4);
                assert!(found.contains("2 trailing"), "{found}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_decode_bytes_serializes() {
        let decoder = Decoder::new(&Config::default());
        let decoded = decoder
            .decode_bytes(Format::Txs, &txs_bytes(&["wall"], 1, 1), "walls.txs")
            .unwrap();
        let json = serde_json::to_value(&decoded).unwrap();
        assert_eq!(json["format"], "txs");
        assert_eq!(json["path"], "walls.txs");
        assert_eq!(json["root"]["texture_names"][0], "wall");
    }
}
