//! Virtual paths over directories and archive containers
//!
//! The game keeps most assets inside zip-compatible `.bin` containers
//! (`Resources/objects.bin`, `Resources/animations.bin`, ...) while other
//! assets are loose files. [`VirtualPath`] addresses both the same way: a path
//! like `Resources/objects.bin/houses/ob_haus.bgf` names an entry inside an
//! archive, `gfx/Gilde_add_on_german.gfx` names a plain file.
//!
//! Archive handles are never cached: every operation opens the container,
//! does its work and closes it again, so a `VirtualPath` is `Send + Sync`
//! and concurrent reads of the same archive are safe.

use std::fmt;
use std::fs::{self, File};
use std::hash::{Hash, Hasher};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use serde::{Serialize, Serializer};
use tracing::debug;
use walkdir::WalkDir;
use zip::ZipArchive;

use crate::{Error, Result};

/// Suffixes of archive containers (compared case-insensitively)
pub const ARCHIVE_SUFFIXES: &[&str] = &[".bin", ".bin0", ".bin1"];

/// What a path resolves to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    /// A file on disk (or a path that does not exist yet)
    PlainFile,
    Directory,
    /// A path below an archive container
    ArchiveEntry,
    /// A `.bin`/`.bin0`/`.bin1` container, whether or not it exists
    ArchiveContainer,
}

/// Path to a file, directory, archive, or an entry inside an archive
///
/// Equality and hashing use [`VirtualPath::normalize`]: non-ASCII
/// characters are stripped, case is folded and `\` counts as `/`.
#[derive(Debug, Clone)]
pub struct VirtualPath {
    text: String,
}

impl VirtualPath {
    pub fn new(path: impl AsRef<Path>) -> Self {
        let text = path.as_ref().to_string_lossy().replace('\\', "/");
        Self { text }
    }

    /// Comparison key: ASCII only, lowercase, forward slashes, no `.` segments
    pub fn normalize(path: &str) -> String {
        let folded: String = path
            .chars()
            .filter(char::is_ascii)
            .map(|c| if c == '\\' { '/' } else { c.to_ascii_lowercase() })
            .collect();
        let absolute = folded.starts_with('/');
        let joined = folded
            .split('/')
            .filter(|s| !s.is_empty() && *s != ".")
            .collect::<Vec<_>>()
            .join("/");
        if absolute {
            format!("/{}", joined)
        } else {
            joined
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn to_path_buf(&self) -> PathBuf {
        PathBuf::from(&self.text)
    }

    pub fn normalized(&self) -> String {
        Self::normalize(&self.text)
    }

    pub fn is_absolute(&self) -> bool {
        Path::new(&self.text).is_absolute()
    }

    /// Path segments, ignoring empty and `.` segments
    pub fn segments(&self) -> Vec<&str> {
        self.text
            .split('/')
            .filter(|s| !s.is_empty() && *s != ".")
            .collect()
    }

    pub fn join(&self, other: impl AsRef<Path>) -> VirtualPath {
        let other = VirtualPath::new(other);
        if self.text.is_empty() {
            return other;
        }
        if other.text.is_empty() {
            return self.clone();
        }
        VirtualPath {
            text: format!("{}/{}", self.text.trim_end_matches('/'), other.text),
        }
    }

    pub fn file_name(&self) -> Option<&str> {
        self.segments().last().copied()
    }

    /// File name without its last suffix
    pub fn stem(&self) -> Option<&str> {
        let name = self.file_name()?;
        match name.rfind('.') {
            Some(0) | None => Some(name),
            Some(dot) => Some(&name[..dot]),
        }
    }

    /// Last suffix including the dot, as written
    pub fn suffix(&self) -> Option<&str> {
        let name = self.file_name()?;
        match name.rfind('.') {
            Some(0) | None => None,
            Some(dot) => Some(&name[dot..]),
        }
    }

    /// Same path with the last suffix replaced (or added)
    pub fn with_suffix(&self, suffix: &str) -> VirtualPath {
        let suffix = suffix.trim_start_matches('.');
        let Some(name) = self.file_name() else {
            return self.clone();
        };
        let stem_len = self.stem().map_or(name.len(), str::len);
        let cut = self.text.trim_end_matches('/').len() - (name.len() - stem_len);
        VirtualPath {
            text: format!("{}.{}", &self.text[..cut], suffix),
        }
    }

    /// Case-insensitive suffix check; `suffix` may be given with or without the dot
    pub fn has_suffix(&self, suffix: &str) -> bool {
        let wanted = suffix.trim_start_matches('.');
        self.suffix()
            .map(|own| Self::normalize(&own[1..]) == Self::normalize(wanted))
            .unwrap_or(false)
    }

    /// Case-insensitive stem comparison
    pub fn same_stem(&self, other: &VirtualPath) -> bool {
        match (self.stem(), other.stem()) {
            (Some(a), Some(b)) => Self::normalize(a) == Self::normalize(b),
            _ => false,
        }
    }

    pub fn is_archive(&self) -> bool {
        self.suffix()
            .map(|own| {
                ARCHIVE_SUFFIXES
                    .iter()
                    .any(|s| own.eq_ignore_ascii_case(s))
            })
            .unwrap_or(false)
    }

    /// Split an archive entry path into (container, entry inside it)
    pub fn archive_split(&self) -> Option<(VirtualPath, VirtualPath)> {
        let segments = self.segments();
        let prefix = if self.text.starts_with('/') { "/" } else { "" };
        for (i, segment) in segments.iter().enumerate().take(segments.len().saturating_sub(1)) {
            if VirtualPath::new(segment).is_archive() {
                let container = format!("{}{}", prefix, segments[..=i].join("/"));
                let entry = segments[i + 1..].join("/");
                return Some((VirtualPath { text: container }, VirtualPath { text: entry }));
            }
        }
        None
    }

    pub fn kind(&self) -> Kind {
        if self.is_archive() {
            Kind::ArchiveContainer
        } else if self.archive_split().is_some() {
            Kind::ArchiveEntry
        } else if Path::new(&self.text).is_dir() {
            Kind::Directory
        } else {
            Kind::PlainFile
        }
    }

    /// Container of an archive entry
    pub fn container(&self) -> Option<VirtualPath> {
        self.archive_split().map(|(container, _)| container)
    }

    /// Whether this path ends with `other`, compared segment by segment
    pub fn ends_with(&self, other: &VirtualPath) -> bool {
        let own = self.normalized();
        let other = other.normalized();
        let other = other.trim_start_matches('/');
        if other.is_empty() {
            return false;
        }
        own == other
            || own
                .strip_suffix(other)
                .is_some_and(|rest| rest.ends_with('/'))
    }

    /// This path relative to `root`, if it lies below it
    pub fn relative_to(&self, root: &VirtualPath) -> Option<VirtualPath> {
        let own = self.segments();
        let base = root.segments();
        if own.len() < base.len() {
            return None;
        }
        let under = own
            .iter()
            .zip(&base)
            .all(|(a, b)| Self::normalize(a) == Self::normalize(b));
        if !under || self.is_absolute() != root.is_absolute() {
            return None;
        }
        Some(VirtualPath {
            text: own[base.len()..].join("/"),
        })
    }

    /// Move this path from below `old_root` to below `new_root`
    pub fn rebase(&self, old_root: &VirtualPath, new_root: &VirtualPath) -> Result<VirtualPath> {
        let relative = self
            .relative_to(old_root)
            .ok_or_else(|| Error::NotUnderRoot {
                path: self.to_path_buf(),
                root: old_root.to_path_buf(),
            })?;
        Ok(new_root.join(relative.as_str()))
    }

    /// Drop the first segment; `None` when only one segment is left
    pub fn shift_left(&self) -> Option<VirtualPath> {
        let segments = self.segments();
        if segments.len() < 2 {
            return None;
        }
        Some(VirtualPath {
            text: segments[1..].join("/"),
        })
    }

    /// Whether `target` exists inside this directory or archive
    pub fn contains(&self, target: &VirtualPath) -> Result<bool> {
        if self.ends_with(target) {
            return Ok(true);
        }
        match self.kind() {
            Kind::Directory | Kind::ArchiveContainer => Ok(self.find(target, true)?.is_some()),
            Kind::PlainFile => Ok(false),
            Kind::ArchiveEntry => Err(Error::NotADirectoryOrArchive(self.to_path_buf())),
        }
    }

    /// Locate `target` inside this directory or archive
    ///
    /// Both directories and archives match files only, comparing normalized
    /// segments from the end. Directories are walked in file-name order,
    /// archives in central-directory order. Targets that step out with `..`
    /// are never found. With `relative` the result is relative to `self`,
    /// otherwise joined to it.
    pub fn find(&self, target: &VirtualPath, relative: bool) -> Result<Option<VirtualPath>> {
        let kind = self.kind();
        if kind == Kind::ArchiveEntry {
            return Err(Error::NotADirectoryOrArchive(self.to_path_buf()));
        }

        let target = if target.is_absolute() {
            match target.relative_to(self) {
                Some(inner) => inner,
                None => return Ok(None),
            }
        } else {
            target.clone()
        };
        let segments = target.segments();
        if segments.is_empty() || segments.contains(&"..") {
            return Ok(None);
        }

        let found = match kind {
            Kind::Directory => self.dir_find(&target),
            Kind::ArchiveContainer => self.archive_find(&target)?,
            Kind::PlainFile => {
                return Ok(self.ends_with(&target).then(|| self.clone()));
            }
            Kind::ArchiveEntry => None,
        };

        Ok(found.map(|inner| if relative { inner } else { self.join(inner.as_str()) }))
    }

    fn dir_find(&self, target: &VirtualPath) -> Option<VirtualPath> {
        let root = self.to_path_buf();
        WalkDir::new(&root)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| entry.path().strip_prefix(&root).ok().map(VirtualPath::new))
            .find(|relative| relative.ends_with(target))
    }

    fn archive_find(&self, target: &VirtualPath) -> Result<Option<VirtualPath>> {
        Ok(self
            .archive_names()?
            .into_iter()
            .map(VirtualPath::new)
            .find(|entry| entry.ends_with(target)))
    }

    /// Every file below this directory or inside this archive, relative to it
    pub fn list_entries(&self, suffix: Option<&str>) -> Result<Vec<VirtualPath>> {
        let entries: Vec<VirtualPath> = match self.kind() {
            Kind::Directory => {
                let root = self.to_path_buf();
                WalkDir::new(&root)
                    .sort_by_file_name()
                    .into_iter()
                    .filter_map(|entry| entry.ok())
                    .filter(|entry| entry.file_type().is_file())
                    .filter_map(|entry| {
                        entry.path().strip_prefix(&root).ok().map(VirtualPath::new)
                    })
                    .collect()
            }
            Kind::ArchiveContainer => self
                .archive_names()?
                .into_iter()
                .map(VirtualPath::new)
                .collect(),
            Kind::PlainFile | Kind::ArchiveEntry => {
                return Err(Error::NotADirectoryOrArchive(self.to_path_buf()));
            }
        };

        Ok(match suffix {
            Some(suffix) => entries.into_iter().filter(|e| e.has_suffix(suffix)).collect(),
            None => entries,
        })
    }

    /// Read the bytes of this file or archive entry
    pub fn read(&self) -> Result<Vec<u8>> {
        match self.archive_split() {
            Some((container, entry)) if !self.is_archive() => container.read_entry(&entry),
            _ => Ok(fs::read(self.to_path_buf())?),
        }
    }

    /// Read one entry of this archive into memory
    pub fn read_entry(&self, entry: &VirtualPath) -> Result<Vec<u8>> {
        let mut archive = self.open_archive()?;
        let index = self.entry_index(&mut archive, entry)?;
        let mut file = archive.by_index(index)?;
        let mut data = Vec::with_capacity(preallocation(file.size()));
        file.read_to_end(&mut data)?;
        Ok(data)
    }

    /// Unpack one entry below `output_root`, keeping its path inside the archive
    pub fn extract_one(&self, entry: &VirtualPath, output_root: &Path) -> Result<VirtualPath> {
        let mut archive = self.open_archive()?;
        let index = self.entry_index(&mut archive, entry)?;
        let written = extract_index(&mut archive, index, output_root)?;
        written.ok_or_else(|| Error::NotFound {
            container: self.to_path_buf(),
            target: entry.to_string(),
        })
    }

    /// Unpack every entry below `output_root`; returns the files written
    pub fn extract_all(&self, output_root: &Path) -> Result<Vec<VirtualPath>> {
        let mut archive = self.open_archive()?;
        let mut written = Vec::with_capacity(archive.len());
        for index in 0..archive.len() {
            if let Some(path) = extract_index(&mut archive, index, output_root)? {
                written.push(path);
            }
        }
        debug!(
            archive = %self,
            files = written.len(),
            output = %output_root.display(),
            "extracted archive"
        );
        Ok(written)
    }

    fn open_archive(&self) -> Result<ZipArchive<BufReader<File>>> {
        if self.kind() != Kind::ArchiveContainer {
            return Err(Error::NotADirectoryOrArchive(self.to_path_buf()));
        }
        let path = self.to_path_buf();
        let file = File::open(&path).map_err(|err| match err.kind() {
            io::ErrorKind::NotFound => Error::NotFound {
                container: path.parent().map(Path::to_path_buf).unwrap_or_default(),
                target: self.file_name().unwrap_or_default().to_string(),
            },
            _ => Error::Io(err),
        })?;
        Ok(ZipArchive::new(BufReader::new(file))?)
    }

    /// Names of all non-directory entries, in central-directory order
    fn archive_names(&self) -> Result<Vec<String>> {
        let mut archive = self.open_archive()?;
        let mut names = Vec::with_capacity(archive.len());
        for index in 0..archive.len() {
            let file = archive.by_index(index)?;
            if !file.is_dir() {
                names.push(file.name().to_string());
            }
        }
        Ok(names)
    }

    fn entry_index(
        &self,
        archive: &mut ZipArchive<BufReader<File>>,
        entry: &VirtualPath,
    ) -> Result<usize> {
        let wanted = entry.normalized();
        for index in 0..archive.len() {
            let file = archive.by_index(index)?;
            if !file.is_dir() && VirtualPath::normalize(file.name()) == wanted {
                return Ok(index);
            }
        }
        Err(Error::NotFound {
            container: self.to_path_buf(),
            target: entry.to_string(),
        })
    }
}

/// Write one archive entry to disk; directories and unsafe names yield `None`
fn extract_index(
    archive: &mut ZipArchive<BufReader<File>>,
    index: usize,
    output_root: &Path,
) -> Result<Option<VirtualPath>> {
    let mut file = archive.by_index(index)?;
    let Some(relative) = file.enclosed_name() else {
        return Ok(None);
    };
    let target = output_root.join(&relative);
    if file.is_dir() {
        fs::create_dir_all(&target)?;
        return Ok(None);
    }
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut out = File::create(&target)?;
    io::copy(&mut file, &mut out)?;
    Ok(Some(VirtualPath::new(relative)))
}

impl PartialEq for VirtualPath {
    fn eq(&self, other: &Self) -> bool {
        self.normalized() == other.normalized()
    }
}

impl Eq for VirtualPath {}

impl Hash for VirtualPath {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.normalized().hash(state);
    }
}

impl Serialize for VirtualPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.text)
    }
}

impl fmt::Display for VirtualPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl From<&str> for VirtualPath {
    fn from(path: &str) -> Self {
        VirtualPath::new(path)
    }
}

impl From<&Path> for VirtualPath {
    fn from(path: &Path) -> Self {
        VirtualPath::new(path)
    }
}

impl From<PathBuf> for VirtualPath {
    fn from(path: PathBuf) -> Self {
        VirtualPath::new(path)
    }
}

impl AsRef<Path> for VirtualPath {
    fn as_ref(&self) -> &Path {
        Path::new(&self.text)
    }
}

/// Upper bound on buffer space reserved from an entry's declared size
const MAX_PREALLOCATION: usize = 64 << 20;

fn preallocation(declared: u64) -> usize {
    usize::try_from(declared)
        .unwrap_or(usize::MAX)
        .min(MAX_PREALLOCATION)
}
