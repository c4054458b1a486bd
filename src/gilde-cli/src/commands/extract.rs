//! Extract command handler
//!
//! Unpacks archive containers below `<output>/extracted/<archive name>/`.
//! Each archive gets its own destination, so archives are unpacked in
//! parallel.

use anyhow::{Context, Result};
use gilde::{Config, Format, VirtualPath};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Every archive container the formats read from, relative to the game directory
fn default_archives() -> Vec<PathBuf> {
    let mut archives: Vec<PathBuf> = Vec::new();
    for format in Format::ALL {
        for root in format.source_roots() {
            let path = PathBuf::from(root);
            if VirtualPath::new(&path).is_archive() && !archives.contains(&path) {
                archives.push(path);
            }
        }
    }
    archives
}

/// Paths that do not exist as given are looked up below the game directory
fn resolve_archive(config: &Config, archive: &Path) -> PathBuf {
    if archive.is_absolute() || archive.exists() {
        archive.to_path_buf()
    } else {
        config.game_file(archive)
    }
}

fn destination(base: &Path, archive: &Path) -> PathBuf {
    let name = archive
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "archive".to_string());
    base.join(name)
}

pub fn handle(config: &Config, archives: &[PathBuf], output: Option<&Path>) -> Result<()> {
    let archives = if archives.is_empty() {
        default_archives()
    } else {
        archives.to_vec()
    };
    let base = output.map_or_else(|| config.extracted_dir(), Path::to_path_buf);

    let pb = ProgressBar::new(archives.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .context("Invalid progress template")?
            .progress_chars("#>-"),
    );

    let results: Vec<Result<usize>> = archives
        .par_iter()
        .map(|archive| {
            let source = resolve_archive(config, archive);
            let target = destination(&base, &source);
            let result = VirtualPath::new(&source)
                .extract_all(&target)
                .map(|files| files.len())
                .with_context(|| format!("Failed to extract {}", source.display()));
            match &result {
                Ok(count) => info!(archive = %source.display(), files = count, "extracted"),
                Err(e) => warn!("{:#}", e),
            }
            pb.inc(1);
            result
        })
        .collect();

    pb.finish_with_message("Done");

    let files: usize = results.iter().filter_map(|r| r.as_ref().ok()).sum();
    let failed = results.iter().filter(|r| r.is_err()).count();
    eprintln!(
        "Extracted {} files from {} archives, Failed: {}",
        files,
        results.len() - failed,
        failed
    );

    Ok(())
}
