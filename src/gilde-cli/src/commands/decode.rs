//! Decode command handler
//!
//! Decodes assets in parallel and writes one JSON file per asset to
//! `<output>/decoded/<format dir>/<logical path>.json`; formats read from
//! several roots get one more directory level named after the root.
//! Failures are logged and counted; the rest of the batch continues.

use anyhow::{bail, Context, Result};
use gilde::pipeline::Located;
use gilde::{Config, Decoder, Format, VirtualPath};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// One asset to decode
#[derive(Debug, Clone, PartialEq, Eq)]
struct Job {
    format: Format,
    located: Located,
    /// JSON file the decoded tree is written to
    target: PathBuf,
}

impl Job {
    fn new(format: Format, located: Located, decoded_dir: &Path) -> Self {
        let target = located.output_path(decoded_dir, format);
        Self {
            format,
            located,
            target,
        }
    }
}

/// Jobs to run, plus the explicit paths that matched no asset
#[derive(Debug, Default)]
struct Plan {
    jobs: Vec<Job>,
    unresolved: usize,
}

/// Where decoded trees go
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sink {
    Stdout,
    /// JSON files below the decoded directory; existing ones are kept when caching
    Files { use_cache: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Decoded,
    Cached,
}

/// Expand the command line into jobs, one per output file
fn plan(
    decoder: &Decoder,
    paths: &[String],
    format: Option<Format>,
    all: bool,
    decoded_dir: &Path,
) -> Result<Plan> {
    let mut plan = Plan::default();

    if !paths.is_empty() {
        for path in paths {
            let path = VirtualPath::new(path);
            let format = match format {
                Some(format) => format,
                None => Format::detect(&path)
                    .with_context(|| format!("Could not determine format for {}", path))?,
            };
            match decoder.locate(format, &path) {
                Ok(located) => plan.jobs.push(Job::new(format, located, decoded_dir)),
                Err(e) => {
                    warn!("{} {}: {:#}", format, path, e);
                    plan.unresolved += 1;
                }
            }
        }
    } else {
        let formats: Vec<Format> = match (format, all) {
            (Some(format), _) => vec![format],
            (None, true) => Format::ALL.to_vec(),
            (None, false) => bail!("Nothing to decode: give asset paths, --format or --all"),
        };

        for format in formats {
            let found = decoder
                .discover(format)
                .with_context(|| format!("Failed to list {} assets", format))?;
            plan.jobs.extend(
                found
                    .into_iter()
                    .map(|located| Job::new(format, located, decoded_dir)),
            );
        }
    }

    // different spellings of one asset share an output file
    let mut seen = HashSet::new();
    plan.jobs.retain(|job| seen.insert(job.target.clone()));
    Ok(plan)
}

fn run(decoder: &Decoder, job: &Job, use_cache: bool) -> Result<Outcome> {
    if use_cache && job.target.exists() {
        debug!(path = %job.located.logical, "cached");
        return Ok(Outcome::Cached);
    }

    let decoded = decoder.decode_located(job.format, &job.located)?;
    let json = serde_json::to_string_pretty(&decoded)?;

    if let Some(parent) = job.target.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::write(&job.target, json)
        .with_context(|| format!("Failed to write {}", job.target.display()))?;

    Ok(Outcome::Decoded)
}

pub fn handle(
    config: &Config,
    paths: &[String],
    format: Option<Format>,
    all: bool,
    sink: Sink,
) -> Result<()> {
    let decoder = Decoder::new(config);
    let decoded_dir = config.decoded_dir();
    let Plan { jobs, unresolved } = plan(&decoder, paths, format, all, &decoded_dir)?;

    let use_cache = match sink {
        Sink::Stdout => {
            for job in &jobs {
                let decoded = decoder.decode_located(job.format, &job.located)?;
                println!("{}", serde_json::to_string_pretty(&decoded)?);
            }
            return Ok(());
        }
        Sink::Files { use_cache } => use_cache,
    };

    let pb = ProgressBar::new(jobs.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .context("Invalid progress template")?
            .progress_chars("#>-"),
    );

    let results: Vec<Result<Outcome>> = jobs
        .par_iter()
        .map(|job| {
            let result = run(&decoder, job, use_cache);
            if let Err(ref e) = result {
                pb.suspend(|| warn!("{} {}: {:#}", job.format, job.located.logical, e));
            }
            pb.inc(1);
            result
        })
        .collect();

    pb.finish_with_message("Done");

    let count = |outcome: Outcome| {
        results
            .iter()
            .filter(|r| matches!(r, Ok(o) if *o == outcome))
            .count()
    };
    let failed = unresolved + results.iter().filter(|r| r.is_err()).count();
    eprintln!(
        "Decoded: {}, Cached: {}, Failed: {}",
        count(Outcome::Decoded),
        count(Outcome::Cached),
        failed
    );
    eprintln!("Output: {}", decoded_dir.display());

    Ok(())
}
