//! List command handler

use anyhow::{Context, Result};
use gilde::{Config, Decoder, Format};

pub fn handle(config: &Config, format: Format) -> Result<()> {
    let decoder = Decoder::new(config);
    let assets = decoder
        .discover(format)
        .with_context(|| format!("Failed to list {} assets", format))?;

    for asset in &assets {
        println!("{}", asset.logical);
    }
    eprintln!("Found {} {} assets", assets.len(), format);

    Ok(())
}
