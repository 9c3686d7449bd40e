//! Detect command implementation
//!
//! Runs detection over one CSV file. Read-only: nothing is stored or sent.

use anyhow::{Context, Result};
use smc_zones::data::load_csv;
use smc_zones::{detect_zones, Config, DetectionConfig, Instrument};
use std::path::PathBuf;
use tracing::info;

pub fn run(file: PathBuf, instrument: String, config_path: Option<String>, json: bool) -> Result<()> {
    let detection = match config_path {
        Some(path) => {
            info!("Loading detection thresholds from: {}", path);
            Config::from_file(&path)?.detection
        }
        None => DetectionConfig::default(),
    };

    let candles = load_csv(&file).with_context(|| format!("Failed to load {}", file.display()))?;
    info!("Loaded {} candles from {}", candles.len(), file.display());

    let instrument = Instrument::new(instrument);
    let zones = detect_zones(&instrument, &candles, &detection)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&zones)?);
        return Ok(());
    }

    if zones.is_empty() {
        println!("No zones with score >= {:.1} found for {}", detection.min_score, instrument);
        return Ok(());
    }

    println!("\n{}", "=".repeat(110));
    println!("{} ZONES FOR {}", zones.len(), instrument);
    println!("{}", "=".repeat(110));
    println!(
        "{:<16} {:<7} {:>10} {:>10} {:>6} {:<12} {:>8} {:<4} {:<4} {:<6} Formed",
        "Key", "Type", "Low", "High", "Score", "Probability", "Impulse", "FVG", "BOS", "Fresh"
    );
    println!("{}", "-".repeat(110));

    for zone in &zones {
        println!(
            "{:<16} {:<7} {:>10.2} {:>10.2} {:>6.1} {:<12} {:>7.1}x {:<4} {:<4} {:<6} {}",
            zone.key.as_str(),
            zone.zone_type.as_str(),
            zone.band.low,
            zone.band.high,
            zone.score,
            zone.probability.as_str(),
            zone.impulse_ratio,
            yes_no(zone.fvg_present),
            yes_no(zone.bos_confirmed),
            yes_no(zone.is_fresh()),
            zone.datetime_start.format("%Y-%m-%d %H:%M")
        );
    }
    println!("{}", "=".repeat(110));

    Ok(())
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}
