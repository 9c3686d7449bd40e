//! Scan command implementation

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use smc_zones::data::CsvCandleSource;
use smc_zones::notifier::build_notifier;
use smc_zones::scanner::{CycleSummary, Scanner};
use smc_zones::{Config, Instrument, SqliteZoneStore, ZoneStore};
use std::time::Duration;
use tracing::{debug, info};

pub fn run(
    config_path: String,
    instruments_override: Option<String>,
    interval: Option<u64>,
    parallel: bool,
) -> Result<()> {
    info!("Starting zone scan");

    let mut config = Config::from_file(&config_path)?;
    info!("Loaded configuration from: {}", config_path);

    if parallel {
        config.scanner.parallel = true;
    }

    let instruments: Vec<Instrument> = match instruments_override {
        Some(list) => {
            info!("Overriding instruments to: {}", list);
            list.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(Instrument::new)
                .collect()
        }
        None => config.scanner.instruments(),
    };
    if instruments.is_empty() {
        anyhow::bail!("No instruments to scan");
    }
    debug!("Instruments: {:?}", instruments);

    let store = SqliteZoneStore::open(&config.scanner.db_path, config.scanner.exchange.clone())
        .context("Failed to open zone store")?;
    let notifier = build_notifier(&config)?;
    let source = CsvCandleSource::new(&config.scanner.data_dir);

    let mut scanner = Scanner::new(
        Box::new(source),
        store,
        notifier,
        config.detection.clone(),
        config.scanner.clone(),
    );
    if interval.is_none() {
        scanner = scanner.with_progress(progress_bar(instruments.len()));
    }

    info!(
        "Scanning {} instruments ({} {}, {} days){}",
        instruments.len(),
        config.scanner.exchange,
        config.scanner.interval,
        config.scanner.lookback_days,
        if config.scanner.parallel { " in parallel" } else { "" }
    );

    loop {
        let summary = scanner.run_cycle(&instruments);
        print_summary(&summary);

        let counts = scanner.tracker().store().counts()?;
        info!(
            "Zone store: {} total, {} active, {} mitigated",
            counts.total, counts.active, counts.mitigated
        );

        match interval {
            Some(secs) => {
                info!("Next scan in {}s", secs);
                std::thread::sleep(Duration::from_secs(secs));
            }
            None => break,
        }
    }

    Ok(())
}

fn progress_bar(len: usize) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    pb.set_style(style);
    pb.set_message("Scanning...");
    pb
}

fn print_summary(summary: &CycleSummary) {
    println!("\n{}", "=".repeat(60));
    println!("SCAN SUMMARY");
    println!("{}", "=".repeat(60));
    println!("Instruments scanned: {:>8}", summary.instruments);
    println!("New zones:           {:>8}", summary.new_zones);
    println!("Mitigations:         {:>8}", summary.mitigations);
    println!("Skipped:             {:>8}", summary.skipped);
    println!("Errors:              {:>8}", summary.errors);
    println!("Duration:            {:>7.1}s", summary.duration.as_secs_f64());
    println!("{}", "=".repeat(60));
}
