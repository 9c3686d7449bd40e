//! Export command implementation

use anyhow::{Context, Result};
use smc_zones::{Config, SqliteZoneStore};
use std::path::PathBuf;
use tracing::info;

pub fn run(config_path: String, output: PathBuf) -> Result<()> {
    let config = Config::from_file(&config_path)?;
    let store = SqliteZoneStore::open(&config.scanner.db_path, config.scanner.exchange.clone())?;

    let exported = store
        .export_json(&output)
        .with_context(|| format!("Failed to export zones to {}", output.display()))?;

    info!("Exported {} zones to {}", exported, output.display());
    Ok(())
}
