//! Zones command implementation

use anyhow::Result;
use itertools::Itertools;
use smc_zones::{Config, Instrument, SqliteZoneStore, ZoneRecord, ZoneStore};
use tracing::info;

pub fn run(config_path: String, instrument: Option<String>, include_mitigated: bool) -> Result<()> {
    let config = Config::from_file(&config_path)?;
    let store = SqliteZoneStore::open(&config.scanner.db_path, config.scanner.exchange.clone())?;

    let instrument = instrument.map(Instrument::new);
    let mut records: Vec<ZoneRecord> = match (&instrument, include_mitigated) {
        (Some(inst), true) => store.zones_for_instrument(inst)?,
        (Some(inst), false) => store.active_zones(Some(inst))?,
        (None, true) => store.all_zones()?,
        (None, false) => store.active_zones(None)?,
    };
    records.sort_by(|a, b| {
        a.zone()
            .instrument
            .cmp(&b.zone().instrument)
            .then(b.zone().score.total_cmp(&a.zone().score))
    });

    let counts = store.counts()?;
    info!(
        "Zone store: {} total, {} active, {} mitigated",
        counts.total, counts.active, counts.mitigated
    );

    if records.is_empty() {
        println!("No zones tracked");
        return Ok(());
    }

    for (instrument, group) in &records.iter().chunk_by(|r| r.zone().instrument.clone()) {
        println!("\n{}", instrument);
        println!("{}", "-".repeat(96));
        for record in group {
            let zone = record.zone();
            println!(
                "  {:<16} {:<7} {:>10.2} - {:<10.2} {:>4.1} {:<12} {:<10} alert:{:<3} first seen {}",
                zone.key.as_str(),
                zone.zone_type.as_str(),
                zone.band.low,
                zone.band.high,
                zone.score,
                zone.probability.as_str(),
                if record.mitigated() { "mitigated" } else { "fresh" },
                if record.alert_sent() { "yes" } else { "no" },
                record.first_seen().format("%Y-%m-%d %H:%M")
            );
        }
    }

    Ok(())
}
