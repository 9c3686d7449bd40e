//! Candle data loading
//!
//! The scanner pulls candles through the `CandleSource` trait. The bundled
//! implementation reads per-instrument CSV files; any other feed (broker API,
//! database) can be plugged in behind the same trait.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{SmcError, SmcResult};
use crate::{Candle, Instrument};

// =============================================================================
// Candle Source
// =============================================================================

/// Supplier of time-ordered candles for one instrument
pub trait CandleSource: Send + Sync {
    /// Candles for `instrument` at `interval`, covering the trailing
    /// `lookback_days`. Failures surface as `SmcError::DataUnavailable`.
    fn fetch(&self, instrument: &Instrument, interval: &str, lookback_days: u32) -> SmcResult<Vec<Candle>>;
}

// =============================================================================
// CSV Data Loading
// =============================================================================

/// Load OHLCV data from CSV file
///
/// Columns: `datetime,open,high,low,close,volume`. The datetime may be
/// RFC 3339 or `%Y-%m-%d %H:%M:%S` (taken as UTC).
pub fn load_csv(path: impl AsRef<Path>) -> Result<Vec<Candle>> {
    let mut reader = csv::Reader::from_path(path.as_ref()).context("Failed to open CSV file")?;

    let mut candles = Vec::new();

    for (row_idx, result) in reader.records().enumerate() {
        let record = result.context(format!("Failed to read row {}", row_idx + 1))?;

        let dt_str = record.get(0).context("Missing datetime column")?;
        let timestamp = parse_datetime(dt_str).context(format!("Failed to parse datetime: {}", dt_str))?;

        let field = |idx: usize, name: &str| -> Result<f64> {
            record
                .get(idx)
                .context(format!("Missing {} column", name))?
                .trim()
                .parse()
                .context(format!("Failed to parse {} on row {}", name, row_idx + 1))
        };

        candles.push(Candle {
            timestamp,
            open: field(1, "open")?,
            high: field(2, "high")?,
            low: field(3, "low")?,
            close: field(4, "close")?,
            volume: field(5, "volume")?,
        });
    }

    Ok(candles)
}

fn parse_datetime(value: &str) -> Result<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = value.parse::<DateTime<Utc>>() {
        return Ok(dt);
    }
    let naive = chrono::NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")?;
    Ok(DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc))
}

/// Keep the candles within `days` of the newest one
pub fn trailing_window(mut candles: Vec<Candle>, days: u32) -> Vec<Candle> {
    let Some(last) = candles.last().map(|c| c.timestamp) else {
        return candles;
    };
    let cutoff = last - Duration::days(i64::from(days));
    let from = candles.partition_point(|c| c.timestamp < cutoff);
    candles.drain(..from);
    candles
}

/// Reads `{data_dir}/{instrument}_{interval}.csv`
#[derive(Debug, Clone)]
pub struct CsvCandleSource {
    data_dir: PathBuf,
}

impl CsvCandleSource {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
        }
    }

    pub fn path_for(&self, instrument: &Instrument, interval: &str) -> PathBuf {
        self.data_dir
            .join(format!("{}_{}.csv", instrument.as_str(), interval))
    }
}

impl CandleSource for CsvCandleSource {
    fn fetch(&self, instrument: &Instrument, interval: &str, lookback_days: u32) -> SmcResult<Vec<Candle>> {
        let path = self.path_for(instrument, interval);
        let unavailable = |reason: String| SmcError::DataUnavailable {
            instrument: instrument.to_string(),
            reason,
        };

        if !path.exists() {
            return Err(unavailable(format!("data file not found: {}", path.display())));
        }

        let mut candles = load_csv(&path).map_err(|e| unavailable(format!("{:#}", e)))?;
        candles.sort_by_key(|c| c.timestamp);
        candles.dedup_by_key(|c| c.timestamp);

        let candles = trailing_window(candles, lookback_days);
        debug!("Loaded {} candles for {} from {}", candles.len(), instrument, path.display());
        Ok(candles)
    }
}
