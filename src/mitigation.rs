//! Freshness / mitigation evaluation
//!
//! Pure function of a band, a formation time and a candle series. The
//! one-way latch lives in the tracker, not here.

use chrono::{DateTime, Utc};

use crate::zone::{PriceBand, Zone};
use crate::Candle;

/// First candle strictly after `formed_at` whose range touches the band
pub fn first_mitigating_candle<'a>(
    band: &PriceBand,
    formed_at: DateTime<Utc>,
    candles: &'a [Candle],
) -> Option<&'a Candle> {
    // candles are time-ordered; skip the formation history
    let from = candles.partition_point(|c| c.timestamp <= formed_at);
    candles[from..]
        .iter()
        .find(|c| band.intersects(c.low, c.high))
}

/// Whether any candle after formation traded into the band
pub fn is_mitigated(band: &PriceBand, formed_at: DateTime<Utc>, candles: &[Candle]) -> bool {
    first_mitigating_candle(band, formed_at, candles).is_some()
}

/// Evaluate a zone against a (possibly newer) candle series
pub fn evaluate_zone(zone: &Zone, candles: &[Candle]) -> bool {
    is_mitigated(&zone.band, zone.formed_at, candles)
}
