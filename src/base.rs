//! Base (consolidation) classification
//!
//! A base is a run of 1..=`base_max_candles` candles whose combined high-low
//! range is below `base_range_atr_pct` x ATR at the run's last candle.

use crate::config::DetectionConfig;
use crate::indicators::VolatilityContext;
use crate::Candle;

/// Range-to-ATR ratio below which a base counts as tight
pub const TIGHT_BASE_ATR: f64 = 0.20;
/// Range-to-ATR ratio below which a base counts as moderately tight
pub const MODERATE_BASE_ATR: f64 = 0.40;

/// Tightness bucket of a base relative to ATR, best first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BaseTightness {
    Tight,
    Moderate,
    Loose,
}

impl BaseTightness {
    pub fn from_ratio(range_to_atr: f64) -> Self {
        if range_to_atr < TIGHT_BASE_ATR {
            BaseTightness::Tight
        } else if range_to_atr < MODERATE_BASE_ATR {
            BaseTightness::Moderate
        } else {
            BaseTightness::Loose
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Base {
    /// First candle index (inclusive)
    pub start: usize,
    /// Last candle index (inclusive)
    pub end: usize,
    pub high: f64,
    pub low: f64,
    /// ATR at the last candle
    pub atr: f64,
}

impl Base {
    pub fn candle_count(&self) -> usize {
        self.end - self.start + 1
    }

    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    pub fn range_to_atr(&self) -> f64 {
        self.range() / self.atr
    }

    pub fn tightness(&self) -> BaseTightness {
        BaseTightness::from_ratio(self.range_to_atr())
    }
}

/// Classify the base ending at `end`, if any.
///
/// Every qualifying run ending at `end` is a prefix-extension of the shorter
/// ones, so qualifying lengths form a contiguous range starting at 1. The
/// chosen run is the longest one that stays in the best tightness bucket
/// reached by any qualifying run.
pub fn classify_base(
    candles: &[Candle],
    atr: &VolatilityContext,
    end: usize,
    config: &DetectionConfig,
) -> Option<Base> {
    let atr_end = atr.at(end).filter(|v| *v > 0.0)?;
    let limit = config.base_range_atr_pct * atr_end;

    let mut best: Option<Base> = None;
    let mut high = f64::MIN;
    let mut low = f64::MAX;

    for len in 1..=config.base_max_candles.min(end + 1) {
        let start = end + 1 - len;
        high = high.max(candles[start].high);
        low = low.min(candles[start].low);

        if high - low >= limit {
            break;
        }

        let candidate = Base {
            start,
            end,
            high,
            low,
            atr: atr_end,
        };
        match &best {
            Some(b) if candidate.tightness() > b.tightness() => break,
            _ => best = Some(candidate),
        }
    }

    best
}
