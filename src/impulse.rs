//! Impulse (departure move) classification

use crate::base::Base;
use crate::config::DetectionConfig;
use crate::indicators::VolatilityContext;
use crate::{Candle, Direction};

/// Directional run of candles leaving a base
#[derive(Debug, Clone, PartialEq)]
pub struct Impulse {
    pub direction: Direction,
    /// First departure candle (the one right after the base)
    pub start: usize,
    /// Terminal candle index (inclusive)
    pub end: usize,
    /// |close at end - close at base end|
    pub displacement: f64,
    /// Displacement in ATR multiples, ATR taken at `end`
    pub ratio: f64,
    /// Highest high of the run for up moves, lowest low for down moves
    pub extreme: f64,
}

impl Impulse {
    pub fn candle_count(&self) -> usize {
        self.end - self.start + 1
    }
}

/// Classify the departure following `base`.
///
/// The run starts at the candle after the base, takes its direction from that
/// candle's close against the base close, and extends while closes keep
/// moving that way, up to `impulse_max_candles`. Runs whose ratio does not
/// clear `impulse_min_atr` are discarded; the full `impulse_atr_mult`
/// threshold is applied by scoring.
pub fn classify_impulse(
    candles: &[Candle],
    atr: &VolatilityContext,
    base: &Base,
    config: &DetectionConfig,
) -> Option<Impulse> {
    let start = base.end + 1;
    let first = candles.get(start)?;
    let anchor = candles[base.end].close;

    let direction = if first.close > anchor {
        Direction::Up
    } else if first.close < anchor {
        Direction::Down
    } else {
        return None;
    };

    let mut end = start;
    while end + 1 < candles.len() && end + 1 - start < config.impulse_max_candles {
        let prev = candles[end].close;
        let next = candles[end + 1].close;
        let reversed = match direction {
            Direction::Up => next < prev,
            Direction::Down => next > prev,
        };
        if reversed {
            break;
        }
        end += 1;
    }

    let atr_end = atr.at(end).filter(|v| *v > 0.0)?;
    let displacement = (candles[end].close - anchor).abs();
    let ratio = displacement / atr_end;
    if ratio <= config.impulse_min_atr {
        return None;
    }

    let run = &candles[start..=end];
    let extreme = match direction {
        Direction::Up => run.iter().map(|c| c.high).fold(f64::MIN, f64::max),
        Direction::Down => run.iter().map(|c| c.low).fold(f64::MAX, f64::min),
    };

    Some(Impulse {
        direction,
        start,
        end,
        displacement,
        ratio,
        extreme,
    })
}
