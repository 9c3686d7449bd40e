//! Fair value gap detection
//!
//! Three-candle imbalance: candle k and candle k+2 do not overlap. The scan
//! covers the base's last candle and the impulse run, so a gap opened
//! straight out of the base is found.

use crate::base::Base;
use crate::impulse::Impulse;
use crate::{Candle, Direction};

#[derive(Debug, Clone, PartialEq)]
pub struct FairValueGap {
    pub direction: Direction,
    /// Index of the first candle of the triple
    pub index: usize,
    /// Upper edge of the uncovered price range
    pub high: f64,
    /// Lower edge of the uncovered price range
    pub low: f64,
}

/// First gap in the departure candles whose direction matches the impulse
pub fn find_fair_value_gap(candles: &[Candle], base: &Base, impulse: &Impulse) -> Option<FairValueGap> {
    let end = impulse.end.min(candles.len().checked_sub(1)?);

    (base.end..end.saturating_sub(1)).find_map(|k| {
        let first = &candles[k];
        let third = &candles[k + 2];
        match impulse.direction {
            Direction::Up if first.high < third.low => Some(FairValueGap {
                direction: Direction::Up,
                index: k,
                high: third.low,
                low: first.high,
            }),
            Direction::Down if first.low > third.high => Some(FairValueGap {
                direction: Direction::Down,
                index: k,
                high: first.low,
                low: third.high,
            }),
            _ => None,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn candles(hl: &[(f64, f64)]) -> Vec<Candle> {
        let start = Utc.with_ymd_and_hms(2024, 1, 2, 9, 15, 0).unwrap();
        hl.iter()
            .enumerate()
            .map(|(i, &(h, l))| {
                Candle::new_unchecked(start + Duration::minutes(5 * i as i64), l, h, l, h, 1.0)
            })
            .collect()
    }

    fn base(end: usize) -> Base {
        Base { start: end, end, high: 100.2, low: 99.8, atr: 2.0 }
    }

    fn impulse(direction: Direction, start: usize, end: usize) -> Impulse {
        Impulse { direction, start, end, displacement: 8.0, ratio: 4.0, extreme: 0.0 }
    }

    #[test]
    fn test_bullish_gap_from_base() {
        let c = candles(&[(100.2, 99.8), (103.0, 100.0), (106.0, 103.5), (108.0, 105.0)]);
        let gap = find_fair_value_gap(&c, &base(0), &impulse(Direction::Up, 1, 3)).unwrap();
        assert_eq!(gap.index, 0);
        assert_eq!(gap.low, 100.2);
        assert_eq!(gap.high, 103.5);
    }

    #[test]
    fn test_bearish_gap_ignored_for_up_impulse() {
        let c = candles(&[(100.2, 99.8), (100.0, 97.0), (99.0, 95.0)]);
        assert!(find_fair_value_gap(&c, &base(0), &impulse(Direction::Up, 1, 2)).is_none());
        let gap = find_fair_value_gap(&c, &base(0), &impulse(Direction::Down, 1, 2)).unwrap();
        assert_eq!(gap.high, 99.8);
        assert_eq!(gap.low, 99.0);
    }

    #[test]
    fn test_overlapping_candles_have_no_gap() {
        let c = candles(&[(100.2, 99.8), (101.0, 99.9), (101.5, 100.1)]);
        assert!(find_fair_value_gap(&c, &base(0), &impulse(Direction::Up, 1, 2)).is_none());
    }

    #[test]
    fn test_single_candle_impulse_has_no_triple() {
        let c = candles(&[(100.2, 99.8), (110.0, 100.0)]);
        assert!(find_fair_value_gap(&c, &base(0), &impulse(Direction::Up, 1, 1)).is_none());
    }
}
