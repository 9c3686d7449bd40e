//! Swing high / swing low location
//!
//! A candle is a swing high when its high is the strict maximum of the
//! symmetric window `[i - w, i + w]`, and a swing low when its low is the
//! strict minimum. Candles closer than `w` bars to either end of the series
//! have no full window and never produce a swing.

use serde::{Deserialize, Serialize};

use crate::Candle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SwingKind {
    High,
    Low,
}

/// A confirmed local extreme
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SwingPoint {
    pub index: usize,
    pub kind: SwingKind,
    /// High for swing highs, low for swing lows
    pub price: f64,
}

/// Lazy, finite iterator over swing points in index order.
///
/// Clone before consuming (or build a new locator) to walk the series again.
#[derive(Debug, Clone)]
pub struct SwingLocator<'a> {
    candles: &'a [Candle],
    window: usize,
    index: usize,
    pending_low: Option<SwingPoint>,
}

impl<'a> SwingLocator<'a> {
    pub fn new(candles: &'a [Candle], window: usize) -> Self {
        Self {
            candles,
            window,
            index: window,
            pending_low: None,
        }
    }

    fn is_swing_high(&self, i: usize) -> bool {
        let high = self.candles[i].high;
        (i - self.window..=i + self.window)
            .filter(|&j| j != i)
            .all(|j| self.candles[j].high < high)
    }

    fn is_swing_low(&self, i: usize) -> bool {
        let low = self.candles[i].low;
        (i - self.window..=i + self.window)
            .filter(|&j| j != i)
            .all(|j| self.candles[j].low > low)
    }
}

impl Iterator for SwingLocator<'_> {
    type Item = SwingPoint;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(low) = self.pending_low.take() {
            return Some(low);
        }

        // a zero window would make every bar its own extreme
        if self.window == 0 {
            return None;
        }

        while self.index.saturating_add(self.window) < self.candles.len() {
            let i = self.index;
            self.index += 1;

            let low = self.is_swing_low(i).then(|| SwingPoint {
                index: i,
                kind: SwingKind::Low,
                price: self.candles[i].low,
            });

            if self.is_swing_high(i) {
                self.pending_low = low;
                return Some(SwingPoint {
                    index: i,
                    kind: SwingKind::High,
                    price: self.candles[i].high,
                });
            }
            if low.is_some() {
                return low;
            }
        }

        None
    }
}

/// Most recent swing of `kind` strictly before `before`
pub fn last_swing_before(swings: &[SwingPoint], kind: SwingKind, before: usize) -> Option<SwingPoint> {
    swings
        .iter()
        .rev()
        .find(|s| s.kind == kind && s.index < before)
        .copied()
}
