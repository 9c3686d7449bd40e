//! Volatility indicators
//!
//! True range and the rolling ATR that every downstream threshold is
//! expressed in.

use crate::error::{SmcError, SmcResult};
use crate::Candle;

/// Calculate Simple Moving Average
pub fn sma(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut result = Vec::with_capacity(values.len());

    for i in 0..values.len() {
        if period == 0 || i + 1 < period {
            result.push(None);
        } else {
            let sum: f64 = values[i + 1 - period..=i].iter().sum();
            result.push(Some(sum / period as f64));
        }
    }

    result
}

/// Calculate True Range
///
/// The first candle has no previous close, so its value is the plain
/// high-low span.
pub fn true_range(candles: &[Candle]) -> Vec<f64> {
    let mut tr = Vec::with_capacity(candles.len());

    for (i, c) in candles.iter().enumerate() {
        let tr_value = if i == 0 {
            c.high - c.low
        } else {
            let prev_close = candles[i - 1].close;
            let hl = c.high - c.low;
            let hc = (c.high - prev_close).abs();
            let lc = (c.low - prev_close).abs();
            hl.max(hc).max(lc)
        };
        tr.push(tr_value);
    }

    tr
}

/// Calculate Average True Range: simple mean of the trailing `period` true
/// ranges. Indices below `period` stay `None` so that every averaged value
/// has a previous close behind it.
pub fn atr(candles: &[Candle], period: usize) -> Vec<Option<f64>> {
    let tr = true_range(candles);
    sma(&tr, period)
        .into_iter()
        .enumerate()
        .map(|(i, v)| if i < period { None } else { v })
        .collect()
}

/// Per-candle ATR aligned by index with the candle series
#[derive(Debug, Clone)]
pub struct VolatilityContext {
    period: usize,
    values: Vec<Option<f64>>,
}

impl VolatilityContext {
    /// Compute ATR for the series; needs at least `period + 1` candles
    pub fn compute(candles: &[Candle], period: usize) -> SmcResult<Self> {
        if period == 0 {
            return Err(SmcError::Configuration("atr_period must be >= 1".into()));
        }
        if candles.len() < period.saturating_add(1) {
            return Err(SmcError::InsufficientData {
                required: period.saturating_add(1),
                available: candles.len(),
            });
        }

        Ok(Self {
            period,
            values: atr(candles, period),
        })
    }

    /// ATR at `index`, absent inside the warm-up window or out of range
    pub fn at(&self, index: usize) -> Option<f64> {
        self.values.get(index).copied().flatten()
    }

    pub fn period(&self) -> usize {
        self.period
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
