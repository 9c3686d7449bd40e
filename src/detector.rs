//! Zone detection pipeline
//!
//! ATR -> swings -> base -> impulse -> {gap, structure} -> score ->
//! freshness, for every candidate base end in the series. Pure: no I/O and
//! no state beyond the inputs.

use tracing::debug;

use crate::base::classify_base;
use crate::config::DetectionConfig;
use crate::error::SmcResult;
use crate::fvg::find_fair_value_gap;
use crate::impulse::classify_impulse;
use crate::indicators::VolatilityContext;
use crate::mitigation::is_mitigated;
use crate::scoring::{ScoreCard, ScoreInputs};
use crate::structure::detect_structure_break;
use crate::swings::{SwingLocator, SwingPoint};
use crate::types::validate_series;
use crate::zone::{PriceBand, Zone, ZoneKey, ZoneType};
use crate::{Candle, Direction, Instrument};

/// Detect scored supply/demand zones in one instrument's candle series.
///
/// Returns zones at or above `min_score`, de-duplicated (overlapping bands
/// of the same type keep the best score) and ordered by base start time. An
/// empty vector means nothing qualified; errors mean detection itself failed.
pub fn detect_zones(instrument: &Instrument, candles: &[Candle], config: &DetectionConfig) -> SmcResult<Vec<Zone>> {
    config.validate()?;
    validate_series(candles)?;

    let atr = VolatilityContext::compute(candles, config.atr_period)?;
    let swings: Vec<SwingPoint> = SwingLocator::new(candles, config.lookback_swings).collect();

    let mut candidates = Vec::new();
    for end in config.atr_period..candles.len() {
        if let Some(zone) = evaluate_candidate(instrument, candles, &atr, &swings, end, config) {
            candidates.push(zone);
        }
    }

    let found = candidates.len();
    let zones = dedupe(candidates);
    debug!(
        "{}: {} candidate zones, {} after de-duplication",
        instrument,
        found,
        zones.len()
    );

    Ok(zones)
}

fn evaluate_candidate(
    instrument: &Instrument,
    candles: &[Candle],
    atr: &VolatilityContext,
    swings: &[SwingPoint],
    end: usize,
    config: &DetectionConfig,
) -> Option<Zone> {
    let base = classify_base(candles, atr, end, config)?;
    let impulse = classify_impulse(candles, atr, &base, config)?;

    let zone_type = match impulse.direction {
        Direction::Up => ZoneType::Demand,
        Direction::Down => ZoneType::Supply,
    };

    let fvg = find_fair_value_gap(candles, &base, &impulse);
    let bos_aligned = detect_structure_break(swings, &base, &impulse)
        .is_some_and(|b| b.validates(zone_type));

    let band = PriceBand::new(base.high, base.low);
    let formed_at = candles[impulse.end].timestamp;
    let mitigated = is_mitigated(&band, formed_at, candles);

    let card = ScoreCard::evaluate(
        &ScoreInputs {
            impulse_ratio: impulse.ratio,
            base_range_to_atr: base.range_to_atr(),
            fresh: !mitigated,
            fvg_present: fvg.is_some(),
            bos_aligned,
            base_candles: base.candle_count(),
        },
        config,
    );

    let score = card.total();
    if score < config.min_score {
        return None;
    }
    let probability = card.probability()?;

    let datetime_start = candles[base.start].timestamp;
    Some(Zone {
        key: ZoneKey::derive(instrument, zone_type, &band, datetime_start),
        instrument: instrument.clone(),
        zone_type,
        band,
        score,
        probability,
        mitigated,
        fvg_present: fvg.is_some(),
        bos_confirmed: bos_aligned,
        impulse_ratio: impulse.ratio,
        datetime_start,
        datetime_end: candles[base.end].timestamp,
        formed_at,
        score_card: Some(card),
    })
}

/// Keep the best-scoring zone among overlapping bands of the same type
fn dedupe(mut candidates: Vec<Zone>) -> Vec<Zone> {
    candidates.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then(a.datetime_start.cmp(&b.datetime_start))
    });

    let mut kept: Vec<Zone> = Vec::with_capacity(candidates.len());
    for zone in candidates {
        let overlaps = kept
            .iter()
            .any(|k| k.zone_type == zone.zone_type && k.band.overlaps(&zone.band));
        if !overlaps {
            kept.push(zone);
        }
    }

    kept.sort_by(|a, b| {
        a.datetime_start
            .cmp(&b.datetime_start)
            .then(a.zone_type.cmp(&b.zone_type))
    });
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SmcError;
    use crate::zone::tests::sample_zone;
    use chrono::TimeZone;

    #[test]
    fn test_too_short_series_is_insufficient() {
        let zones = detect_zones(&Instrument::new("X"), &[], &DetectionConfig::default());
        assert!(matches!(zones, Err(SmcError::InsufficientData { .. })));
    }

    #[test]
    fn test_invalid_config_is_rejected_before_work() {
        let config = DetectionConfig {
            lookback_swings: 0,
            ..Default::default()
        };
        let zones = detect_zones(&Instrument::new("X"), &[], &config);
        assert!(matches!(zones, Err(SmcError::Configuration(_))));
    }

    #[test]
    fn test_oversized_window_is_a_configuration_error() {
        let start = chrono::Utc.with_ymd_and_hms(2024, 1, 2, 9, 15, 0).unwrap();
        let candles: Vec<Candle> = (0..60)
            .map(|i| {
                let t = start + chrono::Duration::minutes(5 * i);
                Candle::new_unchecked(t, 100.0, 101.0, 99.0, 100.5, 1.0)
            })
            .collect();
        let config = DetectionConfig {
            lookback_swings: usize::MAX,
            ..Default::default()
        };
        let zones = detect_zones(&Instrument::new("X"), &candles, &config);
        assert!(matches!(zones, Err(SmcError::Configuration(_))));
    }

    #[test]
    fn test_dedupe_keeps_best_of_overlapping_same_type() {
        let mut weak = sample_zone("X", 110.0, 100.0);
        weak.score = 4.0;
        let mut strong = sample_zone("X", 112.0, 105.0);
        strong.score = 5.5;
        let mut supply = sample_zone("X", 111.0, 101.0);
        supply.zone_type = ZoneType::Supply;
        let separate = sample_zone("X", 130.0, 120.0);

        let kept = dedupe(vec![weak, strong.clone(), supply, separate]);
        assert_eq!(kept.len(), 3);
        assert!(kept.iter().any(|z| z.band == strong.band));
        assert!(kept.iter().any(|z| z.zone_type == ZoneType::Supply));
        assert!(!kept.iter().any(|z| z.score == 4.0));
    }
}
