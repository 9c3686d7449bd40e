//! Zone scoring
//!
//! Six independent criteria, each worth 0, 0.5 or 1 point. Points are kept
//! as half-point integers so totals are exact multiples of 0.5.

use serde::{Deserialize, Serialize};

use crate::base::BaseTightness;
use crate::config::DetectionConfig;
use crate::zone::Probability;

/// Impulse ratio above which half impulse credit is given
pub const IMPULSE_PARTIAL_ATR: f64 = 1.8;

/// Bases of at most this many candles count as clean
pub const CLEAN_BASE_MAX_CANDLES: usize = 2;

/// Signals feeding the score of one candidate zone
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreInputs {
    pub impulse_ratio: f64,
    /// Base range divided by ATR at the base's last candle
    pub base_range_to_atr: f64,
    pub fresh: bool,
    pub fvg_present: bool,
    pub bos_aligned: bool,
    pub base_candles: usize,
}

/// Per-criterion breakdown in half points (0, 1 or 2 each)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreCard {
    pub impulse: u8,
    pub tightness: u8,
    pub freshness: u8,
    pub fvg: u8,
    pub bos: u8,
    pub clean_base: u8,
}

impl ScoreCard {
    pub fn evaluate(inputs: &ScoreInputs, config: &DetectionConfig) -> Self {
        let impulse = if inputs.impulse_ratio > config.impulse_atr_mult {
            2
        } else if inputs.impulse_ratio > IMPULSE_PARTIAL_ATR {
            1
        } else {
            0
        };

        let tightness = match BaseTightness::from_ratio(inputs.base_range_to_atr) {
            BaseTightness::Tight => 2,
            BaseTightness::Moderate => 1,
            BaseTightness::Loose => 0,
        };

        ScoreCard {
            impulse,
            tightness,
            freshness: if inputs.fresh { 2 } else { 0 },
            fvg: if inputs.fvg_present { 2 } else { 0 },
            bos: if inputs.bos_aligned { 2 } else { 0 },
            clean_base: if inputs.base_candles <= CLEAN_BASE_MAX_CANDLES { 2 } else { 0 },
        }
    }

    /// Total in half points (0..=12)
    pub fn half_points(&self) -> u8 {
        self.impulse + self.tightness + self.freshness + self.fvg + self.bos + self.clean_base
    }

    /// Total score (0..=6)
    pub fn total(&self) -> f64 {
        f64::from(self.half_points()) / 2.0
    }

    pub fn probability(&self) -> Option<Probability> {
        Probability::from_score(self.total())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs() -> ScoreInputs {
        ScoreInputs {
            impulse_ratio: 4.0,
            base_range_to_atr: 0.1,
            fresh: true,
            fvg_present: true,
            bos_aligned: true,
            base_candles: 1,
        }
    }

    #[test]
    fn test_perfect_setup_scores_six() {
        let card = ScoreCard::evaluate(&inputs(), &DetectionConfig::default());
        assert_eq!(card.total(), 6.0);
        assert_eq!(card.probability(), Some(Probability::High));
    }

    #[test]
    fn test_weak_setup_is_not_reported() {
        let weak = ScoreInputs {
            impulse_ratio: 2.0,
            base_range_to_atr: 0.9,
            fresh: true,
            fvg_present: false,
            bos_aligned: false,
            base_candles: 4,
        };
        let card = ScoreCard::evaluate(&weak, &DetectionConfig::default());
        assert_eq!(card.impulse, 1);
        assert_eq!(card.tightness, 0);
        assert_eq!(card.total(), 1.5);
        assert_eq!(card.probability(), None);
    }

    #[test]
    fn test_impulse_threshold_follows_config() {
        let mut i = inputs();
        i.impulse_ratio = 3.2;
        let default = ScoreCard::evaluate(&i, &DetectionConfig::default());
        assert_eq!(default.impulse, 1);

        let relaxed = DetectionConfig {
            impulse_atr_mult: 3.0,
            ..Default::default()
        };
        assert_eq!(ScoreCard::evaluate(&i, &relaxed).impulse, 2);
    }

    #[test]
    fn test_moderate_base_and_mitigation() {
        let mut i = inputs();
        i.base_range_to_atr = 0.3;
        i.fresh = false;
        i.base_candles = 3;
        let card = ScoreCard::evaluate(&i, &DetectionConfig::default());
        assert_eq!(card.total(), 3.5);
        assert_eq!(card.probability(), None);
    }

    #[test]
    fn test_scores_are_bounded_half_steps() {
        for ratio in [0.0, 1.0, 1.9, 3.6] {
            for range in [0.1, 0.3, 1.0] {
                for flags in 0..8u8 {
                    for base_candles in [1, 3] {
                        let card = ScoreCard::evaluate(
                            &ScoreInputs {
                                impulse_ratio: ratio,
                                base_range_to_atr: range,
                                fresh: flags & 1 != 0,
                                fvg_present: flags & 2 != 0,
                                bos_aligned: flags & 4 != 0,
                                base_candles,
                            },
                            &DetectionConfig::default(),
                        );
                        let total = card.total();
                        assert!((0.0..=6.0).contains(&total));
                        assert_eq!((total * 2.0).fract(), 0.0);
                    }
                }
            }
        }
    }
}
