//! Break of structure detection

use crate::base::Base;
use crate::impulse::Impulse;
use crate::swings::{last_swing_before, SwingKind, SwingPoint};
use crate::zone::ZoneType;
use crate::Direction;

/// An impulse extreme that took out a prior swing level
#[derive(Debug, Clone, PartialEq)]
pub struct StructureBreak {
    pub direction: Direction,
    /// Price of the swing that was broken
    pub level: f64,
    pub swing_index: usize,
    /// Impulse extreme that broke the level
    pub extreme: f64,
}

impl StructureBreak {
    /// Up breaks validate demand zones, down breaks validate supply zones
    pub fn validates(&self, zone_type: ZoneType) -> bool {
        matches!(
            (self.direction, zone_type),
            (Direction::Up, ZoneType::Demand) | (Direction::Down, ZoneType::Supply)
        )
    }
}

/// Compare the impulse extreme with the last opposing swing before the base.
///
/// Up impulses are measured against the most recent swing high, down
/// impulses against the most recent swing low.
pub fn detect_structure_break(swings: &[SwingPoint], base: &Base, impulse: &Impulse) -> Option<StructureBreak> {
    let kind = match impulse.direction {
        Direction::Up => SwingKind::High,
        Direction::Down => SwingKind::Low,
    };
    let swing = last_swing_before(swings, kind, base.start)?;

    let broken = match impulse.direction {
        Direction::Up => impulse.extreme > swing.price,
        Direction::Down => impulse.extreme < swing.price,
    };
    broken.then(|| StructureBreak {
        direction: impulse.direction,
        level: swing.price,
        swing_index: swing.index,
        extreme: impulse.extreme,
    })
}
