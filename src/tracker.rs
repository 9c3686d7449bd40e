//! Zone tracker
//!
//! The only component that writes zone state. Each zone moves
//! `unknown -> fresh -> mitigated` (or straight to mitigated when first seen
//! after price already returned); nothing moves back. The alert latches are
//! set at most once. Every transition goes through one atomic store update,
//! so a failed write leaves the previous record in place.

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use tracing::{debug, error, info};

use crate::error::{SmcError, SmcResult};
use crate::mitigation::evaluate_zone;
use crate::store::ZoneStore;
use crate::zone::{Zone, ZoneKey, ZoneRecord};
use crate::{Candle, Instrument};

/// Result of tracking one zone
#[derive(Debug, Clone, PartialEq)]
pub struct TrackOutcome {
    /// Stored state after the update
    pub record: ZoneRecord,
    /// No record existed before this call
    pub is_new: bool,
    /// This call moved the zone from fresh to mitigated
    pub just_mitigated: bool,
}

/// Per-zone failure; other zones of the batch are unaffected
#[derive(Debug)]
pub struct TrackFailure {
    pub key: ZoneKey,
    pub error: SmcError,
}

#[derive(Debug, Default)]
pub struct TrackReport {
    pub outcomes: Vec<TrackOutcome>,
    pub failures: Vec<TrackFailure>,
}

impl TrackReport {
    pub fn new_zones(&self) -> impl Iterator<Item = &TrackOutcome> {
        self.outcomes.iter().filter(|o| o.is_new)
    }

    pub fn mitigations(&self) -> impl Iterator<Item = &TrackOutcome> {
        self.outcomes.iter().filter(|o| o.just_mitigated)
    }

    fn record(&mut self, key: &ZoneKey, result: SmcResult<TrackOutcome>) {
        match result {
            Ok(outcome) => self.outcomes.push(outcome),
            Err(e) => {
                error!("Failed to track zone {}: {}", key, e);
                self.failures.push(TrackFailure {
                    key: key.clone(),
                    error: e,
                });
            }
        }
    }
}

pub struct ZoneTracker<S> {
    store: S,
}

impl<S: ZoneStore> ZoneTracker<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Insert a newly seen zone or refresh an existing one
    pub fn upsert(&self, zone: &Zone) -> SmcResult<TrackOutcome> {
        self.upsert_at(zone, Utc::now())
    }

    pub fn upsert_at(&self, zone: &Zone, now: DateTime<Utc>) -> SmcResult<TrackOutcome> {
        let mut is_new = false;
        let mut just_mitigated = false;

        let stored = self.store.update(&zone.key, &mut |current| {
            match current {
                None => {
                    is_new = true;
                    just_mitigated = false;
                    Some(ZoneRecord::new(zone.clone(), now))
                }
                Some(mut record) => {
                    is_new = false;
                    just_mitigated = record.observe_mitigation(zone.mitigated);
                    record.touch(now);
                    Some(record)
                }
            }
        })?;

        let record = stored.ok_or_else(|| {
            SmcError::Persistence(format!("zone {} missing after upsert", zone.key))
        })?;

        if is_new {
            info!(
                "New {} zone {} {} [{:.2} - {:.2}] score={:.1} {}{}",
                record.zone().zone_type,
                record.zone().instrument,
                record.key(),
                record.zone().band.low,
                record.zone().band.high,
                record.zone().score,
                record.zone().probability,
                if record.mitigated() { " (already mitigated)" } else { "" }
            );
        } else if just_mitigated {
            info!(
                "Zone mitigated: {} {} {} [{:.2} - {:.2}]",
                record.zone().instrument,
                record.zone().zone_type,
                record.key(),
                record.zone().band.low,
                record.zone().band.high
            );
        } else {
            debug!("Zone refreshed: {}", record.key());
        }

        Ok(TrackOutcome {
            record,
            is_new,
            just_mitigated,
        })
    }

    /// Upsert a batch of detected zones; failures are reported per zone
    pub fn track_zones(&self, detected: &[Zone]) -> TrackReport {
        self.track_zones_at(detected, Utc::now())
    }

    pub fn track_zones_at(&self, detected: &[Zone], now: DateTime<Utc>) -> TrackReport {
        let mut report = TrackReport::default();
        for zone in detected {
            report.record(&zone.key, self.upsert_at(zone, now));
        }
        report
    }

    /// Check a stored zone against `candles` and apply a fresh -> mitigated
    /// transition if price has since traded into it
    pub fn reevaluate_at(&self, key: &ZoneKey, candles: &[Candle], now: DateTime<Utc>) -> SmcResult<TrackOutcome> {
        let mut just_mitigated = false;

        let stored = self.store.update(key, &mut |current| {
            let mut record = current?;
            just_mitigated = !record.mitigated() && evaluate_zone(record.zone(), candles);
            record.observe_mitigation(just_mitigated);
            record.touch(now);
            Some(record)
        })?;

        let record = stored.ok_or_else(|| SmcError::ZoneNotFound(key.to_string()))?;
        if just_mitigated {
            info!(
                "Stored zone mitigated: {} {} {} [{:.2} - {:.2}]",
                record.zone().instrument,
                record.zone().zone_type,
                record.key(),
                record.zone().band.low,
                record.zone().band.high
            );
        }

        Ok(TrackOutcome {
            record,
            is_new: false,
            just_mitigated,
        })
    }

    /// Full per-instrument pass: upsert the detected zones, then re-evaluate
    /// every other stored fresh zone of the instrument against `candles`.
    ///
    /// Zones that lose their freshness point can drop below the reporting
    /// threshold and stop being detected; the second pass still catches
    /// their mitigation.
    pub fn sync(&self, instrument: &Instrument, detected: &[Zone], candles: &[Candle]) -> SmcResult<TrackReport> {
        self.sync_at(instrument, detected, candles, Utc::now())
    }

    pub fn sync_at(
        &self,
        instrument: &Instrument,
        detected: &[Zone],
        candles: &[Candle],
        now: DateTime<Utc>,
    ) -> SmcResult<TrackReport> {
        // stored zones are read before any write
        let stored = self.store.active_zones(Some(instrument))?;
        let mut report = self.track_zones_at(detected, now);

        let seen: HashSet<&ZoneKey> = detected.iter().map(|z| &z.key).collect();
        for record in stored.iter().filter(|r| !seen.contains(r.key())) {
            report.record(record.key(), self.reevaluate_at(record.key(), candles, now));
        }

        debug!(
            "{}: tracked {} zones ({} new, {} mitigated, {} failed)",
            instrument,
            report.outcomes.len(),
            report.new_zones().count(),
            report.mitigations().count(),
            report.failures.len()
        );
        Ok(report)
    }

    /// Latch the new-zone alert flag. Returns true only on the first call.
    pub fn mark_alert_sent(&self, key: &ZoneKey) -> SmcResult<bool> {
        self.latch(key, ZoneRecord::latch_alert)
    }

    /// Latch the mitigation alert flag. Returns true only on the first call.
    pub fn mark_mitigation_alert_sent(&self, key: &ZoneKey) -> SmcResult<bool> {
        self.latch(key, ZoneRecord::latch_mitigation_alert)
    }

    fn latch(&self, key: &ZoneKey, set: fn(&mut ZoneRecord) -> bool) -> SmcResult<bool> {
        let mut found = false;
        let mut changed = false;

        self.store.update(key, &mut |current| {
            let mut record = current?;
            found = true;
            changed = set(&mut record);
            changed.then_some(record)
        })?;

        if !found {
            return Err(SmcError::ZoneNotFound(key.to_string()));
        }
        Ok(changed)
    }
}
