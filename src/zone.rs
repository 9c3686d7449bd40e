//! Zone entity, identity key and the persisted record
//!
//! `Zone` is what detection produces. `ZoneRecord` is the durable form kept
//! by the store: it adds `first_seen`/`last_updated` and the alert latches,
//! and only exposes one-way transitions for the mutable flags.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use crate::scoring::ScoreCard;
use crate::Instrument;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoneType {
    Demand,
    Supply,
}

impl ZoneType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ZoneType::Demand => "demand",
            ZoneType::Supply => "supply",
        }
    }
}

impl fmt::Display for ZoneType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ZoneType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "demand" => Ok(ZoneType::Demand),
            "supply" => Ok(ZoneType::Supply),
            other => Err(format!("unknown zone type: {}", other)),
        }
    }
}

/// Reported probability label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Probability {
    High,
    #[serde(rename = "Medium-High")]
    MediumHigh,
}

impl Probability {
    /// Lowest score that gets a label
    pub const MIN_SCORE: f64 = 4.0;

    /// Label for a total score; `None` below `MIN_SCORE` (not reported)
    pub fn from_score(score: f64) -> Option<Self> {
        if score >= 5.0 {
            Some(Probability::High)
        } else if score >= Self::MIN_SCORE {
            Some(Probability::MediumHigh)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Probability::High => "High",
            Probability::MediumHigh => "Medium-High",
        }
    }
}

impl fmt::Display for Probability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Probability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "High" => Ok(Probability::High),
            "Medium-High" => Ok(Probability::MediumHigh),
            other => Err(format!("unknown probability label: {}", other)),
        }
    }
}

/// Inclusive price band of a zone
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceBand {
    pub high: f64,
    pub low: f64,
    pub mid: f64,
}

impl PriceBand {
    pub fn new(high: f64, low: f64) -> Self {
        let (high, low) = if high >= low { (high, low) } else { (low, high) };
        Self {
            high,
            low,
            mid: (high + low) / 2.0,
        }
    }

    /// Whether `[low, high]` touches the band (edges included)
    pub fn intersects(&self, low: f64, high: f64) -> bool {
        low <= self.high && high >= self.low
    }

    /// Strict overlap between two bands; bands sharing only an edge do not overlap
    pub fn overlaps(&self, other: &PriceBand) -> bool {
        self.low < other.high && self.high > other.low
    }

    pub fn height(&self) -> f64 {
        self.high - self.low
    }
}

/// Deterministic zone identity.
///
/// First 16 hex characters of SHA-256 over
/// `instrument|type|base start (RFC 3339 seconds)|high (2dp)|low (2dp)`.
/// Re-detecting the same base from a longer or shifted window yields the
/// same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ZoneKey(String);

impl ZoneKey {
    pub fn derive(
        instrument: &Instrument,
        zone_type: ZoneType,
        band: &PriceBand,
        datetime_start: DateTime<Utc>,
    ) -> Self {
        let input = format!(
            "{}|{}|{}|{:.2}|{:.2}",
            instrument,
            zone_type,
            datetime_start.to_rfc3339_opts(SecondsFormat::Secs, true),
            band.high,
            band.low
        );
        let digest = Sha256::digest(input.as_bytes());
        ZoneKey(hex::encode(digest)[..16].to_string())
    }

    /// Wrap a key read back from storage
    pub fn from_stored(key: impl Into<String>) -> Self {
        ZoneKey(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ZoneKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A detected supply/demand zone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub key: ZoneKey,
    pub instrument: Instrument,
    pub zone_type: ZoneType,
    pub band: PriceBand,
    /// 0..=6 in half-point steps
    pub score: f64,
    pub probability: Probability,
    /// Price has traded back into the band since formation
    pub mitigated: bool,
    pub fvg_present: bool,
    pub bos_confirmed: bool,
    pub impulse_ratio: f64,
    /// First base candle
    pub datetime_start: DateTime<Utc>,
    /// Last base candle
    pub datetime_end: DateTime<Utc>,
    /// Terminal impulse candle; mitigation only counts candles after it
    pub formed_at: DateTime<Utc>,
    /// Per-criterion breakdown, present on freshly detected zones only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score_card: Option<ScoreCard>,
}

impl Zone {
    pub fn is_fresh(&self) -> bool {
        !self.mitigated
    }
}

/// Durable zone state kept across scans
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneRecord {
    zone: Zone,
    first_seen: DateTime<Utc>,
    last_updated: DateTime<Utc>,
    alert_sent: bool,
    mitigation_alert_sent: bool,
}

impl ZoneRecord {
    /// First sighting of a zone
    pub fn new(mut zone: Zone, now: DateTime<Utc>) -> Self {
        zone.score_card = None;
        Self {
            zone,
            first_seen: now,
            last_updated: now,
            alert_sent: false,
            mitigation_alert_sent: false,
        }
    }

    /// Rebuild a record from stored columns
    pub fn from_parts(
        zone: Zone,
        first_seen: DateTime<Utc>,
        last_updated: DateTime<Utc>,
        alert_sent: bool,
        mitigation_alert_sent: bool,
    ) -> Self {
        Self {
            zone,
            first_seen,
            last_updated,
            alert_sent,
            mitigation_alert_sent,
        }
    }

    pub fn zone(&self) -> &Zone {
        &self.zone
    }

    pub fn key(&self) -> &ZoneKey {
        &self.zone.key
    }

    pub fn mitigated(&self) -> bool {
        self.zone.mitigated
    }

    pub fn first_seen(&self) -> DateTime<Utc> {
        self.first_seen
    }

    pub fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }

    pub fn alert_sent(&self) -> bool {
        self.alert_sent
    }

    pub fn mitigation_alert_sent(&self) -> bool {
        self.mitigation_alert_sent
    }

    pub(crate) fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.last_updated {
            self.last_updated = now;
        }
    }

    /// fresh -> mitigated; returns true only on the transition itself
    pub(crate) fn observe_mitigation(&mut self, mitigated: bool) -> bool {
        if mitigated && !self.zone.mitigated {
            self.zone.mitigated = true;
            return true;
        }
        false
    }

    pub(crate) fn latch_alert(&mut self) -> bool {
        !std::mem::replace(&mut self.alert_sent, true)
    }

    pub(crate) fn latch_mitigation_alert(&mut self) -> bool {
        !std::mem::replace(&mut self.mitigation_alert_sent, true)
    }
}
