//! Supply & Demand Zone Detection
//!
//! Detects consolidation bases followed by strong displacement in OHLCV
//! series, scores them on six Smart Money Concepts criteria, tracks their
//! freshness, and keeps an idempotent record of every zone across repeated
//! scans.

pub mod base;
pub mod config;
pub mod data;
pub mod detector;
pub mod error;
pub mod fvg;
pub mod impulse;
pub mod indicators;
pub mod mitigation;
pub mod notifier;
pub mod scanner;
pub mod scoring;
pub mod store;
pub mod structure;
pub mod swings;
pub mod tracker;
pub mod types;
pub mod zone;

pub use config::{Config, DetectionConfig};
pub use detector::detect_zones;
pub use error::{SmcError, SmcResult};
pub use store::{SqliteZoneStore, ZoneStore};
pub use tracker::{TrackOutcome, ZoneTracker};
pub use types::*;
pub use zone::{Probability, PriceBand, Zone, ZoneKey, ZoneRecord, ZoneType};
