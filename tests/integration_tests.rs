//! Integration tests for the zone detection and tracking pipeline
//!
//! These tests verify that all components work together correctly.

use approx::assert_relative_eq;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use smc_zones::config::ScannerConfig;
use smc_zones::data::CsvCandleSource;
use smc_zones::notifier::ZoneNotifier;
use smc_zones::scanner::{CycleSummary, Scanner};
use smc_zones::store::MemoryZoneStore;
use smc_zones::{
    detect_zones, Candle, DetectionConfig, Instrument, Probability, SmcError, SmcResult, SqliteZoneStore,
    ZoneRecord, ZoneStore, ZoneTracker, ZoneType,
};

// =============================================================================
// Test Utilities
// =============================================================================

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 2, 3, 45, 0).unwrap()
}

fn bar(i: usize, open: f64, high: f64, low: f64, close: f64) -> Candle {
    Candle::new(t0() + Duration::minutes(5 * i as i64), open, high, low, close, 1000.0).unwrap()
}

/// 40 five-minute candles holding one textbook demand zone:
///
/// - 0..=24: flat range 99-101 (ATR 2), with a 102 swing high at index 8
/// - 25: single-candle base 99.85-100.15
/// - 26..=28: three-candle rally to a 110 close, gap between 25 and 27
/// - 29..: drift around 110, never back near the base
fn demand_setup() -> Vec<Candle> {
    let mut candles = Vec::with_capacity(40);
    for i in 0..25 {
        let high = if i == 8 { 102.0 } else { 101.0 };
        candles.push(bar(i, 100.0, high, 99.0, 100.0));
    }
    candles.push(bar(25, 100.0, 100.15, 99.85, 100.0));
    candles.push(bar(26, 100.2, 103.0, 100.1, 102.8));
    candles.push(bar(27, 102.8, 106.0, 102.5, 105.8));
    candles.push(bar(28, 105.8, 110.5, 105.5, 110.0));
    candles.push(bar(29, 110.0, 110.3, 109.2, 109.5));
    for i in 30..40 {
        candles.push(bar(i, 110.0, 110.8, 109.2, 110.0));
    }
    candles
}

/// The demand setup reflected around 100: a supply zone at the same band
fn supply_setup() -> Vec<Candle> {
    demand_setup()
        .iter()
        .map(|c| {
            Candle::new(
                c.timestamp,
                200.0 - c.open,
                200.0 - c.low,
                200.0 - c.high,
                200.0 - c.close,
                c.volume,
            )
            .unwrap()
        })
        .collect()
}

/// Next candle trades back down into the base
fn with_retest(mut candles: Vec<Candle>) -> Vec<Candle> {
    let i = candles.len();
    candles.push(bar(i, 110.0, 110.0, 100.0, 101.0));
    candles
}

fn write_csv(dir: &Path, instrument: &str, candles: &[Candle]) {
    let mut text = String::from("datetime,open,high,low,close,volume\n");
    for c in candles {
        text.push_str(&format!(
            "{},{},{},{},{},{}\n",
            c.timestamp.format("%Y-%m-%d %H:%M:%S"),
            c.open,
            c.high,
            c.low,
            c.close,
            c.volume
        ));
    }
    fs::write(dir.join(format!("{}_5minute.csv", instrument)), text).unwrap();
}

fn temp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("smc_zones_it_{}_{}", name, std::process::id()));
    fs::create_dir_all(&dir).unwrap();
    dir
}

#[derive(Clone, Default)]
struct RecordingNotifier {
    events: Arc<Mutex<Vec<String>>>,
}

impl RecordingNotifier {
    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

impl ZoneNotifier for RecordingNotifier {
    fn notify_new_zone(&self, record: &ZoneRecord) -> SmcResult<()> {
        self.events.lock().unwrap().push(format!("new:{}", record.key()));
        Ok(())
    }

    fn notify_mitigation(&self, record: &ZoneRecord, mitigated_at: DateTime<Utc>) -> SmcResult<()> {
        self.events
            .lock()
            .unwrap()
            .push(format!("mitigated:{}@{}", record.key(), mitigated_at.format("%H:%M")));
        Ok(())
    }

    fn notify_scan_summary(&self, _summary: &CycleSummary) -> SmcResult<()> {
        Ok(())
    }
}

// =============================================================================
// Detection Tests
// =============================================================================

#[test]
fn test_clean_demand_zone_scores_six() {
    let inst = Instrument::new("RELIANCE");
    let candles = demand_setup();
    let zones = detect_zones(&inst, &candles, &DetectionConfig::default()).unwrap();

    assert_eq!(zones.len(), 1);
    let zone = &zones[0];
    assert_eq!(zone.zone_type, ZoneType::Demand);
    assert_eq!(zone.score, 6.0);
    assert_eq!(zone.probability, Probability::High);
    assert!(zone.is_fresh());
    assert!(zone.fvg_present);
    assert!(zone.bos_confirmed);
    assert_relative_eq!(zone.band.high, 100.15);
    assert_relative_eq!(zone.band.low, 99.85);
    assert_relative_eq!(zone.impulse_ratio, 10.0 / (31.8 / 14.0), epsilon = 1e-9);
    assert_eq!(zone.datetime_start, candles[25].timestamp);
    assert_eq!(zone.formed_at, candles[28].timestamp);

    let card = zone.score_card.unwrap();
    assert_eq!(card.half_points(), 12);
}

#[test]
fn test_mirrored_setup_yields_supply_zone() {
    let inst = Instrument::new("RELIANCE");
    let zones = detect_zones(&inst, &supply_setup(), &DetectionConfig::default()).unwrap();

    assert_eq!(zones.len(), 1);
    assert_eq!(zones[0].zone_type, ZoneType::Supply);
    assert_eq!(zones[0].score, 6.0);
    assert!(zones[0].bos_confirmed);

    let demand = detect_zones(&inst, &demand_setup(), &DetectionConfig::default()).unwrap();
    assert_ne!(zones[0].key, demand[0].key);
}

#[test]
fn test_detection_is_deterministic() {
    let inst = Instrument::new("INFY");
    let candles = demand_setup();
    let config = DetectionConfig::default();
    let first = detect_zones(&inst, &candles, &config).unwrap();
    let second = detect_zones(&inst, &candles, &config).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_shifted_window_keeps_zone_key() {
    let inst = Instrument::new("INFY");
    let candles = demand_setup();
    let config = DetectionConfig::default();
    let full = detect_zones(&inst, &candles, &config).unwrap();
    let shifted = detect_zones(&inst, &candles[3..], &config).unwrap();

    assert_eq!(full.len(), 1);
    assert_eq!(shifted.len(), 1);
    assert_eq!(full[0].key, shifted[0].key);
}

#[test]
fn test_retest_mitigates_and_costs_freshness() {
    let inst = Instrument::new("SBIN");
    let zones = detect_zones(&inst, &with_retest(demand_setup()), &DetectionConfig::default()).unwrap();

    assert_eq!(zones.len(), 1);
    assert!(zones[0].mitigated);
    assert_eq!(zones[0].score, 5.0);
    assert_eq!(zones[0].probability, Probability::High);
}

#[test]
fn test_min_score_filters_zones() {
    let config = DetectionConfig {
        min_score: 6.0,
        ..Default::default()
    };
    let inst = Instrument::new("SBIN");
    assert_eq!(detect_zones(&inst, &demand_setup(), &config).unwrap().len(), 1);
    assert!(detect_zones(&inst, &with_retest(demand_setup()), &config)
        .unwrap()
        .is_empty());
}

#[test]
fn test_short_and_flat_series() {
    let inst = Instrument::new("TCS");
    let config = DetectionConfig::default();

    let short: Vec<Candle> = (0..10).map(|i| bar(i, 100.0, 101.0, 99.0, 100.0)).collect();
    assert!(matches!(
        detect_zones(&inst, &short, &config),
        Err(SmcError::InsufficientData { required: 15, available: 10 })
    ));

    let flat: Vec<Candle> = (0..60).map(|i| bar(i, 100.0, 101.0, 99.0, 100.0)).collect();
    assert!(detect_zones(&inst, &flat, &config).unwrap().is_empty());
}

#[test]
fn test_unordered_series_is_rejected() {
    let mut candles = demand_setup();
    candles.swap(10, 11);
    let result = detect_zones(&Instrument::new("TCS"), &candles, &DetectionConfig::default());
    assert!(matches!(result, Err(SmcError::InvalidSeries(_))));
}

// =============================================================================
// Tracking Tests
// =============================================================================

#[test]
fn test_repeated_tracking_is_idempotent() {
    let inst = Instrument::new("HDFCBANK");
    let candles = demand_setup();
    let zones = detect_zones(&inst, &candles, &DetectionConfig::default()).unwrap();
    let tracker = ZoneTracker::new(SqliteZoneStore::open_in_memory("NSE").unwrap());

    let first = tracker.sync(&inst, &zones, &candles).unwrap();
    assert_eq!(first.new_zones().count(), 1);

    let second = tracker.sync(&inst, &zones, &candles).unwrap();
    assert_eq!(second.new_zones().count(), 0);
    assert_eq!(second.mitigations().count(), 0);

    let counts = tracker.store().counts().unwrap();
    assert_eq!(counts.total, 1);
    assert_eq!(counts.active, 1);

    let stored = tracker.store().get(&zones[0].key).unwrap().unwrap();
    assert_eq!(stored.zone().score, 6.0);
    assert!(!stored.mitigated());
}

#[test]
fn test_mitigation_is_reported_once() {
    let inst = Instrument::new("HDFCBANK");
    let config = DetectionConfig::default();
    let tracker = ZoneTracker::new(SqliteZoneStore::open_in_memory("NSE").unwrap());

    let candles = demand_setup();
    let zones = detect_zones(&inst, &candles, &config).unwrap();
    tracker.sync(&inst, &zones, &candles).unwrap();

    let retested = with_retest(candles);
    let zones = detect_zones(&inst, &retested, &config).unwrap();
    let report = tracker.sync(&inst, &zones, &retested).unwrap();
    assert_eq!(report.mitigations().count(), 1);
    assert_eq!(report.new_zones().count(), 0);

    let again = tracker.sync(&inst, &zones, &retested).unwrap();
    assert_eq!(again.mitigations().count(), 0);

    // a stale series without the retest cannot undo the mitigation
    let stale = demand_setup();
    let zones = detect_zones(&inst, &stale, &config).unwrap();
    let report = tracker.sync(&inst, &zones, &stale).unwrap();
    assert!(report.outcomes.iter().all(|o| o.record.mitigated()));

    let stored = tracker.store().get(&zones[0].key).unwrap().unwrap();
    assert!(stored.mitigated());
    // the first-seen score is kept
    assert_eq!(stored.zone().score, 6.0);
}

#[test]
fn test_undetected_stored_zone_is_still_mitigated() {
    let inst = Instrument::new("AXISBANK");
    let tracker = ZoneTracker::new(MemoryZoneStore::new());

    let candles = demand_setup();
    let zones = detect_zones(&inst, &candles, &DetectionConfig::default()).unwrap();
    tracker.sync(&inst, &zones, &candles).unwrap();

    // detection now filtered out entirely; only the stored zone remains
    let report = tracker.sync(&inst, &[], &with_retest(candles)).unwrap();
    assert_eq!(report.mitigations().count(), 1);
    assert!(tracker.store().active_zones(Some(&inst)).unwrap().is_empty());
}

// =============================================================================
// Scanner Tests
// =============================================================================

#[test]
fn test_scan_cycles_alert_once_per_event() {
    let dir = temp_dir("scan");
    write_csv(&dir, "RELIANCE", &demand_setup());
    write_csv(&dir, "TCS", &supply_setup());

    let notifier = RecordingNotifier::default();
    let settings = ScannerConfig {
        instruments: vec!["RELIANCE".into(), "TCS".into(), "MISSING".into()],
        data_dir: dir.to_string_lossy().into_owned(),
        scan_delay_ms: 0,
        ..Default::default()
    };
    let instruments = settings.instruments();
    let scanner = Scanner::new(
        Box::new(CsvCandleSource::new(&dir)),
        SqliteZoneStore::open_in_memory("NSE").unwrap(),
        Box::new(notifier.clone()),
        DetectionConfig::default(),
        settings,
    );

    let summary = scanner.run_cycle(&instruments);
    assert_eq!(summary.instruments, 3);
    assert_eq!(summary.new_zones, 2);
    assert_eq!(summary.errors, 1);
    assert_eq!(notifier.events().len(), 2);

    let summary = scanner.run_cycle(&instruments);
    assert_eq!(summary.new_zones, 0);
    assert_eq!(notifier.events().len(), 2);

    write_csv(&dir, "RELIANCE", &with_retest(demand_setup()));
    let summary = scanner.run_cycle(&instruments);
    assert_eq!(summary.mitigations, 1);

    let events = notifier.events();
    assert_eq!(events.len(), 3);
    // mitigated on the retest candle, index 40
    assert!(events[2].starts_with("mitigated:"));
    assert!(events[2].ends_with(&format!("@{}", bar(40, 110.0, 110.0, 100.0, 101.0).timestamp.format("%H:%M"))));

    let summary = scanner.run_cycle(&instruments);
    assert_eq!(summary.mitigations, 0);
    assert_eq!(notifier.events().len(), 3);

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_parallel_scan_matches_sequential() {
    let dir = temp_dir("parallel");
    write_csv(&dir, "RELIANCE", &demand_setup());
    write_csv(&dir, "TCS", &supply_setup());

    let settings = ScannerConfig {
        instruments: vec!["RELIANCE".into(), "TCS".into()],
        scan_delay_ms: 0,
        parallel: true,
        ..Default::default()
    };
    let instruments = settings.instruments();
    let scanner = Scanner::new(
        Box::new(CsvCandleSource::new(&dir)),
        MemoryZoneStore::new(),
        Box::new(RecordingNotifier::default()),
        DetectionConfig::default(),
        settings,
    );

    let summary = scanner.run_cycle(&instruments);
    assert_eq!(summary.new_zones, 2);
    assert_eq!(summary.errors, 0);

    let counts = scanner.tracker().store().counts().unwrap();
    assert_eq!(counts.active, 2);

    fs::remove_dir_all(&dir).ok();
}
