//! Scan cycle orchestration
//!
//! Per instrument: fetch candles -> detect -> track -> alert. One
//! instrument's failure never stops the cycle; it is logged and counted in
//! the `CycleSummary`.

use chrono::Utc;
use indicatif::ProgressBar;
use rayon::prelude::*;
use std::thread::sleep;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::config::{DetectionConfig, ScannerConfig};
use crate::data::CandleSource;
use crate::detector::detect_zones;
use crate::error::{SmcError, SmcResult};
use crate::mitigation::first_mitigating_candle;
use crate::notifier::ZoneNotifier;
use crate::store::ZoneStore;
use crate::tracker::{TrackOutcome, ZoneTracker};
use crate::{Candle, Instrument};

/// What one instrument's scan produced
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanResult {
    pub candles: usize,
    pub zones_detected: usize,
    pub new_zones: usize,
    pub mitigations: usize,
    pub alerts_sent: usize,
    /// Per-zone tracking or notification failures
    pub failures: usize,
}

/// Aggregate of one full cycle over the watch list
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub instruments: usize,
    pub new_zones: usize,
    pub mitigations: usize,
    pub errors: usize,
    /// Instruments without enough history this cycle
    pub skipped: usize,
    pub duration: Duration,
}

impl CycleSummary {
    fn absorb(&mut self, instrument: &Instrument, result: &SmcResult<ScanResult>) {
        match result {
            Ok(r) => {
                self.new_zones += r.new_zones;
                self.mitigations += r.mitigations;
                self.errors += r.failures;
            }
            Err(SmcError::InsufficientData { required, available }) => {
                debug!("{}: skipped, {} of {} candles", instrument, available, required);
                self.skipped += 1;
            }
            Err(e) => {
                error!("{}: scan failed: {}", instrument, e);
                self.errors += 1;
            }
        }
    }
}

pub struct Scanner<S> {
    source: Box<dyn CandleSource>,
    tracker: ZoneTracker<S>,
    notifier: Box<dyn ZoneNotifier>,
    detection: DetectionConfig,
    settings: ScannerConfig,
    progress: ProgressBar,
}

impl<S: ZoneStore> Scanner<S> {
    pub fn new(
        source: Box<dyn CandleSource>,
        store: S,
        notifier: Box<dyn ZoneNotifier>,
        detection: DetectionConfig,
        settings: ScannerConfig,
    ) -> Self {
        Self {
            source,
            tracker: ZoneTracker::new(store),
            notifier,
            detection,
            settings,
            progress: ProgressBar::hidden(),
        }
    }

    /// Report per-instrument progress on `progress` (hidden by default)
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    pub fn tracker(&self) -> &ZoneTracker<S> {
        &self.tracker
    }

    /// Run one scan over the instrument list and publish the summary
    pub fn run_cycle(&self, instruments: &[Instrument]) -> CycleSummary {
        let started = Instant::now();
        self.progress.set_length(instruments.len() as u64);
        self.progress.set_position(0);

        let results: Vec<(Instrument, SmcResult<ScanResult>)> = if self.settings.parallel {
            instruments
                .par_iter()
                .map(|instrument| {
                    let result = self.scan_instrument(instrument);
                    self.progress.inc(1);
                    (instrument.clone(), result)
                })
                .collect()
        } else {
            let delay = Duration::from_millis(self.settings.scan_delay_ms);
            instruments
                .iter()
                .enumerate()
                .map(|(i, instrument)| {
                    if i > 0 && !delay.is_zero() {
                        sleep(delay);
                    }
                    self.progress.set_message(instrument.to_string());
                    let result = self.scan_instrument(instrument);
                    self.progress.inc(1);
                    (instrument.clone(), result)
                })
                .collect()
        };

        let mut summary = CycleSummary {
            instruments: instruments.len(),
            ..Default::default()
        };
        for (instrument, result) in &results {
            summary.absorb(instrument, result);
        }
        summary.duration = started.elapsed();
        self.progress.finish_with_message(format!(
            "{} new, {} mitigated",
            summary.new_zones, summary.mitigations
        ));

        info!(
            "Cycle complete: {} instruments, {} new zones, {} mitigations, {} skipped, {} errors ({:.1}s)",
            summary.instruments,
            summary.new_zones,
            summary.mitigations,
            summary.skipped,
            summary.errors,
            summary.duration.as_secs_f64()
        );

        if let Err(e) = self.notifier.notify_scan_summary(&summary) {
            warn!("Failed to send scan summary: {}", e);
        }
        summary
    }

    /// Scan one instrument
    pub fn scan_instrument(&self, instrument: &Instrument) -> SmcResult<ScanResult> {
        let candles = self.source.fetch(
            instrument,
            &self.settings.interval,
            self.settings.lookback_days,
        )?;

        let required = self.detection.min_bars();
        if candles.len() < required {
            return Err(SmcError::InsufficientData {
                required,
                available: candles.len(),
            });
        }

        self.process(instrument, &candles)
    }

    /// Detect, track and alert on an already-fetched series
    pub fn process(&self, instrument: &Instrument, candles: &[Candle]) -> SmcResult<ScanResult> {
        let zones = detect_zones(instrument, candles, &self.detection)?;
        let report = self.tracker.sync(instrument, &zones, candles)?;

        let mut result = ScanResult {
            candles: candles.len(),
            zones_detected: zones.len(),
            new_zones: report.new_zones().count(),
            mitigations: report.mitigations().count(),
            failures: report.failures.len(),
            ..Default::default()
        };

        for outcome in &report.outcomes {
            match self.alert(outcome, candles) {
                Ok(sent) => result.alerts_sent += sent,
                Err(e) => {
                    warn!("{}: alert for zone {} failed: {}", instrument, outcome.record.key(), e);
                    result.failures += 1;
                }
            }
        }

        debug!(
            "{}: {} candles, {} zones, {} new, {} mitigated, {} alerts",
            instrument,
            result.candles,
            result.zones_detected,
            result.new_zones,
            result.mitigations,
            result.alerts_sent
        );
        Ok(result)
    }

    /// Send whichever alerts `outcome` calls for and latch them on delivery.
    /// An undelivered new-zone alert is retried on the next re-detection.
    fn alert(&self, outcome: &TrackOutcome, candles: &[Candle]) -> SmcResult<usize> {
        let record = &outcome.record;
        let zone = record.zone();
        if zone.score < self.settings.alert_min_score {
            return Ok(0);
        }

        let mut sent = 0;
        if !record.mitigated() && !record.alert_sent() {
            self.notifier.notify_new_zone(record)?;
            if self.tracker.mark_alert_sent(record.key())? {
                sent += 1;
            }
        }

        if outcome.just_mitigated && !record.mitigation_alert_sent() {
            let mitigated_at = first_mitigating_candle(&zone.band, zone.formed_at, candles)
                .map(|c| c.timestamp)
                .unwrap_or_else(Utc::now);
            self.notifier.notify_mitigation(record, mitigated_at)?;
            if self.tracker.mark_mitigation_alert_sent(record.key())? {
                sent += 1;
            }
        }
        Ok(sent)
    }
}
