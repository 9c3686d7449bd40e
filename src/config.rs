//! Configuration management
//!
//! `DetectionConfig` is the explicit options structure handed to every
//! detection call. `Config` is the application file (JSON) that wraps it with
//! scanner and notification settings; notification credentials come from the
//! environment.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{SmcError, SmcResult};
use crate::zone::Probability;
use crate::Instrument;

/// Upper bound for every candle-count threshold
pub const MAX_WINDOW: usize = 500;

/// Thresholds for zone detection and scoring
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Maximum candles in a base (consolidation)
    pub base_max_candles: usize,
    /// Base high-low range must stay below this multiple of ATR
    pub base_range_atr_pct: f64,
    /// Departure must exceed this multiple of ATR for full impulse credit
    pub impulse_atr_mult: f64,
    pub atr_period: usize,
    /// Bars on each side for swing high/low detection
    pub lookback_swings: usize,
    /// Minimum score (4-6) for a zone to be reported. Zones below 4 have no
    /// probability label and are never reported.
    pub min_score: f64,
    /// Maximum candles in a departure run
    pub impulse_max_candles: usize,
    /// Impulses at or below this ATR multiple are discarded outright
    pub impulse_min_atr: f64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        DetectionConfig {
            base_max_candles: 5,
            base_range_atr_pct: 1.2,
            impulse_atr_mult: 3.5,
            atr_period: 14,
            lookback_swings: 5,
            min_score: 4.0,
            impulse_max_candles: 4,
            impulse_min_atr: 1.0,
        }
    }
}

impl DetectionConfig {
    pub fn validate(&self) -> SmcResult<()> {
        for (name, value) in [
            ("atr_period", self.atr_period),
            ("base_max_candles", self.base_max_candles),
            ("lookback_swings", self.lookback_swings),
            ("impulse_max_candles", self.impulse_max_candles),
        ] {
            if !(1..=MAX_WINDOW).contains(&value) {
                return Err(SmcError::Configuration(format!(
                    "{} must be within 1..={}, got {}",
                    name, MAX_WINDOW, value
                )));
            }
        }
        if !(self.base_range_atr_pct.is_finite() && self.base_range_atr_pct > 0.0) {
            return Err(SmcError::Configuration(format!(
                "base_range_atr_pct must be > 0, got {}",
                self.base_range_atr_pct
            )));
        }
        if !(self.impulse_min_atr.is_finite() && self.impulse_min_atr > 0.0) {
            return Err(SmcError::Configuration(format!(
                "impulse_min_atr must be > 0, got {}",
                self.impulse_min_atr
            )));
        }
        if !(self.impulse_atr_mult.is_finite() && self.impulse_atr_mult >= self.impulse_min_atr) {
            return Err(SmcError::Configuration(format!(
                "impulse_atr_mult ({}) must be >= impulse_min_atr ({})",
                self.impulse_atr_mult, self.impulse_min_atr
            )));
        }
        if !(Probability::MIN_SCORE..=6.0).contains(&self.min_score) {
            return Err(SmcError::Configuration(format!(
                "min_score must be within {}..=6, got {}",
                Probability::MIN_SCORE,
                self.min_score
            )));
        }
        Ok(())
    }

    /// Fewest candles worth fetching for a meaningful scan
    pub fn min_bars(&self) -> usize {
        self.atr_period
            .saturating_add(self.base_max_candles)
            .saturating_add(self.lookback_swings)
            .saturating_add(5)
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub detection: DetectionConfig,
    pub scanner: ScannerConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
}

impl Config {
    /// Load configuration from JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        dotenv::dotenv().ok();

        let contents = fs::read_to_string(path.as_ref()).context("Failed to read config file")?;
        let mut config: Config =
            serde_json::from_str(&contents).context("Failed to parse config JSON")?;

        // Load notification credentials from environment if not set
        if let Ok(token) = std::env::var("TELEGRAM_BOT_TOKEN") {
            config.telegram.bot_token = Some(token);
        }
        if let Ok(chat_id) = std::env::var("TELEGRAM_CHAT_ID") {
            config.telegram.chat_id = Some(chat_id);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> SmcResult<()> {
        self.detection.validate()?;
        self.scanner.validate()
    }
}

/// Scan cycle settings (caller-side orchestration)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    pub instruments: Vec<String>,
    #[serde(default = "default_exchange")]
    pub exchange: String,
    #[serde(default = "default_interval")]
    pub interval: String,
    #[serde(default = "default_lookback_days")]
    pub lookback_days: u32,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_db_path")]
    pub db_path: String,
    /// Delay between instruments in sequential mode
    #[serde(default = "default_scan_delay_ms")]
    pub scan_delay_ms: u64,
    /// Minimum score that triggers notifications
    #[serde(default = "default_alert_min_score")]
    pub alert_min_score: f64,
    #[serde(default)]
    pub parallel: bool,
}

fn default_exchange() -> String {
    "NSE".to_string()
}

fn default_interval() -> String {
    "5minute".to_string()
}

fn default_lookback_days() -> u32 {
    10
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_db_path() -> String {
    "state/zones.db".to_string()
}

fn default_scan_delay_ms() -> u64 {
    350
}

fn default_alert_min_score() -> f64 {
    5.0
}

impl Default for ScannerConfig {
    fn default() -> Self {
        ScannerConfig {
            instruments: Vec::new(),
            exchange: default_exchange(),
            interval: default_interval(),
            lookback_days: default_lookback_days(),
            data_dir: default_data_dir(),
            db_path: default_db_path(),
            scan_delay_ms: default_scan_delay_ms(),
            alert_min_score: default_alert_min_score(),
            parallel: false,
        }
    }
}

impl ScannerConfig {
    pub fn instruments(&self) -> Vec<Instrument> {
        self.instruments.iter().map(Instrument::new).collect()
    }

    pub fn validate(&self) -> SmcResult<()> {
        if self.lookback_days == 0 {
            return Err(SmcError::Configuration("lookback_days must be >= 1".into()));
        }
        if !(0.0..=6.0).contains(&self.alert_min_score) {
            return Err(SmcError::Configuration(format!(
                "alert_min_score must be within 0..=6, got {}",
                self.alert_min_score
            )));
        }
        Ok(())
    }
}

/// Telegram sink settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bot_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
    #[serde(default)]
    pub send_scan_summary: bool,
}

impl TelegramConfig {
    pub fn is_configured(&self) -> bool {
        matches!((&self.bot_token, &self.chat_id), (Some(t), Some(c)) if !t.is_empty() && !c.is_empty())
    }
}
