//! Error types for zone detection and tracking

use thiserror::Error;

/// Errors raised by the detection engine and its collaborators
#[derive(Debug, Error)]
pub enum SmcError {
    /// Not enough candles for the requested computation. Local to one
    /// instrument; the next cycle usually brings more history.
    #[error("insufficient data: need at least {required} candles, got {available}")]
    InsufficientData { required: usize, available: usize },

    /// Upstream candle source failure
    #[error("candle data unavailable for {instrument}: {reason}")]
    DataUnavailable { instrument: String, reason: String },

    /// Store read/write failure
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Out-of-range threshold or missing setting
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("invalid candle series: {0}")]
    InvalidSeries(String),

    #[error("zone not found: {0}")]
    ZoneNotFound(String),

    #[error("notification failed: {0}")]
    Notification(String),
}

impl From<rusqlite::Error> for SmcError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Persistence(err.to_string())
    }
}

impl From<serde_json::Error> for SmcError {
    fn from(err: serde_json::Error) -> Self {
        Self::Persistence(err.to_string())
    }
}

impl SmcError {
    /// Whether the failure only affects the current instrument's scan
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Configuration(_))
    }
}

pub type SmcResult<T> = Result<T, SmcError>;
