//! Zone event notifications
//!
//! `ZoneNotifier` is the outbound sink used by the scanner. A delivery error
//! is returned to the caller, which then leaves the alert latch unset so the
//! next cycle retries.

use chrono::{DateTime, Utc};
use serde_json::json;
use std::time::Duration as StdDuration;
use tracing::{debug, info, warn};

use crate::config::{Config, TelegramConfig};
use crate::error::{SmcError, SmcResult};
use crate::scanner::CycleSummary;
use crate::zone::{Zone, ZoneRecord, ZoneType};

const TELEGRAM_API_URL: &str = "https://api.telegram.org";
const REQUEST_TIMEOUT_SECS: u64 = 10;
const RULE: &str = "━━━━━━━━━━━━━━━━━━━━";

pub trait ZoneNotifier: Send + Sync {
    fn notify_new_zone(&self, record: &ZoneRecord) -> SmcResult<()>;

    fn notify_mitigation(&self, record: &ZoneRecord, mitigated_at: DateTime<Utc>) -> SmcResult<()>;

    fn notify_scan_summary(&self, summary: &CycleSummary) -> SmcResult<()>;
}

/// Telegram when credentials are configured, otherwise log output
pub fn build_notifier(config: &Config) -> SmcResult<Box<dyn ZoneNotifier>> {
    if config.telegram.is_configured() {
        let notifier = TelegramNotifier::new(
            &config.telegram,
            config.scanner.exchange.clone(),
            config.scanner.interval.clone(),
        )?;
        info!("Telegram notifier initialized");
        Ok(Box::new(notifier))
    } else {
        warn!("Telegram notifier disabled - missing TELEGRAM_BOT_TOKEN or TELEGRAM_CHAT_ID");
        Ok(Box::new(LogNotifier))
    }
}

// =============================================================================
// Message formatting
// =============================================================================

fn flag(value: bool) -> &'static str {
    if value {
        "✅"
    } else {
        "❌"
    }
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

pub fn format_new_zone(zone: &Zone, exchange: &str, interval: &str) -> String {
    let emoji = match zone.zone_type {
        ZoneType::Demand => "🟢",
        ZoneType::Supply => "🔴",
    };

    format!(
        "{} <b>NEW {} ZONE</b>\n\
         {}\n\
         📊 <b>{}</b> | {} | {}\n\
         💰 Zone: <code>{:.2} – {:.2}</code>\n\
         ⭐ Score: <b>{:.1}/6</b> | {}\n\
         📈 Impulse: {:.1}× ATR\n\
         🔍 Fresh: {} | FVG: {} | BOS: {}\n\
         📅 Formed: {}",
        emoji,
        zone.zone_type.as_str().to_uppercase(),
        RULE,
        escape_html(zone.instrument.as_str()),
        escape_html(exchange),
        escape_html(interval),
        zone.band.low,
        zone.band.high,
        zone.score,
        zone.probability,
        zone.impulse_ratio,
        flag(zone.is_fresh()),
        flag(zone.fvg_present),
        flag(zone.bos_confirmed),
        zone.datetime_start.format("%Y-%m-%d %H:%M"),
    )
}

pub fn format_mitigation(zone: &Zone, exchange: &str, interval: &str, mitigated_at: DateTime<Utc>) -> String {
    format!(
        "⚠️ <b>{} ZONE MITIGATED</b>\n\
         {}\n\
         📊 <b>{}</b> | {} | {}\n\
         💰 Zone: <code>{:.2} – {:.2}</code>\n\
         ⭐ Score: {:.1}/6 | {}\n\
         📅 Formed: {}\n\
         🕐 Mitigated: {}",
        zone.zone_type.as_str().to_uppercase(),
        RULE,
        escape_html(zone.instrument.as_str()),
        escape_html(exchange),
        escape_html(interval),
        zone.band.low,
        zone.band.high,
        zone.score,
        zone.probability,
        zone.datetime_start.format("%Y-%m-%d %H:%M"),
        mitigated_at.format("%Y-%m-%d %H:%M"),
    )
}

pub fn format_scan_summary(summary: &CycleSummary) -> String {
    format!(
        "📡 <b>Zone Scan Complete</b>\n\
         {}\n\
         📈 Instruments scanned: {}\n\
         🆕 New zones: {}\n\
         ⚠️ Mitigations: {}\n\
         ⏭ Skipped: {}\n\
         ❌ Errors: {}\n\
         ⏱ Duration: {:.1}s",
        RULE,
        summary.instruments,
        summary.new_zones,
        summary.mitigations,
        summary.skipped,
        summary.errors,
        summary.duration.as_secs_f64(),
    )
}

// =============================================================================
// Telegram
// =============================================================================

/// Sends HTML messages through the Telegram Bot API
pub struct TelegramNotifier {
    client: reqwest::blocking::Client,
    bot_token: String,
    chat_id: String,
    exchange: String,
    interval: String,
    send_scan_summary: bool,
}

impl TelegramNotifier {
    pub fn new(config: &TelegramConfig, exchange: String, interval: String) -> SmcResult<Self> {
        let (Some(bot_token), Some(chat_id)) = (config.bot_token.clone(), config.chat_id.clone()) else {
            return Err(SmcError::Configuration(
                "telegram bot_token and chat_id are required".into(),
            ));
        };

        let client = reqwest::blocking::Client::builder()
            .timeout(StdDuration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| SmcError::Configuration(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            bot_token,
            chat_id,
            exchange,
            interval,
            send_scan_summary: config.send_scan_summary,
        })
    }

    fn send(&self, text: &str) -> SmcResult<()> {
        let url = format!("{}/bot{}/sendMessage", TELEGRAM_API_URL, self.bot_token);
        let payload = json!({
            "chat_id": self.chat_id,
            "text": text,
            "parse_mode": "HTML",
            "disable_web_page_preview": true
        });

        // the URL carries the bot token; keep it out of error messages
        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .map_err(|e| SmcError::Notification(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_else(|_| "Unknown error".to_string());
            return Err(SmcError::Notification(format!(
                "telegram returned {}: {}",
                status, body
            )));
        }
        Ok(())
    }
}

impl ZoneNotifier for TelegramNotifier {
    fn notify_new_zone(&self, record: &ZoneRecord) -> SmcResult<()> {
        let zone = record.zone();
        self.send(&format_new_zone(zone, &self.exchange, &self.interval))?;
        info!(
            "Alert sent: {} {} @ {:.2}-{:.2} (score {:.1})",
            zone.instrument, zone.zone_type, zone.band.low, zone.band.high, zone.score
        );
        Ok(())
    }

    fn notify_mitigation(&self, record: &ZoneRecord, mitigated_at: DateTime<Utc>) -> SmcResult<()> {
        let zone = record.zone();
        self.send(&format_mitigation(zone, &self.exchange, &self.interval, mitigated_at))?;
        info!(
            "Mitigation alert sent: {} {} @ {:.2}-{:.2}",
            zone.instrument, zone.zone_type, zone.band.low, zone.band.high
        );
        Ok(())
    }

    fn notify_scan_summary(&self, summary: &CycleSummary) -> SmcResult<()> {
        if !self.send_scan_summary {
            debug!("Scan summary notifications disabled");
            return Ok(());
        }
        self.send(&format_scan_summary(summary))
    }
}

// =============================================================================
// Log sink
// =============================================================================

/// Writes zone events to the tracing output
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl ZoneNotifier for LogNotifier {
    fn notify_new_zone(&self, record: &ZoneRecord) -> SmcResult<()> {
        let zone = record.zone();
        info!(
            instrument = %zone.instrument,
            key = %zone.key,
            "NEW {} ZONE [{:.2} - {:.2}] score={:.1} {} impulse={:.1}x fvg={} bos={}",
            zone.zone_type.as_str().to_uppercase(),
            zone.band.low,
            zone.band.high,
            zone.score,
            zone.probability,
            zone.impulse_ratio,
            zone.fvg_present,
            zone.bos_confirmed
        );
        Ok(())
    }

    fn notify_mitigation(&self, record: &ZoneRecord, mitigated_at: DateTime<Utc>) -> SmcResult<()> {
        let zone = record.zone();
        info!(
            instrument = %zone.instrument,
            key = %zone.key,
            "{} ZONE MITIGATED [{:.2} - {:.2}] at {}",
            zone.zone_type.as_str().to_uppercase(),
            zone.band.low,
            zone.band.high,
            mitigated_at.format("%Y-%m-%d %H:%M")
        );
        Ok(())
    }

    fn notify_scan_summary(&self, summary: &CycleSummary) -> SmcResult<()> {
        info!(
            "Scan complete: {} instruments, {} new zones, {} mitigations, {} skipped, {} errors in {:.1}s",
            summary.instruments,
            summary.new_zones,
            summary.mitigations,
            summary.skipped,
            summary.errors,
            summary.duration.as_secs_f64()
        );
        Ok(())
    }
}
