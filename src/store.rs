// Zone Store
// SQLite-based persistence with JSON export
//
// One row per zone identity key. The store only offers storage primitives;
// the fresh -> mitigated and alert latch rules are applied by the tracker
// through `update`, which runs read-modify-write atomically per key.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use crate::error::{SmcError, SmcResult};
use crate::zone::{PriceBand, Zone, ZoneKey, ZoneRecord};
use crate::Instrument;

/// Zone totals across all instruments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ZoneCounts {
    pub total: usize,
    pub active: usize,
    pub mitigated: usize,
}

/// Persistence contract used by the tracker
pub trait ZoneStore: Send + Sync {
    fn get(&self, key: &ZoneKey) -> SmcResult<Option<ZoneRecord>>;

    /// Insert a record, or refresh the mutable columns of an existing one.
    /// Identity, band, score and `first_seen` are kept from the first insert
    /// and the boolean flags never go back to false.
    fn put(&self, record: &ZoneRecord) -> SmcResult<()>;

    /// Atomically read the record for `key`, let `apply` decide on a new
    /// value and write it. `apply` returning `None` leaves the store as is.
    /// Writers to the same key are serialized; a failure leaves the stored
    /// record untouched.
    fn update(
        &self,
        key: &ZoneKey,
        apply: &mut dyn FnMut(Option<ZoneRecord>) -> Option<ZoneRecord>,
    ) -> SmcResult<Option<ZoneRecord>>;

    fn zones_for_instrument(&self, instrument: &Instrument) -> SmcResult<Vec<ZoneRecord>>;

    /// Non-mitigated zones, best score first
    fn active_zones(&self, instrument: Option<&Instrument>) -> SmcResult<Vec<ZoneRecord>>;

    fn counts(&self) -> SmcResult<ZoneCounts>;
}

// =============================================================================
// SQLite Store
// =============================================================================

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS zones (
    id                    INTEGER PRIMARY KEY AUTOINCREMENT,
    zone_key              TEXT    NOT NULL UNIQUE,
    instrument            TEXT    NOT NULL,
    exchange              TEXT    NOT NULL DEFAULT '',
    zone_type             TEXT    NOT NULL,
    zone_high             REAL    NOT NULL,
    zone_low              REAL    NOT NULL,
    zone_mid              REAL    NOT NULL,
    score                 REAL    NOT NULL,
    probability           TEXT    NOT NULL,
    mitigated             INTEGER NOT NULL DEFAULT 0,
    fvg_present           INTEGER NOT NULL DEFAULT 0,
    bos_confirmed         INTEGER NOT NULL DEFAULT 0,
    impulse_ratio         REAL    NOT NULL,
    datetime_start        TEXT    NOT NULL,
    datetime_end          TEXT    NOT NULL,
    formed_at             TEXT    NOT NULL,
    first_seen            TEXT    NOT NULL,
    last_updated          TEXT    NOT NULL,
    alert_sent            INTEGER NOT NULL DEFAULT 0,
    mitigation_alert_sent INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_zones_instrument ON zones (instrument);
CREATE INDEX IF NOT EXISTS idx_zones_mitigated  ON zones (mitigated);
CREATE INDEX IF NOT EXISTS idx_zones_alert      ON zones (alert_sent, mitigated);
";

const COLUMNS: &str = "zone_key, instrument, zone_type, zone_high, zone_low, zone_mid, score, \
     probability, mitigated, fvg_present, bos_confirmed, impulse_ratio, datetime_start, \
     datetime_end, formed_at, first_seen, last_updated, alert_sent, mitigation_alert_sent";

pub struct SqliteZoneStore {
    conn: Mutex<Connection>,
    exchange: String,
}

impl SqliteZoneStore {
    /// Open (or create) the zone database at `db_path`
    pub fn open<P: AsRef<Path>>(db_path: P, exchange: impl Into<String>) -> SmcResult<Self> {
        let db_path = db_path.as_ref();

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    SmcError::Persistence(format!("cannot create {}: {}", parent.display(), e))
                })?;
            }
        }

        let conn = Connection::open(db_path)?;
        // WAL lets readers (CLI listing) run next to the scanner
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.busy_timeout(std::time::Duration::from_secs(15))?;

        let store = Self::with_connection(conn, exchange)?;
        info!("Zone store initialized at {}", db_path.display());
        Ok(store)
    }

    /// Private in-memory database
    pub fn open_in_memory(exchange: impl Into<String>) -> SmcResult<Self> {
        Self::with_connection(Connection::open_in_memory()?, exchange)
    }

    fn with_connection(conn: Connection, exchange: impl Into<String>) -> SmcResult<Self> {
        conn.execute_batch(SCHEMA)?;
        debug!("Zone schema created/verified");
        Ok(Self {
            conn: Mutex::new(conn),
            exchange: exchange.into(),
        })
    }

    fn lock(&self) -> SmcResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| SmcError::Persistence("zone store lock poisoned".into()))
    }

    fn write(conn: &Connection, exchange: &str, record: &ZoneRecord) -> SmcResult<()> {
        let z = record.zone();
        conn.execute(
            "INSERT INTO zones
             (zone_key, instrument, exchange, zone_type, zone_high, zone_low, zone_mid,
              score, probability, mitigated, fvg_present, bos_confirmed, impulse_ratio,
              datetime_start, datetime_end, formed_at, first_seen, last_updated,
              alert_sent, mitigation_alert_sent)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)
             ON CONFLICT(zone_key) DO UPDATE SET
                mitigated = MAX(mitigated, excluded.mitigated),
                last_updated = excluded.last_updated,
                alert_sent = MAX(alert_sent, excluded.alert_sent),
                mitigation_alert_sent = MAX(mitigation_alert_sent, excluded.mitigation_alert_sent)",
            params![
                z.key.as_str(),
                z.instrument.as_str(),
                exchange,
                z.zone_type.as_str(),
                z.band.high,
                z.band.low,
                z.band.mid,
                z.score,
                z.probability.as_str(),
                z.mitigated,
                z.fvg_present,
                z.bos_confirmed,
                z.impulse_ratio,
                z.datetime_start.to_rfc3339(),
                z.datetime_end.to_rfc3339(),
                z.formed_at.to_rfc3339(),
                record.first_seen().to_rfc3339(),
                record.last_updated().to_rfc3339(),
                record.alert_sent(),
                record.mitigation_alert_sent(),
            ],
        )?;
        Ok(())
    }

    fn read(conn: &Connection, key: &ZoneKey) -> SmcResult<Option<ZoneRecord>> {
        let sql = format!("SELECT {} FROM zones WHERE zone_key = ?1", COLUMNS);
        let row = conn
            .query_row(&sql, params![key.as_str()], row_to_record)
            .optional()?;
        row.transpose()
    }

    fn query(&self, sql: &str, params: &[&dyn rusqlite::ToSql]) -> SmcResult<Vec<ZoneRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(params, row_to_record)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().collect()
    }

    /// Every stored zone, newest first
    pub fn all_zones(&self) -> SmcResult<Vec<ZoneRecord>> {
        self.query(
            &format!("SELECT {} FROM zones ORDER BY datetime_start DESC", COLUMNS),
            &[],
        )
    }

    /// Write all zones and counts to a pretty-printed JSON file
    pub fn export_json(&self, path: impl AsRef<Path>) -> SmcResult<usize> {
        let zones = self.all_zones()?;
        let state = serde_json::json!({
            "exported_at": Utc::now().to_rfc3339(),
            "exchange": self.exchange,
            "counts": self.counts()?,
            "zones": zones,
        });

        std::fs::write(path.as_ref(), serde_json::to_string_pretty(&state)?)
            .map_err(|e| SmcError::Persistence(format!("export failed: {}", e)))?;
        debug!("Zones exported to: {}", path.as_ref().display());
        Ok(zones.len())
    }
}

impl ZoneStore for SqliteZoneStore {
    fn get(&self, key: &ZoneKey) -> SmcResult<Option<ZoneRecord>> {
        let conn = self.lock()?;
        Self::read(&conn, key)
    }

    fn put(&self, record: &ZoneRecord) -> SmcResult<()> {
        let conn = self.lock()?;
        Self::write(&conn, &self.exchange, record)?;
        debug!("Zone saved: {} [{}]", record.key(), record.zone().zone_type);
        Ok(())
    }

    fn update(
        &self,
        key: &ZoneKey,
        apply: &mut dyn FnMut(Option<ZoneRecord>) -> Option<ZoneRecord>,
    ) -> SmcResult<Option<ZoneRecord>> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let current = Self::read(&tx, key)?;
        let next = apply(current.clone());
        match next {
            Some(record) => {
                Self::write(&tx, &self.exchange, &record)?;
                tx.commit()?;
                Ok(Some(record))
            }
            // dropping the transaction rolls it back
            None => Ok(current),
        }
    }

    fn zones_for_instrument(&self, instrument: &Instrument) -> SmcResult<Vec<ZoneRecord>> {
        self.query(
            &format!(
                "SELECT {} FROM zones WHERE instrument = ?1 ORDER BY datetime_start",
                COLUMNS
            ),
            &[&instrument.as_str()],
        )
    }

    fn active_zones(&self, instrument: Option<&Instrument>) -> SmcResult<Vec<ZoneRecord>> {
        match instrument {
            Some(inst) => self.query(
                &format!(
                    "SELECT {} FROM zones WHERE instrument = ?1 AND mitigated = 0 \
                     ORDER BY score DESC, datetime_start",
                    COLUMNS
                ),
                &[&inst.as_str()],
            ),
            None => self.query(
                &format!(
                    "SELECT {} FROM zones WHERE mitigated = 0 ORDER BY score DESC, datetime_start",
                    COLUMNS
                ),
                &[],
            ),
        }
    }

    fn counts(&self) -> SmcResult<ZoneCounts> {
        let conn = self.lock()?;
        let (total, active): (i64, i64) = conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(CASE WHEN mitigated = 0 THEN 1 ELSE 0 END), 0) FROM zones",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(ZoneCounts {
            total: total as usize,
            active: active as usize,
            mitigated: (total - active) as usize,
        })
    }
}

fn parse_time(column: &str, value: &str) -> SmcResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| SmcError::Persistence(format!("bad {} '{}': {}", column, value, e)))
}

/// Row mapping stays infallible for rusqlite; domain parsing errors surface
/// through the inner result.
fn row_to_record(row: &Row<'_>) -> rusqlite::Result<SmcResult<ZoneRecord>> {
    let key: String = row.get(0)?;
    let instrument: String = row.get(1)?;
    let zone_type: String = row.get(2)?;
    let high: f64 = row.get(3)?;
    let low: f64 = row.get(4)?;
    let score: f64 = row.get(6)?;
    let probability: String = row.get(7)?;
    let mitigated: bool = row.get(8)?;
    let fvg_present: bool = row.get(9)?;
    let bos_confirmed: bool = row.get(10)?;
    let impulse_ratio: f64 = row.get(11)?;
    let datetime_start: String = row.get(12)?;
    let datetime_end: String = row.get(13)?;
    let formed_at: String = row.get(14)?;
    let first_seen: String = row.get(15)?;
    let last_updated: String = row.get(16)?;
    let alert_sent: bool = row.get(17)?;
    let mitigation_alert_sent: bool = row.get(18)?;

    Ok((|| -> SmcResult<ZoneRecord> {
        let zone = Zone {
            key: ZoneKey::from_stored(key),
            instrument: Instrument::new(instrument),
            zone_type: zone_type.parse().map_err(SmcError::Persistence)?,
            band: PriceBand::new(high, low),
            score,
            probability: probability.parse().map_err(SmcError::Persistence)?,
            mitigated,
            fvg_present,
            bos_confirmed,
            impulse_ratio,
            datetime_start: parse_time("datetime_start", &datetime_start)?,
            datetime_end: parse_time("datetime_end", &datetime_end)?,
            formed_at: parse_time("formed_at", &formed_at)?,
            score_card: None,
        };
        Ok(ZoneRecord::from_parts(
            zone,
            parse_time("first_seen", &first_seen)?,
            parse_time("last_updated", &last_updated)?,
            alert_sent,
            mitigation_alert_sent,
        ))
    })())
}

// =============================================================================
// In-memory Store
// =============================================================================

/// Map-backed store for tests and dry runs
#[derive(Debug, Default)]
pub struct MemoryZoneStore {
    zones: Mutex<BTreeMap<ZoneKey, ZoneRecord>>,
}

impl MemoryZoneStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> SmcResult<MutexGuard<'_, BTreeMap<ZoneKey, ZoneRecord>>> {
        self.zones
            .lock()
            .map_err(|_| SmcError::Persistence("zone store lock poisoned".into()))
    }

    fn select(&self, filter: impl Fn(&ZoneRecord) -> bool) -> SmcResult<Vec<ZoneRecord>> {
        Ok(self.lock()?.values().filter(|r| filter(r)).cloned().collect())
    }
}

impl ZoneStore for MemoryZoneStore {
    fn get(&self, key: &ZoneKey) -> SmcResult<Option<ZoneRecord>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn put(&self, record: &ZoneRecord) -> SmcResult<()> {
        let mut zones = self.lock()?;
        match zones.get_mut(record.key()) {
            Some(stored) => {
                stored.observe_mitigation(record.mitigated());
                if record.alert_sent() {
                    stored.latch_alert();
                }
                if record.mitigation_alert_sent() {
                    stored.latch_mitigation_alert();
                }
                stored.touch(record.last_updated());
            }
            None => {
                zones.insert(record.key().clone(), record.clone());
            }
        }
        Ok(())
    }

    fn update(
        &self,
        key: &ZoneKey,
        apply: &mut dyn FnMut(Option<ZoneRecord>) -> Option<ZoneRecord>,
    ) -> SmcResult<Option<ZoneRecord>> {
        let mut zones = self.lock()?;
        let current = zones.get(key).cloned();
        match apply(current.clone()) {
            Some(record) => {
                zones.insert(key.clone(), record.clone());
                Ok(Some(record))
            }
            None => Ok(current),
        }
    }

    fn zones_for_instrument(&self, instrument: &Instrument) -> SmcResult<Vec<ZoneRecord>> {
        let mut zones = self.select(|r| &r.zone().instrument == instrument)?;
        zones.sort_by_key(|r| r.zone().datetime_start);
        Ok(zones)
    }

    fn active_zones(&self, instrument: Option<&Instrument>) -> SmcResult<Vec<ZoneRecord>> {
        let mut zones = self.select(|r| {
            !r.mitigated() && instrument.map_or(true, |i| &r.zone().instrument == i)
        })?;
        zones.sort_by(|a, b| {
            b.zone()
                .score
                .total_cmp(&a.zone().score)
                .then(a.zone().datetime_start.cmp(&b.zone().datetime_start))
        });
        Ok(zones)
    }

    fn counts(&self) -> SmcResult<ZoneCounts> {
        let zones = self.lock()?;
        let active = zones.values().filter(|r| !r.mitigated()).count();
        Ok(ZoneCounts {
            total: zones.len(),
            active,
            mitigated: zones.len() - active,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zone::tests::sample_zone;

    fn stores() -> Vec<Box<dyn ZoneStore>> {
        vec![
            Box::new(SqliteZoneStore::open_in_memory("NSE").unwrap()),
            Box::new(MemoryZoneStore::new()),
        ]
    }

    #[test]
    fn test_put_and_get_roundtrip() {
        for store in stores() {
            let record = ZoneRecord::new(sample_zone("RELIANCE", 110.0, 100.0), Utc::now());
            store.put(&record).unwrap();

            let loaded = store.get(record.key()).unwrap().unwrap();
            assert_eq!(loaded.zone().band, record.zone().band);
            assert_eq!(loaded.zone().probability, record.zone().probability);
            assert_eq!(loaded.zone().formed_at, record.zone().formed_at);
            assert!(!loaded.mitigated());

            assert!(store.get(&ZoneKey::from_stored("missing")).unwrap().is_none());
        }
    }

    #[test]
    fn test_put_never_rewrites_immutable_columns() {
        let store = SqliteZoneStore::open_in_memory("NSE").unwrap();
        let now = Utc::now();
        let original = ZoneRecord::new(sample_zone("INFY", 110.0, 100.0), now);
        store.put(&original).unwrap();

        let mut altered = sample_zone("INFY", 110.0, 100.0);
        altered.score = 1.0;
        let later = ZoneRecord::new(altered, now + chrono::Duration::minutes(5));
        store.put(&later).unwrap();

        let loaded = store.get(original.key()).unwrap().unwrap();
        assert_eq!(loaded.zone().score, 5.0);
        assert_eq!(loaded.first_seen().timestamp(), now.timestamp());
    }

    #[test]
    fn test_update_none_leaves_record() {
        for store in stores() {
            let record = ZoneRecord::new(sample_zone("TCS", 110.0, 100.0), Utc::now());
            store.put(&record).unwrap();

            let out = store.update(record.key(), &mut |_| None).unwrap();
            assert_eq!(out.unwrap().key(), record.key());
            assert_eq!(store.counts().unwrap().total, 1);
        }
    }

    #[test]
    fn test_active_zones_and_counts() {
        for store in stores() {
            let now = Utc::now();
            let mut a = ZoneRecord::new(sample_zone("SBIN", 110.0, 100.0), now);
            let mut hi = sample_zone("SBIN", 130.0, 120.0);
            hi.score = 6.0;
            let b = ZoneRecord::new(hi, now);
            let c = ZoneRecord::new(sample_zone("ITC", 50.0, 45.0), now);
            store.put(&b).unwrap();
            store.put(&c).unwrap();
            assert!(a.observe_mitigation(true));
            store.put(&a).unwrap();

            let sbin = Instrument::new("SBIN");
            let active = store.active_zones(Some(&sbin)).unwrap();
            assert_eq!(active.len(), 1);
            assert_eq!(active[0].zone().score, 6.0);

            assert_eq!(store.active_zones(None).unwrap().len(), 2);
            assert_eq!(store.zones_for_instrument(&sbin).unwrap().len(), 2);
            assert_eq!(
                store.counts().unwrap(),
                ZoneCounts { total: 3, active: 2, mitigated: 1 }
            );
        }
    }
}
