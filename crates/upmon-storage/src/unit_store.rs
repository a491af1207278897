use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, Row};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;
use upmon_common::types::{
    AnomalySensitivity, MonitoredUnit, ProbeConfig, ScheduleKind, UnitKind, UnitStatus,
};

use crate::error::{Result, StorageError};
use crate::{SaveOutcome, UnitRepository};

const UNITS_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS monitored_units (
    id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL,
    name TEXT NOT NULL,
    kind TEXT NOT NULL,
    schedule_json TEXT NOT NULL,
    grace_seconds INTEGER NOT NULL,
    status TEXT NOT NULL,
    last_seen_at INTEGER,
    last_started_at INTEGER,
    last_checked_at INTEGER,
    last_response_ms INTEGER,
    next_expected_at INTEGER,
    last_alert_at INTEGER,
    failing_since INTEGER,
    last_error TEXT,
    reminder_interval_hours INTEGER,
    alert_on_recovery INTEGER NOT NULL DEFAULT 0,
    anomaly_sensitivity TEXT NOT NULL,
    probe_json TEXT,
    version INTEGER NOT NULL,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_units_deadline ON monitored_units(kind, status, next_expected_at);
CREATE INDEX IF NOT EXISTS idx_units_project ON monitored_units(project_id);
";

const UNIT_COLUMNS: &str = "id, project_id, name, kind, schedule_json, grace_seconds, status, \
     last_seen_at, last_started_at, last_checked_at, last_response_ms, next_expected_at, \
     last_alert_at, failing_since, last_error, reminder_interval_hours, alert_on_recovery, \
     anomaly_sensitivity, probe_json, version, created_at, updated_at";

/// SQLite-backed [`UnitRepository`].
///
/// A single connection behind a mutex is enough here: unit rows are small,
/// writes are short, and WAL keeps readers unblocked. Contention on the
/// same unit is resolved by the version check, not by the connection lock.
pub struct SqliteUnitRepository {
    conn: Mutex<Connection>,
    _db_path: PathBuf,
}

impl SqliteUnitRepository {
    pub fn new(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let db_path = data_dir.join("upmon.db");
        let conn = Connection::open(&db_path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(UNITS_SCHEMA)?;
        tracing::info!(path = %db_path.display(), "Initialized unit repository");
        Ok(Self {
            conn: Mutex::new(conn),
            _db_path: db_path,
        })
    }

    /// In-memory database for tests.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(UNITS_SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            _db_path: PathBuf::from(":memory:"),
        })
    }
}

impl UnitRepository for SqliteUnitRepository {
    fn insert(&self, unit: &MonitoredUnit) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(&format!(
            "INSERT INTO monitored_units ({UNIT_COLUMNS}) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22)"
        ))?;
        stmt.execute(params![
            unit.id,
            unit.project_id,
            unit.name,
            unit.kind.to_string(),
            serde_json::to_string(&unit.schedule)?,
            unit.grace_seconds as i64,
            unit.status.to_string(),
            unit.last_seen_at.map(to_millis),
            unit.last_started_at.map(to_millis),
            unit.last_checked_at.map(to_millis),
            unit.last_response_ms,
            unit.next_expected_at.map(to_millis),
            unit.last_alert_at.map(to_millis),
            unit.failing_since.map(to_millis),
            unit.last_error,
            unit.reminder_interval_hours,
            unit.alert_on_recovery,
            unit.anomaly_sensitivity.to_string(),
            unit.probe
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
            unit.version,
            to_millis(unit.created_at),
            to_millis(unit.updated_at),
        ])?;
        Ok(())
    }

    fn load(&self, unit_id: &str) -> Result<Option<MonitoredUnit>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {UNIT_COLUMNS} FROM monitored_units WHERE id = ?1"
        ))?;
        let mut rows = stmt.query(params![unit_id])?;
        match rows.next()? {
            Some(row) => Ok(Some(unit_from_row(row)?)),
            None => Ok(None),
        }
    }

    fn save(&self, unit: &MonitoredUnit, expected_version: i64) -> Result<SaveOutcome> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "UPDATE monitored_units SET \
                project_id = ?1, name = ?2, kind = ?3, schedule_json = ?4, grace_seconds = ?5, \
                status = ?6, last_seen_at = ?7, last_started_at = ?8, last_checked_at = ?9, \
                last_response_ms = ?10, next_expected_at = ?11, last_alert_at = ?12, \
                failing_since = ?13, last_error = ?14, reminder_interval_hours = ?15, \
                alert_on_recovery = ?16, anomaly_sensitivity = ?17, probe_json = ?18, \
                version = version + 1, updated_at = ?19 \
             WHERE id = ?20 AND version = ?21",
        )?;
        let changed = stmt.execute(params![
            unit.project_id,
            unit.name,
            unit.kind.to_string(),
            serde_json::to_string(&unit.schedule)?,
            unit.grace_seconds as i64,
            unit.status.to_string(),
            unit.last_seen_at.map(to_millis),
            unit.last_started_at.map(to_millis),
            unit.last_checked_at.map(to_millis),
            unit.last_response_ms,
            unit.next_expected_at.map(to_millis),
            unit.last_alert_at.map(to_millis),
            unit.failing_since.map(to_millis),
            unit.last_error,
            unit.reminder_interval_hours,
            unit.alert_on_recovery,
            unit.anomaly_sensitivity.to_string(),
            unit.probe
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
            to_millis(unit.updated_at),
            unit.id,
            expected_version,
        ])?;
        if changed == 0 {
            return Ok(SaveOutcome::Conflict);
        }
        Ok(SaveOutcome::Saved)
    }

    fn find_due(&self, kind: UnitKind, now: DateTime<Utc>) -> Result<Vec<MonitoredUnit>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {UNIT_COLUMNS} FROM monitored_units \
             WHERE kind = ?1 AND status != 'paused' \
               AND next_expected_at IS NOT NULL AND next_expected_at <= ?2 \
             ORDER BY next_expected_at ASC"
        ))?;
        let rows = stmt.query_map(params![kind.to_string(), to_millis(now)], |row| {
            // rusqlite's mapped-row closure must yield rusqlite errors;
            // domain conversion happens after collection.
            Ok(unit_from_row(row))
        })?;
        let mut units = Vec::new();
        for row in rows {
            units.push(row??);
        }
        Ok(units)
    }

    fn list(&self) -> Result<Vec<MonitoredUnit>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {UNIT_COLUMNS} FROM monitored_units ORDER BY created_at DESC"
        ))?;
        let rows = stmt.query_map([], |row| Ok(unit_from_row(row)))?;
        let mut units = Vec::new();
        for row in rows {
            units.push(row??);
        }
        Ok(units)
    }

    fn delete(&self, unit_id: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "DELETE FROM monitored_units WHERE id = ?1",
            params![unit_id],
        )?;
        Ok(changed > 0)
    }
}

fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_default()
}

fn parse_column<T: FromStr<Err = String>>(
    column: &'static str,
    value: &str,
) -> Result<T> {
    value.parse().map_err(|message| StorageError::InvalidColumn {
        column,
        message,
    })
}

fn unit_from_row(row: &Row<'_>) -> Result<MonitoredUnit> {
    let kind: String = row.get(3)?;
    let schedule_json: String = row.get(4)?;
    let status: String = row.get(6)?;
    let sensitivity: String = row.get(17)?;
    let probe_json: Option<String> = row.get(18)?;

    let schedule: ScheduleKind = serde_json::from_str(&schedule_json)?;
    let probe: Option<ProbeConfig> = probe_json
        .as_deref()
        .map(serde_json::from_str)
        .transpose()?;

    Ok(MonitoredUnit {
        id: row.get(0)?,
        project_id: row.get(1)?,
        name: row.get(2)?,
        kind: parse_column("kind", &kind)?,
        schedule,
        grace_seconds: row.get::<_, i64>(5)?.max(0) as u64,
        status: parse_column("status", &status)?,
        last_seen_at: row.get::<_, Option<i64>>(7)?.map(from_millis),
        last_started_at: row.get::<_, Option<i64>>(8)?.map(from_millis),
        last_checked_at: row.get::<_, Option<i64>>(9)?.map(from_millis),
        last_response_ms: row.get(10)?,
        next_expected_at: row.get::<_, Option<i64>>(11)?.map(from_millis),
        last_alert_at: row.get::<_, Option<i64>>(12)?.map(from_millis),
        failing_since: row.get::<_, Option<i64>>(13)?.map(from_millis),
        last_error: row.get(14)?,
        reminder_interval_hours: row.get(15)?,
        alert_on_recovery: row.get(16)?,
        anomaly_sensitivity: parse_column("anomaly_sensitivity", &sensitivity)?,
        probe,
        version: row.get(19)?,
        created_at: from_millis(row.get(20)?),
        updated_at: from_millis(row.get(21)?),
    })
}
