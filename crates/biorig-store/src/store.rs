//! Main store implementation.

use std::path::Path;

use rusqlite::{Connection, OptionalExtension, params};
use time::OffsetDateTime;
use tracing::{debug, info};

use biorig_types::ControlParameters;

use crate::error::{Error, Result};
use crate::models::{StoredParameters, TelemetryFrame, TelemetryRecord};
use crate::schema;

/// SQLite-based store for rig telemetry and control parameters.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        // Create parent directories if needed
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| Error::CreateDirectory {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
            }
        }

        info!("Opening database at {}", path.display());
        let conn = Connection::open(path)?;

        // WAL keeps the recorder's appends from stalling sync reads
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;

        schema::initialize(&conn)?;

        Ok(Self { conn })
    }

    /// Open the default database location.
    pub fn open_default() -> Result<Self> {
        Self::open(crate::default_db_path())
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }
}

// Telemetry operations
impl Store {
    /// Append a telemetry snapshot with its derived flux, unsynced.
    pub fn insert_record(&self, frame: &TelemetryFrame, flux: f64) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO telemetry (recorded_at, cstr_temp, cstr_level, cstr_ph, cstr_orp,
             cstr_ec, cstr_tds, mtank_temp, mtank_level, effluent_level, flux, synced)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, 0)",
            params![
                frame.recorded_at.unix_timestamp(),
                frame.cstr_temp,
                frame.cstr_level,
                frame.cstr_ph,
                frame.cstr_orp,
                frame.cstr_ec,
                frame.cstr_tds,
                frame.mtank_temp,
                frame.mtank_level,
                frame.effluent_level,
                flux,
            ],
        )?;

        Ok(self.conn.last_insert_rowid())
    }

    /// All records not yet confirmed by the remote store, in insertion order.
    pub fn unsynced_records(&self) -> Result<Vec<TelemetryRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, recorded_at, cstr_temp, cstr_level, cstr_ph, cstr_orp, cstr_ec,
             cstr_tds, mtank_temp, mtank_level, effluent_level, flux, synced
             FROM telemetry WHERE synced = 0 ORDER BY id",
        )?;

        let records = stmt
            .query_map([], map_record)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(records)
    }

    /// Mark exactly the given record ids as synced, in one statement.
    ///
    /// Called only after the remote store confirmed acceptance of these
    /// records.
    pub fn mark_synced(&self, ids: &[i64]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }

        let placeholders = vec!["?"; ids.len()].join(",");
        let sql = format!("UPDATE telemetry SET synced = 1 WHERE id IN ({placeholders})");
        let updated = self
            .conn
            .execute(&sql, rusqlite::params_from_iter(ids.iter()))?;

        debug!("Marked {} telemetry record(s) as synced", updated);
        Ok(updated)
    }

    /// Effluent level of the most recent record at or before `cutoff`.
    ///
    /// This is the flux baseline; `None` means no history reaches back that
    /// far.
    pub fn effluent_level_at_or_before(&self, cutoff: OffsetDateTime) -> Result<Option<f64>> {
        let level = self
            .conn
            .query_row(
                "SELECT effluent_level FROM telemetry
                 WHERE recorded_at <= ?1 ORDER BY recorded_at DESC, id DESC LIMIT 1",
                [cutoff.unix_timestamp()],
                |row| row.get(0),
            )
            .optional()?;

        Ok(level)
    }

    /// Total number of telemetry records.
    pub fn count_records(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM telemetry", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Number of telemetry records awaiting upload.
    pub fn count_unsynced(&self) -> Result<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM telemetry WHERE synced = 0",
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Export all telemetry records as CSV, oldest first.
    ///
    /// Returns the number of data rows written.
    pub fn export_csv<W: std::io::Write>(&self, writer: W) -> Result<usize> {
        let mut wtr = csv::Writer::from_writer(writer);
        wtr.write_record([
            "id",
            "recorded_at",
            "cstr_temp",
            "cstr_level",
            "cstr_ph",
            "cstr_orp",
            "cstr_ec",
            "cstr_tds",
            "mtank_temp",
            "mtank_level",
            "effluent_level",
            "flux",
            "synced",
        ])?;

        let mut stmt = self.conn.prepare(
            "SELECT id, recorded_at, cstr_temp, cstr_level, cstr_ph, cstr_orp, cstr_ec,
             cstr_tds, mtank_temp, mtank_level, effluent_level, flux, synced
             FROM telemetry ORDER BY id",
        )?;

        let mut written = 0;
        for record in stmt.query_map([], map_record)? {
            let r = record?;
            wtr.write_record([
                r.id.to_string(),
                r.recorded_at.unix_timestamp().to_string(),
                r.cstr_temp.to_string(),
                r.cstr_level.to_string(),
                r.cstr_ph.to_string(),
                r.cstr_orp.to_string(),
                r.cstr_ec.to_string(),
                r.cstr_tds.to_string(),
                r.mtank_temp.to_string(),
                r.mtank_level.to_string(),
                r.effluent_level.to_string(),
                r.flux.to_string(),
                (r.synced as u8).to_string(),
            ])?;
            written += 1;
        }

        wtr.flush()?;
        Ok(written)
    }
}

// Control parameter operations
impl Store {
    /// Insert a new operator parameter set, unsynced.
    ///
    /// The set is validated first; a non-positive ramp duration or
    /// non-finite field is rejected and nothing is written.
    pub fn insert_parameters(&self, params_set: &ControlParameters) -> Result<i64> {
        params_set.validate()?;

        self.conn.execute(
            "INSERT INTO control_params (created_at, target_temperature, ramp_duration_hours,
             ramp_increment, synced) VALUES (?1, ?2, ?3, ?4, 0)",
            params![
                params_set.effective_since.unix_timestamp(),
                params_set.target_temperature,
                params_set.ramp_duration_hours,
                params_set.ramp_increment,
            ],
        )?;

        Ok(self.conn.last_insert_rowid())
    }

    /// The newest parameter set, validated.
    ///
    /// Returns `Error::InvalidParameters` when the newest row is malformed;
    /// the caller keeps its previous snapshot in that case.
    pub fn latest_parameters(&self) -> Result<Option<ControlParameters>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, created_at, target_temperature, ramp_duration_hours,
                 ramp_increment, synced
                 FROM control_params ORDER BY created_at DESC, id DESC LIMIT 1",
                [],
                map_parameters,
            )
            .optional()?;

        match row {
            Some(stored) => {
                let parameters = stored.to_parameters();
                parameters.validate()?;
                Ok(Some(parameters))
            }
            None => Ok(None),
        }
    }

    /// All parameter rows not yet confirmed by the remote store, in
    /// insertion order.
    pub fn unsynced_parameters(&self) -> Result<Vec<StoredParameters>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, created_at, target_temperature, ramp_duration_hours,
             ramp_increment, synced
             FROM control_params WHERE synced = 0 ORDER BY id",
        )?;

        let rows = stmt
            .query_map([], map_parameters)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    /// Mark exactly the given parameter row ids as synced.
    pub fn mark_parameters_synced(&self, ids: &[i64]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }

        let placeholders = vec!["?"; ids.len()].join(",");
        let sql = format!("UPDATE control_params SET synced = 1 WHERE id IN ({placeholders})");
        let updated = self
            .conn
            .execute(&sql, rusqlite::params_from_iter(ids.iter()))?;

        debug!("Marked {} parameter row(s) as synced", updated);
        Ok(updated)
    }
}

fn map_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<TelemetryRecord> {
    Ok(TelemetryRecord {
        id: row.get(0)?,
        recorded_at: OffsetDateTime::from_unix_timestamp(row.get(1)?).unwrap(),
        cstr_temp: row.get(2)?,
        cstr_level: row.get(3)?,
        cstr_ph: row.get(4)?,
        cstr_orp: row.get(5)?,
        cstr_ec: row.get(6)?,
        cstr_tds: row.get(7)?,
        mtank_temp: row.get(8)?,
        mtank_level: row.get(9)?,
        effluent_level: row.get(10)?,
        flux: row.get(11)?,
        synced: row.get(12)?,
    })
}

fn map_parameters(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredParameters> {
    Ok(StoredParameters {
        id: row.get(0)?,
        created_at: OffsetDateTime::from_unix_timestamp(row.get(1)?).unwrap(),
        target_temperature: row.get(2)?,
        ramp_duration_hours: row.get(3)?,
        ramp_increment: row.get(4)?,
        synced: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    fn frame(at: OffsetDateTime, effluent_level: f64) -> TelemetryFrame {
        TelemetryFrame {
            recorded_at: at,
            cstr_temp: 28.0,
            cstr_level: 450.0,
            cstr_ph: 7.1,
            cstr_orp: -120.0,
            cstr_ec: 1.8,
            cstr_tds: 900.0,
            mtank_temp: 27.0,
            mtank_level: 8500.0,
            effluent_level,
        }
    }

    fn parameters(at: OffsetDateTime, target: f64) -> ControlParameters {
        ControlParameters {
            target_temperature: target,
            ramp_duration_hours: 24.0,
            ramp_increment: 7.0,
            effective_since: at,
        }
    }

    #[test]
    fn test_open_in_memory() {
        let store = Store::open_in_memory().unwrap();
        assert_eq!(store.count_records().unwrap(), 0);
    }

    #[test]
    fn test_open_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("data.db");
        let store = Store::open(&path).unwrap();
        assert_eq!(store.count_records().unwrap(), 0);
        assert!(path.exists());
    }

    #[test]
    fn test_insert_and_select_unsynced_in_order() {
        let store = Store::open_in_memory().unwrap();
        let t0 = OffsetDateTime::UNIX_EPOCH + Duration::days(19_000);

        let first = store.insert_record(&frame(t0, 100.0), 0.0).unwrap();
        let second = store
            .insert_record(&frame(t0 + Duration::seconds(30), 105.0), 5.0)
            .unwrap();

        let pending = store.unsynced_records().unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].id, first);
        assert_eq!(pending[1].id, second);
        assert_eq!(pending[1].flux, 5.0);
        assert!(!pending[0].synced);
    }

    #[test]
    fn test_mark_synced_exact_set() {
        let store = Store::open_in_memory().unwrap();
        let t0 = OffsetDateTime::UNIX_EPOCH + Duration::days(19_000);

        let a = store.insert_record(&frame(t0, 100.0), 0.0).unwrap();
        let b = store
            .insert_record(&frame(t0 + Duration::seconds(30), 101.0), 1.0)
            .unwrap();
        let c = store
            .insert_record(&frame(t0 + Duration::seconds(60), 102.0), 1.0)
            .unwrap();

        let updated = store.mark_synced(&[a, c]).unwrap();
        assert_eq!(updated, 2);

        let pending = store.unsynced_records().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, b);
        assert_eq!(store.count_unsynced().unwrap(), 1);
        assert_eq!(store.count_records().unwrap(), 3);
    }

    #[test]
    fn test_mark_synced_empty_set_is_noop() {
        let store = Store::open_in_memory().unwrap();
        assert_eq!(store.mark_synced(&[]).unwrap(), 0);
    }

    #[test]
    fn test_effluent_lookback_without_history() {
        let store = Store::open_in_memory().unwrap();
        let baseline = store
            .effluent_level_at_or_before(OffsetDateTime::now_utc())
            .unwrap();
        assert_eq!(baseline, None);
    }

    #[test]
    fn test_effluent_lookback_picks_most_recent_before_cutoff() {
        let store = Store::open_in_memory().unwrap();
        let t0 = OffsetDateTime::UNIX_EPOCH + Duration::days(19_000);

        store.insert_record(&frame(t0, 100.0), 0.0).unwrap();
        store
            .insert_record(&frame(t0 + Duration::seconds(30), 103.0), 3.0)
            .unwrap();
        store
            .insert_record(&frame(t0 + Duration::seconds(90), 110.0), 7.0)
            .unwrap();

        // Cutoff lands between the second and third record.
        let baseline = store
            .effluent_level_at_or_before(t0 + Duration::seconds(60))
            .unwrap();
        assert_eq!(baseline, Some(103.0));
    }

    #[test]
    fn test_latest_parameters_newest_wins() {
        let store = Store::open_in_memory().unwrap();
        let t0 = OffsetDateTime::UNIX_EPOCH + Duration::days(19_000);

        store.insert_parameters(&parameters(t0, 30.0)).unwrap();
        store
            .insert_parameters(&parameters(t0 + Duration::minutes(5), 35.0))
            .unwrap();

        let latest = store.latest_parameters().unwrap().unwrap();
        assert_eq!(latest.target_temperature, 35.0);
    }

    #[test]
    fn test_latest_parameters_empty_store() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.latest_parameters().unwrap().is_none());
    }

    #[test]
    fn test_insert_parameters_rejects_invalid() {
        let store = Store::open_in_memory().unwrap();
        let mut bad = parameters(OffsetDateTime::now_utc(), 35.0);
        bad.ramp_duration_hours = 0.0;

        assert!(matches!(
            store.insert_parameters(&bad),
            Err(Error::InvalidParameters(_))
        ));
        assert!(store.latest_parameters().unwrap().is_none());
    }

    #[test]
    fn test_latest_parameters_rejects_corrupt_row() {
        let store = Store::open_in_memory().unwrap();

        // A row written by an older tool that skipped validation.
        store
            .conn
            .execute(
                "INSERT INTO control_params (created_at, target_temperature,
                 ramp_duration_hours, ramp_increment, synced)
                 VALUES (0, 35.0, -2.0, 7.0, 0)",
                [],
            )
            .unwrap();

        assert!(matches!(
            store.latest_parameters(),
            Err(Error::InvalidParameters(_))
        ));
    }

    #[test]
    fn test_parameter_sync_flow() {
        let store = Store::open_in_memory().unwrap();
        let t0 = OffsetDateTime::UNIX_EPOCH + Duration::days(19_000);

        let id = store.insert_parameters(&parameters(t0, 35.0)).unwrap();
        assert_eq!(store.unsynced_parameters().unwrap().len(), 1);

        store.mark_parameters_synced(&[id]).unwrap();
        assert!(store.unsynced_parameters().unwrap().is_empty());
    }

    #[test]
    fn test_export_csv() {
        let store = Store::open_in_memory().unwrap();
        let t0 = OffsetDateTime::UNIX_EPOCH + Duration::days(19_000);

        store.insert_record(&frame(t0, 100.0), 0.0).unwrap();
        store
            .insert_record(&frame(t0 + Duration::seconds(30), 104.5), 4.5)
            .unwrap();

        let mut out = Vec::new();
        let written = store.export_csv(&mut out).unwrap();
        assert_eq!(written, 2);

        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        assert!(lines.next().unwrap().starts_with("id,recorded_at,cstr_temp"));
        assert_eq!(lines.count(), 2);
        assert!(text.contains("104.5"));
    }
}
