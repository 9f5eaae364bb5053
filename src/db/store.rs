//! SQLite database store implementation.

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Result as SqlResult, Row};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

use super::models::*;
use crate::config::DEFAULT_HISTORY_LIMIT;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.9f";

const TARGET_COLUMNS: &str = "id, address, probe_mode, attempt_count, last_status, last_latency_ms, \
     last_checked, first_up_time, total_probe_count, total_latency_sum";

/// Database error types.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Migration error: {0}")]
    Migration(String),
    #[error("Not found")]
    NotFound,
    #[error("invalid setting {key}: {value:?}")]
    InvalidSetting { key: String, value: String },
    #[error("connection mutex poisoned")]
    Poisoned,
}

/// Storage operations the probe scheduler depends on.
///
/// Implemented by [`Store`]; the scheduler only ever sees this trait.
pub trait TargetStore: Send + Sync {
    /// All monitored targets.
    fn list_targets(&self) -> Result<Vec<Target>, DbError>;

    /// Maximum number of targets probed at once.
    fn scheduler_width(&self) -> Result<usize, DbError>;

    /// Record a tick in which at least one attempt got a response.
    ///
    /// Bumps the cumulative probe count by one and the latency sum by `latency_ms`.
    fn update_probe_stats(
        &self,
        id: i64,
        status: u16,
        latency_ms: i64,
        checked_at: DateTime<Utc>,
        first_up_time: Option<DateTime<Utc>>,
    ) -> Result<(), DbError>;

    /// Record a tick in which every attempt failed. Cumulative counters stay put.
    fn update_probe_network_error(
        &self,
        id: i64,
        latency_ms: i64,
        checked_at: DateTime<Utc>,
        first_up_time: Option<DateTime<Utc>>,
    ) -> Result<(), DbError>;

    /// Append one history row, pruning the oldest rows past the retention limit.
    fn add_probe_history(&self, record: &HistoryRecord) -> Result<(), DbError>;
}

/// Thread-safe database store.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
    history_limit: i64,
}

impl Store {
    /// Create a new store with the given database path.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, DbError> {
        Self::with_history_limit(path, DEFAULT_HISTORY_LIMIT)
    }

    /// Create a store that retains at most `history_limit` history rows.
    pub fn with_history_limit<P: AsRef<Path>>(path: P, history_limit: i64) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            history_limit: history_limit.max(1),
        };
        store.init()?;
        Ok(store)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, DbError> {
        self.conn.lock().map_err(|_| DbError::Poisoned)
    }

    /// Initialize the database with migrations.
    fn init(&self) -> Result<(), DbError> {
        let conn = self.conn()?;

        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        // Run migrations inline (embedded SQL)
        conn.execute_batch(include_str!("../../migrations/000001_init.up.sql"))
            .map_err(|e| DbError::Migration(format!("Migration 1 failed: {}", e)))?;
        conn.execute_batch(include_str!("../../migrations/000002_default_settings.up.sql"))
            .map_err(|e| DbError::Migration(format!("Migration 2 failed: {}", e)))?;

        Ok(())
    }

    // --- Target CRUD ---

    /// Add a new target and return its ID.
    pub fn add_target(&self, target: &mut Target) -> Result<i64, DbError> {
        if target.attempt_count == 0 {
            target.attempt_count = 1;
        }

        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO targets (address, probe_mode, attempt_count, last_checked) VALUES (?1, ?2, ?3, ?4)",
            params![
                target.address,
                target.probe_mode.as_str(),
                target.attempt_count,
                format_db_time(Utc::now()),
            ],
        )?;
        let id = conn.last_insert_rowid();
        target.id = id;
        Ok(id)
    }

    /// Get a target by ID.
    pub fn get_target(&self, id: i64) -> Result<Target, DbError> {
        let conn = self.conn()?;
        let target = conn
            .query_row(
                &format!("SELECT {} FROM targets WHERE id = ?1", TARGET_COLUMNS),
                params![id],
                target_from_row,
            )
            .optional()?;
        target.ok_or(DbError::NotFound)
    }

    /// Delete a target and its history.
    pub fn delete_target(&self, id: i64) -> Result<(), DbError> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM probe_history WHERE target_id = ?1", params![id])?;
        let removed = conn.execute("DELETE FROM targets WHERE id = ?1", params![id])?;
        if removed == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    // --- Settings ---

    /// The stored schedule interval, if one has been saved.
    pub fn schedule_interval(&self) -> Result<Option<String>, DbError> {
        self.get_setting("schedule_interval")
    }

    pub fn set_schedule_interval(&self, interval: &str) -> Result<(), DbError> {
        self.put_setting("schedule_interval", interval)
    }

    /// Store `interval` only if no schedule has been saved yet.
    pub fn seed_schedule_interval(&self, interval: &str) -> Result<(), DbError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR IGNORE INTO settings (key, value) VALUES ('schedule_interval', ?1)",
            params![interval],
        )?;
        Ok(())
    }

    pub fn set_scheduler_width(&self, width: usize) -> Result<(), DbError> {
        self.put_setting("scheduler_thread_count", &width.max(1).to_string())
    }

    fn get_setting(&self, key: &str) -> Result<Option<String>, DbError> {
        let conn = self.conn()?;
        let value: Option<Option<String>> = conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value.flatten())
    }

    fn put_setting(&self, key: &str, value: &str) -> Result<(), DbError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO settings (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    // --- Probe History ---

    /// Get the newest `limit` history rows for one target, newest first.
    pub fn get_probe_history(&self, target_id: i64, limit: i64) -> Result<Vec<HistoryRecord>, DbError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT target_id, latency_ms, timestamp, status_code, status, description
             FROM probe_history WHERE target_id = ?1 ORDER BY id DESC LIMIT ?2",
        )?;

        let records = stmt
            .query_map(params![target_id, limit], |row| {
                let time_str: String = row.get(2)?;
                Ok(HistoryRecord {
                    target_id: row.get(0)?,
                    latency_ms: row.get(1)?,
                    timestamp: db_time_column(2, &time_str)?,
                    status_code: row.get(3)?,
                    status: row.get(4)?,
                    description: row.get(5)?,
                })
            })?
            .collect::<SqlResult<Vec<_>>>()?;

        Ok(records)
    }

    /// Count all history rows.
    pub fn count_probe_history(&self) -> Result<i64, DbError> {
        let conn = self.conn()?;
        Ok(conn.query_row("SELECT COUNT(1) FROM probe_history", [], |r| r.get(0))?)
    }
}

impl TargetStore for Store {
    fn list_targets(&self) -> Result<Vec<Target>, DbError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!("SELECT {} FROM targets ORDER BY id DESC", TARGET_COLUMNS))?;

        let targets = stmt
            .query_map([], target_from_row)?
            .collect::<SqlResult<Vec<_>>>()?;

        Ok(targets)
    }

    fn scheduler_width(&self) -> Result<usize, DbError> {
        let value = self
            .get_setting("scheduler_thread_count")?
            .ok_or(DbError::NotFound)?;

        match value.trim().parse::<usize>() {
            Ok(width) if width >= 1 => Ok(width),
            _ => Err(DbError::InvalidSetting {
                key: "scheduler_thread_count".to_string(),
                value,
            }),
        }
    }

    fn update_probe_stats(
        &self,
        id: i64,
        status: u16,
        latency_ms: i64,
        checked_at: DateTime<Utc>,
        first_up_time: Option<DateTime<Utc>>,
    ) -> Result<(), DbError> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE targets SET
                last_status = ?1,
                last_latency_ms = ?2,
                last_checked = ?3,
                first_up_time = ?4,
                total_probe_count = total_probe_count + 1,
                total_latency_sum = total_latency_sum + ?2
             WHERE id = ?5",
            params![
                status,
                latency_ms,
                format_db_time(checked_at),
                first_up_time.map(format_db_time),
                id,
            ],
        )?;
        if updated == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    fn update_probe_network_error(
        &self,
        id: i64,
        latency_ms: i64,
        checked_at: DateTime<Utc>,
        first_up_time: Option<DateTime<Utc>>,
    ) -> Result<(), DbError> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE targets SET
                last_status = 0,
                last_latency_ms = ?1,
                last_checked = ?2,
                first_up_time = ?3
             WHERE id = ?4",
            params![
                latency_ms,
                format_db_time(checked_at),
                first_up_time.map(format_db_time),
                id,
            ],
        )?;
        if updated == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    fn add_probe_history(&self, record: &HistoryRecord) -> Result<(), DbError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO probe_history (target_id, latency_ms, status_code, status, description, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.target_id,
                record.latency_ms,
                record.status_code,
                record.status,
                record.description,
                format_db_time(record.timestamp),
            ],
        )?;

        // Pruning is best-effort; the insert above already stands.
        if let Err(e) = conn.execute(
            "DELETE FROM probe_history WHERE id <= (
                SELECT id FROM probe_history ORDER BY id DESC LIMIT 1 OFFSET ?1
             )",
            params![self.history_limit],
        ) {
            tracing::warn!("Failed to prune probe history: {}", e);
        }

        Ok(())
    }
}

fn target_from_row(row: &Row<'_>) -> SqlResult<Target> {
    let mode: String = row.get(2)?;
    let last_checked: Option<String> = row.get(6)?;
    let first_up: Option<String> = row.get(7)?;

    Ok(Target {
        id: row.get(0)?,
        address: row.get(1)?,
        probe_mode: ProbeMode::from_stored(&mode),
        attempt_count: row.get::<_, u32>(3)?.max(1),
        last_status: row.get(4)?,
        last_latency_ms: row.get(5)?,
        last_checked: last_checked.map(|s| db_time_column(6, &s)).transpose()?,
        first_up_time: first_up.map(|s| db_time_column(7, &s)).transpose()?,
        total_probe_count: row.get(8)?,
        total_latency_sum: row.get(9)?,
    })
}

fn format_db_time(t: DateTime<Utc>) -> String {
    t.format(TIME_FORMAT).to_string()
}

/// Parse a stored timestamp column, failing the row on garbage.
fn db_time_column(idx: usize, s: &str) -> SqlResult<DateTime<Utc>> {
    parse_db_time(s).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, format!("unparseable timestamp {:?}", s).into())
    })
}

/// Parse a datetime string from the database.
fn parse_db_time(s: &str) -> Option<DateTime<Utc>> {
    // Try various formats
    let formats = [
        TIME_FORMAT,
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.9fZ",
        "%Y-%m-%dT%H:%M:%SZ",
    ];

    for fmt in &formats {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(DateTime::from_naive_utc_and_offset(dt, Utc));
        }
    }

    // Try ISO 8601
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    None
}
