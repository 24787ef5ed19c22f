//! Log store trait and SQLite implementation.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use rusqlite::{Connection, OptionalExtension};

use super::error::StateError;
use super::schema;
use super::types::{LogEntry, LogSummary, SyncRunStats};

/// Persistent transaction log, partitioned by subject.
///
/// This trait is object-safe and is shared with the sync engine as
/// `Arc<dyn LogStore>`.
#[async_trait]
pub trait LogStore: Send + Sync {
    /// All entries for `subject`, in a stable (insertion) order.
    async fn find_by_subject(&self, subject: &str) -> Result<Vec<LogEntry>, StateError>;

    /// Insert the entry, or update its failure bookkeeping if
    /// `(subject, document_id)` is already logged.
    ///
    /// Fails with [`StateError::MissingDocumentId`] for an empty document ID.
    async fn upsert(&self, entry: &LogEntry) -> Result<(), StateError>;
}

const ENTRY_COLUMNS: &str = "subject, document_id, retrieve_locator, document_type, title, hash, size, creation_time, log_date, last_error, failure_count";

/// SQLite implementation of the log store.
pub struct SqliteLogStore {
    /// Wrapped in Mutex because rusqlite::Connection is not Sync.
    conn: Mutex<Connection>,
    path: PathBuf,
}

impl std::fmt::Debug for SqliteLogStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteLogStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl SqliteLogStore {
    /// Open or create a database at the given path.
    pub async fn open(path: &Path) -> Result<Self, StateError> {
        let path = path.to_path_buf();
        let path_clone = path.clone();

        let conn = tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&path_clone).map_err(|e| StateError::Open {
                path: path_clone.clone(),
                source: e,
            })?;

            conn.pragma_update(None, "journal_mode", "WAL")
                .map_err(StateError::Migration)?;
            conn.pragma_update(None, "synchronous", "NORMAL")
                .map_err(StateError::Migration)?;

            schema::migrate(&conn)?;

            Ok::<_, StateError>(conn)
        })
        .await??;

        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    /// Open an in-memory database (for testing).
    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, StateError> {
        let conn = Connection::open_in_memory().map_err(|e| StateError::Open {
            path: PathBuf::from(":memory:"),
            source: e,
        })?;
        schema::migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: PathBuf::from(":memory:"),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StateError> {
        self.conn
            .lock()
            .map_err(|e| StateError::Query(e.to_string()))
    }

    /// Failing entries, optionally restricted to one subject.
    pub async fn failing(&self, subject: Option<&str>) -> Result<Vec<LogEntry>, StateError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {ENTRY_COLUMNS} FROM log_entries \
                 WHERE failure_count > 0 AND (?1 IS NULL OR subject = ?1) \
                 ORDER BY subject, rowid"
            ))
            .map_err(StateError::query)?;

        let entries = stmt
            .query_map([subject], row_to_log_entry)
            .map_err(StateError::query)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(StateError::query)?;

        Ok(entries)
    }

    pub async fn summary(&self) -> Result<LogSummary, StateError> {
        let conn = self.lock()?;

        let (total_entries, failing, subjects): (i64, i64, i64) = conn
            .query_row(
                "SELECT COUNT(*), COALESCE(SUM(failure_count > 0), 0), COUNT(DISTINCT subject) FROM log_entries",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .map_err(StateError::query)?;

        let last_sync: Option<(Option<i64>, Option<i64>)> = conn
            .query_row(
                "SELECT started_at, completed_at FROM sync_runs ORDER BY id DESC LIMIT 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(StateError::query)?;

        let (last_sync_started, last_sync_completed) = match last_sync {
            Some((started, completed)) => (
                started.and_then(|ts| Utc.timestamp_opt(ts, 0).single()),
                completed.and_then(|ts| Utc.timestamp_opt(ts, 0).single()),
            ),
            None => (None, None),
        };

        Ok(LogSummary {
            total_entries: total_entries as u64,
            succeeded: (total_entries - failing) as u64,
            failing: failing as u64,
            subjects: subjects as u64,
            last_sync_started,
            last_sync_completed,
        })
    }

    /// Start a new sync run and return its ID.
    pub async fn start_sync_run(&self) -> Result<i64, StateError> {
        let started_at = Utc::now().timestamp();
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO sync_runs (started_at) VALUES (?1)",
            [started_at],
        )
        .map_err(StateError::query)?;
        Ok(conn.last_insert_rowid())
    }

    /// Complete a sync run with statistics.
    pub async fn complete_sync_run(
        &self,
        run_id: i64,
        stats: &SyncRunStats,
    ) -> Result<(), StateError> {
        let completed_at = Utc::now().timestamp();
        let conn = self.lock()?;
        conn.execute(
            "UPDATE sync_runs SET completed_at = ?1, subjects_synced = ?2, subjects_failed = ?3, \
             documents_discovered = ?4, documents_copied = ?5, documents_failed = ?6, interrupted = ?7 \
             WHERE id = ?8",
            rusqlite::params![
                completed_at,
                stats.subjects_synced as i64,
                stats.subjects_failed as i64,
                stats.documents_discovered as i64,
                stats.documents_copied as i64,
                stats.documents_failed as i64,
                stats.interrupted as i64,
                run_id
            ],
        )
        .map_err(StateError::query)?;
        Ok(())
    }
}

#[async_trait]
impl LogStore for SqliteLogStore {
    async fn find_by_subject(&self, subject: &str) -> Result<Vec<LogEntry>, StateError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare_cached(&format!(
                "SELECT {ENTRY_COLUMNS} FROM log_entries WHERE subject = ?1 ORDER BY rowid"
            ))
            .map_err(StateError::query)?;

        let entries = stmt
            .query_map([subject], row_to_log_entry)
            .map_err(StateError::query)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(StateError::query)?;

        Ok(entries)
    }

    async fn upsert(&self, entry: &LogEntry) -> Result<(), StateError> {
        if entry.document_id.is_empty() {
            return Err(StateError::MissingDocumentId {
                subject: entry.subject.clone(),
            });
        }

        let conn = self.lock()?;

        // Identity, locator, type, log date and descriptive metadata are
        // written once; conflicts only touch the failure bookkeeping.
        conn.execute(
            &format!(
                "INSERT INTO log_entries ({ENTRY_COLUMNS}) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11) \
                 ON CONFLICT(subject, document_id) DO UPDATE SET \
                     last_error = excluded.last_error, \
                     failure_count = excluded.failure_count"
            ),
            rusqlite::params![
                &entry.subject,
                &entry.document_id,
                &entry.retrieve_locator,
                &entry.document_type,
                &entry.title,
                &entry.hash,
                entry.size as i64,
                to_timestamp(entry.creation_time),
                to_timestamp(entry.log_date),
                &entry.last_error,
                entry.failure_count,
            ],
        )
        .map_err(StateError::query)?;

        Ok(())
    }
}

/// Source timestamps are naive wall-clock values; they are stored as the
/// seconds they would be in UTC so ordering is preserved.
fn to_timestamp(dt: NaiveDateTime) -> i64 {
    dt.and_utc().timestamp()
}

fn from_timestamp(ts: i64) -> NaiveDateTime {
    DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.naive_utc())
        .unwrap_or_default()
}

fn row_to_log_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<LogEntry> {
    let size: i64 = row.get(6)?;
    Ok(LogEntry {
        subject: row.get(0)?,
        document_id: row.get(1)?,
        retrieve_locator: row.get(2)?,
        document_type: row.get(3)?,
        title: row.get(4)?,
        hash: row.get(5)?,
        size: u64::try_from(size).unwrap_or_default(),
        creation_time: from_timestamp(row.get(7)?),
        log_date: from_timestamp(row.get(8)?),
        last_error: row.get(9)?,
        failure_count: row.get(10)?,
    })
}
