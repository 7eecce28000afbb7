use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use rusqlite_migration::{Migrations, M};

use crate::app::{RelayError, Result};
use crate::domain::SeenRecord;
use crate::store::SeenStore;

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init()?;
        Ok(store)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init()?;
        Ok(store)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| {
            RelayError::Database(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(1),
                Some(e.to_string()),
            ))
        })
    }

    fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| s.parse::<DateTime<Utc>>().ok())
    }

    fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<SeenRecord> {
        Ok(SeenRecord {
            id: row.get(0)?,
            sent_at: row
                .get::<_, String>(1)
                .ok()
                .and_then(|s| Self::parse_datetime(&s))
                .unwrap_or_else(Utc::now),
        })
    }
}

impl SeenStore for SqliteStore {
    fn init(&self) -> Result<()> {
        let migrations = Migrations::new(vec![M::up(include_str!(
            "../../migrations/001-initial/up.sql"
        ))]);

        let mut conn = self.lock()?;
        migrations.to_latest(&mut conn)?;
        Ok(())
    }

    fn is_sent(&self, id: &str) -> Result<bool> {
        let conn = self.lock()?;
        let found = conn
            .query_row(
                "SELECT 1 FROM sent_items WHERE id = ?1",
                params![id],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn mark_sent(&self, id: &str) -> Result<bool> {
        let conn = self.lock()?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO sent_items (id, sent_at) VALUES (?1, ?2)",
            params![id, Utc::now().to_rfc3339()],
        )?;
        Ok(inserted > 0)
    }

    fn count(&self) -> Result<i64> {
        let conn = self.lock()?;
        let count = conn.query_row("SELECT COUNT(*) FROM sent_items", [], |row| row.get(0))?;
        Ok(count)
    }

    fn recent(&self, limit: usize) -> Result<Vec<SeenRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, sent_at FROM sent_items ORDER BY sent_at DESC, id LIMIT ?1",
        )?;
        let records = stmt
            .query_map(params![limit as i64], Self::row_to_record)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }
}
