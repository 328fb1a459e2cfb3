//! SQLite-backed person records.

use lookout_core::{MetadataStore, PersonRecord, StoreError};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS people (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    name        TEXT NOT NULL,
    erp_id      TEXT NOT NULL,
    branch      TEXT NOT NULL,
    gender      TEXT NOT NULL,
    enrolled_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS people_name ON people(name);
";

/// Append-only `people` table. Rows are never updated or deleted.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Backend(e.to_string()))?;
        }
        let conn = Connection::open(path).map_err(backend)?;
        tracing::info!(path = %path.display(), "opened person database");
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory().map_err(backend)?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA).map_err(backend)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn count(&self) -> Result<usize, StoreError> {
        let conn = self.conn.lock().map_err(|e| StoreError::Backend(e.to_string()))?;
        let n: i64 = conn
            .query_row("SELECT COUNT(*) FROM people", [], |row| row.get(0))
            .map_err(backend)?;
        Ok(n as usize)
    }
}

fn backend(e: rusqlite::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

impl MetadataStore for SqliteStore {
    fn append(&self, record: &PersonRecord) -> Result<(), StoreError> {
        let conn = self.conn.lock().map_err(|e| StoreError::Backend(e.to_string()))?;
        conn.execute(
            "INSERT INTO people (name, erp_id, branch, gender, enrolled_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.name,
                record.erp_id,
                record.branch,
                record.gender,
                chrono::Utc::now().to_rfc3339(),
            ],
        )
        .map_err(backend)?;
        tracing::debug!(name = %record.name, "person record appended");
        Ok(())
    }

    fn lookup(&self, name: &str) -> Result<PersonRecord, StoreError> {
        let conn = self.conn.lock().map_err(|e| StoreError::Backend(e.to_string()))?;
        conn.query_row(
            "SELECT name, erp_id, branch, gender FROM people WHERE name = ?1 ORDER BY id DESC LIMIT 1",
            params![name],
            |row| {
                Ok(PersonRecord {
                    name: row.get(0)?,
                    erp_id: row.get(1)?,
                    branch: row.get(2)?,
                    gender: row.get(3)?,
                })
            },
        )
        .optional()
        .map_err(backend)?
        .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }
}
