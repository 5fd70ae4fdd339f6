use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::store::{DedupError, DedupRecord, DedupStore};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS dedup_records (
        fingerprint TEXT PRIMARY KEY,
        artifact_ref TEXT NOT NULL,
        first_seen_at TEXT NOT NULL
    );
"#;

/// SQLite-backed deduplication record store
pub struct SqliteDedupStore {
    conn: Mutex<Connection>,
}

impl SqliteDedupStore {
    /// Open or create the store at `path`.
    pub fn new(path: &Path) -> Result<Self, DedupError> {
        let conn = Connection::open(path).map_err(|e| DedupError::Store(e.to_string()))?;
        Self::with_connection(conn)
    }

    /// Create an in-memory store (useful for testing)
    pub fn in_memory() -> Result<Self, DedupError> {
        let conn = Connection::open_in_memory().map_err(|e| DedupError::Store(e.to_string()))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, DedupError> {
        conn.execute_batch(SCHEMA)
            .map_err(|e| DedupError::Store(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl DedupStore for SqliteDedupStore {
    fn get(&self, fingerprint: &str) -> Result<Option<DedupRecord>, DedupError> {
        let conn = self.conn.lock().unwrap();

        let row: Option<(String, String)> = conn
            .query_row(
                "SELECT artifact_ref, first_seen_at FROM dedup_records WHERE fingerprint = ?",
                params![fingerprint],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(|e| DedupError::Store(e.to_string()))?;

        match row {
            None => Ok(None),
            Some((artifact_ref, first_seen_at)) => {
                let first_seen_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&first_seen_at)
                    .map_err(|e| DedupError::Store(format!("Invalid timestamp: {}", e)))?
                    .into();
                Ok(Some(DedupRecord {
                    fingerprint: fingerprint.to_string(),
                    artifact_ref,
                    first_seen_at,
                }))
            }
        }
    }

    fn put(&self, record: &DedupRecord) -> Result<(), DedupError> {
        let conn = self.conn.lock().unwrap();

        // Last-writer-wins on fingerprint collisions
        conn.execute(
            "INSERT INTO dedup_records (fingerprint, artifact_ref, first_seen_at)
             VALUES (?, ?, ?)
             ON CONFLICT(fingerprint) DO UPDATE SET artifact_ref = excluded.artifact_ref",
            params![
                record.fingerprint,
                record.artifact_ref,
                record.first_seen_at.to_rfc3339(),
            ],
        )
        .map_err(|e| DedupError::Store(e.to_string()))?;

        Ok(())
    }

    fn count(&self) -> Result<u64, DedupError> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM dedup_records", [], |row| row.get(0))
            .map_err(|e| DedupError::Store(e.to_string()))?;
        Ok(count as u64)
    }
}
