use anyhow::Result;
use chrono::Utc;
use rusqlite::{params, Connection};
use std::sync::{Mutex, MutexGuard};

/// Persistent ad-id → delivered marker. Keys are namespaced so a filter
/// policy change can invalidate prior state by bumping the namespace in
/// config. No expiry: once marked, an id is suppressed forever.
///
/// The connection sits behind a std Mutex so the store can be shared
/// between the timer task and the HTTP trigger; every call locks for the
/// duration of one statement.
pub struct SeenStore {
    conn: Mutex<Connection>,
    namespace: String,
}

impl SeenStore {
    pub fn open(path: &str, namespace: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn, namespace)
    }

    pub fn open_in_memory(namespace: &str) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn, namespace)
    }

    fn with_connection(conn: Connection, namespace: &str) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS seen (
                key TEXT PRIMARY KEY,
                seen_at TEXT NOT NULL
            )",
            [],
        )?;
        Ok(SeenStore {
            conn: Mutex::new(conn),
            namespace: namespace.to_string(),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // A poisoned lock means another thread panicked mid-query; the
        // connection itself is still usable
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn key(&self, id: &str) -> String {
        format!("{}:{}", self.namespace, id)
    }

    pub fn has_seen(&self, id: &str) -> Result<bool> {
        let exists: bool = self.conn().query_row(
            "SELECT EXISTS(SELECT 1 FROM seen WHERE key = ?1)",
            params![self.key(id)],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    pub fn mark_seen(&self, id: &str) -> Result<()> {
        self.conn().execute(
            "INSERT OR IGNORE INTO seen (key, seen_at) VALUES (?1, ?2)",
            params![self.key(id), Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn count(&self) -> Result<u64> {
        let count: u64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM seen", [], |row| row.get(0))?;
        Ok(count)
    }
}
