//! Session persistence using SQLite

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use crate::session::{SessionState, SessionStore};
use crate::{Error, Result};

/// SQLite-based session store; one JSON row per session
pub struct SqliteSessionStore {
    conn: Mutex<Connection>,
}

impl SqliteSessionStore {
    /// Open (or create) the database at `db_path`
    pub fn new(db_path: &str) -> Result<Self> {
        if let Some(parent) = std::path::Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(db_path)?;
        Self::with_connection(conn)
    }

    /// Create an in-memory session store (for testing)
    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_tables()?;
        Ok(store)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Other("session store lock poisoned".to_string()))
    }

    /// Initialize database tables
    fn init_tables(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                state TEXT NOT NULL,
                expires_at INTEGER NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_sessions_expires_at ON sessions(expires_at)",
            [],
        )?;

        Ok(())
    }

    /// Count stored sessions, expired ones included
    pub fn count(&self) -> Result<usize> {
        let count: i64 = self
            .conn()?
            .query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn load(&self, session_id: &str) -> Result<Option<SessionState>> {
        let conn = self.conn()?;

        let row: Option<(String, i64)> = conn
            .query_row(
                "SELECT state, expires_at FROM sessions WHERE id = ?1",
                params![session_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((state_json, expires_at)) = row else {
            return Ok(None);
        };

        if expires_at <= Utc::now().timestamp() {
            conn.execute("DELETE FROM sessions WHERE id = ?1", params![session_id])?;
            return Ok(None);
        }

        Ok(Some(serde_json::from_str(&state_json)?))
    }

    async fn save(&self, session_id: &str, state: &SessionState) -> Result<()> {
        let state_json = serde_json::to_string(state)?;
        self.conn()?.execute(
            "INSERT OR REPLACE INTO sessions (id, state, expires_at, updated_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                session_id,
                state_json,
                state.expires_at.timestamp(),
                state.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    async fn remove(&self, session_id: &str) -> Result<()> {
        self.conn()?
            .execute("DELETE FROM sessions WHERE id = ?1", params![session_id])?;
        Ok(())
    }

    async fn purge_expired(&self) -> Result<usize> {
        let affected = self.conn()?.execute(
            "DELETE FROM sessions WHERE expires_at <= ?1",
            params![Utc::now().timestamp()],
        )?;
        Ok(affected)
    }
}
