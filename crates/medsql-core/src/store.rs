// SQLite persistence for query history and assistant state.

use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use rusqlite::{params, Connection};

/// Rows kept in `query_history`; older rows are deleted on insert.
pub const HISTORY_ROW_LIMIT: usize = 1000;

/// Writable store kept apart from the read-only practice database.
pub struct StateStore {
    conn: Mutex<Connection>,
    row_limit: usize,
}

impl StateStore {
    /// Open (or create) the store at `path` and ensure its tables exist.
    /// Pass `":memory:"` for an ephemeral store (useful for tests).
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open state store at {path}"))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;",
        )
        .context("failed to set state store pragmas")?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS query_history (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                question   TEXT NOT NULL,
                asked_at   TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                elapsed_ms INTEGER,
                sql        TEXT
            );

            CREATE TABLE IF NOT EXISTS kv_state (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            ",
        )
        .context("failed to create state store schema")?;

        Ok(Self {
            conn: Mutex::new(conn),
            row_limit: HISTORY_ROW_LIMIT,
        })
    }

    pub fn with_row_limit(mut self, row_limit: usize) -> Self {
        self.row_limit = row_limit.max(1);
        self
    }

    /// Panics if the mutex is poisoned.
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("state store mutex poisoned")
    }

    /// Append a processed question and drop rows beyond the row limit.
    /// `asked_at` is filled in by SQLite.
    pub fn record_query(&self, question: &str, elapsed_ms: Option<u64>, sql: Option<&str>) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO query_history (question, elapsed_ms, sql) VALUES (?1, ?2, ?3)",
            params![question, elapsed_ms.map(|ms| ms as i64), sql],
        )
        .context("failed to record query")?;
        conn.execute(
            "DELETE FROM query_history
             WHERE id <= (SELECT MAX(id) FROM query_history) - ?1",
            params![self.row_limit as i64],
        )
        .context("failed to trim query history")?;
        Ok(())
    }

    /// Distinct questions, newest first. A repeated question keeps the
    /// position of its first ask.
    pub fn recent_questions(&self, limit: usize) -> Result<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT question, MIN(id) AS first_id FROM query_history
                 GROUP BY question ORDER BY first_id DESC LIMIT ?1",
            )
            .context("failed to prepare recent_questions query")?;

        let questions = stmt
            .query_map(params![limit as i64], |row| row.get::<_, String>(0))
            .context("failed to query history")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to read history row")?;
        Ok(questions)
    }

    pub fn history_len(&self) -> Result<usize> {
        let conn = self.conn();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM query_history", [], |row| row.get(0))
            .context("failed to count history")?;
        Ok(count as usize)
    }

    pub fn clear_history(&self) -> Result<()> {
        let conn = self.conn();
        conn.execute("DELETE FROM query_history", [])
            .context("failed to clear query history")?;
        Ok(())
    }

    /// Save an arbitrary JSON value under `key`, replacing any previous value.
    pub fn save_state(&self, key: &str, value: &serde_json::Value) -> Result<()> {
        let conn = self.conn();
        let json_str =
            serde_json::to_string(value).context("failed to serialize state value")?;
        conn.execute(
            "INSERT OR REPLACE INTO kv_state (key, value) VALUES (?1, ?2)",
            params![key, json_str],
        )
        .context("failed to save state")?;
        Ok(())
    }

    pub fn load_state(&self, key: &str) -> Result<Option<serde_json::Value>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare("SELECT value FROM kv_state WHERE key = ?1")
            .context("failed to prepare load_state query")?;

        let mut rows = stmt
            .query_map(params![key], |row| row.get::<_, String>(0))
            .context("failed to query state")?;

        match rows.next() {
            Some(row_result) => {
                let json_str = row_result.context("failed to read state row")?;
                let value = serde_json::from_str(&json_str)
                    .context("failed to deserialize state value")?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }
}
