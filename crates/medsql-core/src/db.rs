// Read-only SQLite connection pool for the practice database.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use r2d2::PooledConnection;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::ValueRef;
use rusqlite::OpenFlags;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::sql::{is_read_only, quote_identifier};

#[derive(Debug, Error)]
pub enum DbError {
    #[error("database not found at {path}; run `medsql init-db` to create it")]
    NotFound { path: PathBuf },

    #[error("no tables found in database {path}; run `medsql init-db` to initialize it")]
    NoTables { path: PathBuf },

    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("only read-only statements are allowed: {statement}")]
    ReadOnlyViolation { statement: String },

    #[error("unknown table `{name}`")]
    UnknownTable { name: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Values and results
// ---------------------------------------------------------------------------

/// A single cell value as returned by SQLite.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl SqlValue {
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            SqlValue::Null => serde_json::Value::Null,
            SqlValue::Integer(i) => serde_json::Value::from(*i),
            SqlValue::Real(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            SqlValue::Text(s) => serde_json::Value::String(s.clone()),
            SqlValue::Blob(b) => serde_json::Value::String(format!("<{} bytes>", b.len())),
        }
    }
}

impl From<ValueRef<'_>> for SqlValue {
    fn from(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => SqlValue::Null,
            ValueRef::Integer(i) => SqlValue::Integer(i),
            ValueRef::Real(f) => SqlValue::Real(f),
            ValueRef::Text(t) => SqlValue::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => SqlValue::Blob(b.to_vec()),
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => write!(f, "NULL"),
            SqlValue::Integer(i) => write!(f, "{i}"),
            SqlValue::Real(r) => write!(f, "{r}"),
            SqlValue::Text(s) => write!(f, "{s}"),
            SqlValue::Blob(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

impl Serialize for SqlValue {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

/// Rows returned by a query, capped at the caller's row limit.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<SqlValue>>,
    /// More rows existed than were returned.
    pub truncated: bool,
}

impl QueryResult {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// One JSON object per row, keys in column order.
    pub fn to_records(&self) -> Vec<String> {
        self.rows
            .iter()
            .map(|row| {
                let fields: Vec<String> = self
                    .columns
                    .iter()
                    .zip(row)
                    .map(|(col, val)| {
                        format!(
                            "{}: {}",
                            serde_json::Value::String(col.clone()),
                            val.to_json()
                        )
                    })
                    .collect();
                format!("{{{}}}", fields.join(", "))
            })
            .collect()
    }

    pub fn to_markdown_table(&self) -> String {
        if self.columns.is_empty() {
            return String::new();
        }
        let cell = |s: String| s.replace('|', "\\|").replace('\n', " ");

        let mut out = format!("| {} |\n", self.columns.join(" | "));
        out.push_str(&format!(
            "|{}\n",
            self.columns.iter().map(|_| "---|").collect::<String>()
        ));
        for row in &self.rows {
            let cells: Vec<String> = row.iter().map(|v| cell(v.to_string())).collect();
            out.push_str(&format!("| {} |\n", cells.join(" | ")));
        }
        if self.truncated {
            out.push_str(&format!("\n_Showing the first {} rows._\n", self.rows.len()));
        }
        out
    }
}

/// Outcome of [`Database::validate`].
#[derive(Debug, Clone)]
pub struct DatabaseHealth {
    pub path: PathBuf,
    pub tables: Vec<(String, i64)>,
    pub empty_tables: Vec<String>,
}

/// Connectivity report; never an error.
#[derive(Debug, Clone)]
pub struct Diagnostics {
    pub path: PathBuf,
    pub reachable: bool,
    pub elapsed: Duration,
    pub tables: Vec<(String, i64)>,
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// Database
// ---------------------------------------------------------------------------

/// Pooled read-only access to the practice database.
#[derive(Clone)]
pub struct Database {
    pool: r2d2::Pool<SqliteConnectionManager>,
    path: PathBuf,
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database").field("path", &self.path).finish()
    }
}

impl Database {
    /// Open a pool of read-only connections to an existing database file.
    pub fn open(path: &Path, pool_size: u32, timeout: Duration) -> Result<Self, DbError> {
        if !path.is_file() {
            return Err(DbError::NotFound {
                path: path.to_path_buf(),
            });
        }

        let manager = SqliteConnectionManager::file(path)
            .with_flags(
                OpenFlags::SQLITE_OPEN_READ_ONLY
                    | OpenFlags::SQLITE_OPEN_NO_MUTEX
                    | OpenFlags::SQLITE_OPEN_URI,
            )
            .with_init(move |conn| conn.busy_timeout(timeout));

        let pool = r2d2::Pool::builder()
            .max_size(pool_size)
            .connection_timeout(timeout)
            .build(manager)?;

        info!("Opened read-only pool for {} (size {pool_size})", path.display());
        Ok(Database {
            pool,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, DbError> {
        Ok(self.pool.get()?)
    }

    /// Run `f` against a pooled connection.
    pub fn with_conn<T>(
        &self,
        f: impl FnOnce(&rusqlite::Connection) -> Result<T, rusqlite::Error>,
    ) -> Result<T, DbError> {
        let conn = self.conn()?;
        Ok(f(&conn)?)
    }

    /// User tables in name order; internal `sqlite_*` tables are excluded.
    pub fn list_tables(&self) -> Result<Vec<String>, DbError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT name FROM sqlite_master
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
             ORDER BY name",
        )?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }

    /// Row count for a known table.
    pub fn row_count(&self, table: &str) -> Result<i64, DbError> {
        if !self.list_tables()?.iter().any(|t| t == table) {
            return Err(DbError::UnknownTable {
                name: table.to_string(),
            });
        }
        self.count_rows(table)
    }

    fn count_rows(&self, table: &str) -> Result<i64, DbError> {
        let conn = self.conn()?;
        let sql = format!("SELECT COUNT(*) FROM {}", quote_identifier(table));
        Ok(conn.query_row(&sql, [], |row| row.get(0))?)
    }

    /// Check that the database has tables and report row counts. Empty
    /// tables are logged but do not fail validation.
    pub fn validate(&self) -> Result<DatabaseHealth, DbError> {
        let names = self.list_tables()?;
        if names.is_empty() {
            return Err(DbError::NoTables {
                path: self.path.clone(),
            });
        }

        let mut tables = Vec::with_capacity(names.len());
        let mut empty_tables = Vec::new();
        for name in names {
            let count = self.count_rows(&name)?;
            if count == 0 {
                warn!("Table {name} is empty");
                empty_tables.push(name.clone());
            }
            tables.push((name, count));
        }

        info!(
            "Database {} validated: {} tables",
            self.path.display(),
            tables.len()
        );
        Ok(DatabaseHealth {
            path: self.path.clone(),
            tables,
            empty_tables,
        })
    }

    /// Time a table listing and collect row counts.
    pub fn diagnostics(&self) -> Diagnostics {
        let start = Instant::now();
        let outcome = self.list_tables().and_then(|names| {
            names
                .into_iter()
                .map(|name| self.count_rows(&name).map(|n| (name, n)))
                .collect::<Result<Vec<_>, _>>()
        });
        let elapsed = start.elapsed();

        match outcome {
            Ok(tables) => Diagnostics {
                path: self.path.clone(),
                reachable: true,
                elapsed,
                tables,
                error: None,
            },
            Err(e) => {
                warn!("Diagnostics failed: {e}");
                Diagnostics {
                    path: self.path.clone(),
                    reachable: false,
                    elapsed,
                    tables: Vec::new(),
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// Execute a read-only statement, keeping at most `max_rows` rows.
    pub fn run_query(&self, sql: &str, max_rows: usize) -> Result<QueryResult, DbError> {
        if !is_read_only(sql) {
            return Err(DbError::ReadOnlyViolation {
                statement: sql.trim().to_string(),
            });
        }

        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql.trim().trim_end_matches(';'))?;
        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
        let width = columns.len();

        let mut rows_out = Vec::new();
        let mut truncated = false;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            if rows_out.len() >= max_rows {
                truncated = true;
                break;
            }
            let mut values = Vec::with_capacity(width);
            for i in 0..width {
                values.push(SqlValue::from(row.get_ref(i)?));
            }
            rows_out.push(values);
        }

        Ok(QueryResult {
            columns,
            rows: rows_out,
            truncated,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
