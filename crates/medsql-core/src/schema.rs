// Schema discovery through SQLite's pragma table-valued functions.

use std::fmt::Write as _;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rusqlite::params;
use tracing::{debug, info};

use crate::db::{Database, DbError, QueryResult};
use crate::sql::quote_identifier;

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub primary_key: bool,
    pub nullable: bool,
    pub default_value: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForeignKey {
    pub from: String,
    pub to_table: String,
    pub to_column: String,
}

#[derive(Debug, Clone)]
pub struct TableSchema {
    pub name: String,
    pub row_count: i64,
    pub columns: Vec<ColumnInfo>,
    pub foreign_keys: Vec<ForeignKey>,
    pub sample: QueryResult,
}

impl TableSchema {
    /// Short per-table description used by the `describe_table` tool.
    pub fn describe(&self) -> String {
        let mut out = String::new();
        self.render_into(&mut out);
        out
    }

    fn render_into(&self, out: &mut String) {
        let _ = writeln!(out, "## Table: {} ({} rows)", self.name, self.row_count);
        out.push_str("### Columns:\n");
        for col in &self.columns {
            let pk = if col.primary_key { " (PK)" } else { "" };
            let null = if col.nullable { "NULL" } else { "NOT NULL" };
            let default = col
                .default_value
                .as_deref()
                .map(|d| format!(" DEFAULT {d}"))
                .unwrap_or_default();
            let _ = writeln!(out, "- {}: {}{pk} {null}{default}", col.name, col.data_type);
        }

        if !self.foreign_keys.is_empty() {
            out.push_str("### Relationships:\n");
            for fk in &self.foreign_keys {
                let _ = writeln!(out, "- {} → {}.{}", fk.from, fk.to_table, fk.to_column);
            }
        }

        if !self.sample.is_empty() {
            out.push_str("### Sample Data:\n```\n");
            for record in self.sample.to_records() {
                out.push_str(&record);
                out.push('\n');
            }
            out.push_str("```\n");
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DatabaseSchema {
    pub tables: Vec<TableSchema>,
}

impl DatabaseSchema {
    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.iter().find(|t| t.name.eq_ignore_ascii_case(name))
    }

    pub fn table_names(&self) -> Vec<&str> {
        self.tables.iter().map(|t| t.name.as_str()).collect()
    }

    pub fn total_rows(&self) -> i64 {
        self.tables.iter().map(|t| t.row_count).sum()
    }

    /// Markdown schema description handed to the model.
    pub fn render_markdown(&self) -> String {
        let mut out = String::from("# Database Schema\n\n");
        for table in &self.tables {
            table.render_into(&mut out);
            out.push('\n');
        }
        out
    }
}

/// Read tables, columns, foreign keys and `sample_rows` sample rows per table.
pub fn introspect(db: &Database, sample_rows: usize) -> Result<DatabaseSchema, DbError> {
    let start = Instant::now();
    let names = db.list_tables()?;
    let mut tables = Vec::with_capacity(names.len());

    for name in names {
        let columns = read_columns(db, &name)?;
        let foreign_keys = read_foreign_keys(db, &name)?;
        let row_count = db.row_count(&name)?;
        let sample = if sample_rows > 0 {
            db.run_query(
                &format!("SELECT * FROM {} LIMIT {sample_rows}", quote_identifier(&name)),
                sample_rows,
            )?
        } else {
            QueryResult::default()
        };
        debug!("Introspected {name}: {} columns", columns.len());
        tables.push(TableSchema {
            name,
            row_count,
            columns,
            foreign_keys,
            sample,
        });
    }

    info!(
        "Schema fetched in {:.2} seconds ({} tables)",
        start.elapsed().as_secs_f64(),
        tables.len()
    );
    Ok(DatabaseSchema { tables })
}

fn read_columns(db: &Database, table: &str) -> Result<Vec<ColumnInfo>, DbError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT name, type, \"notnull\", dflt_value, pk FROM pragma_table_info(?1) ORDER BY cid",
        )?;
        let columns = stmt
            .query_map(params![table], |row| {
                let not_null: i64 = row.get(2)?;
                let pk: i64 = row.get(4)?;
                Ok(ColumnInfo {
                    name: row.get(0)?,
                    data_type: row.get(1)?,
                    primary_key: pk > 0,
                    nullable: not_null == 0,
                    default_value: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(columns)
    })
}

fn read_foreign_keys(db: &Database, table: &str) -> Result<Vec<ForeignKey>, DbError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT \"from\", \"table\", \"to\" FROM pragma_foreign_key_list(?1) ORDER BY id, seq",
        )?;
        let keys = stmt
            .query_map(params![table], |row| {
                let to_column: Option<String> = row.get(2)?;
                Ok(ForeignKey {
                    from: row.get(0)?,
                    to_table: row.get(1)?,
                    // A bare REFERENCES clause targets the primary key.
                    to_column: to_column.unwrap_or_else(|| "id".to_string()),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(keys)
    })
}

// ---------------------------------------------------------------------------
// SchemaCache
// ---------------------------------------------------------------------------

/// Keeps the introspected schema for `ttl` before reloading it.
pub struct SchemaCache {
    ttl: Duration,
    entry: Mutex<Option<(Instant, Arc<DatabaseSchema>)>>,
}

impl SchemaCache {
    pub fn new(ttl: Duration) -> Self {
        SchemaCache {
            ttl,
            entry: Mutex::new(None),
        }
    }

    /// The cached schema if still fresh, else a newly introspected one.
    pub fn get_or_load(
        &self,
        db: &Database,
        sample_rows: usize,
    ) -> Result<Arc<DatabaseSchema>, DbError> {
        let mut entry = self.entry.lock().expect("schema cache mutex poisoned");
        if let Some((loaded_at, schema)) = entry.as_ref() {
            if loaded_at.elapsed() < self.ttl {
                return Ok(Arc::clone(schema));
            }
            debug!("Schema cache expired");
        }

        let schema = Arc::new(introspect(db, sample_rows)?);
        *entry = Some((Instant::now(), Arc::clone(&schema)));
        Ok(schema)
    }

    /// The cached schema regardless of age, if any.
    pub fn peek(&self) -> Option<Arc<DatabaseSchema>> {
        self.entry
            .lock()
            .expect("schema cache mutex poisoned")
            .as_ref()
            .map(|(_, schema)| Arc::clone(schema))
    }

    pub fn invalidate(&self) {
        *self.entry.lock().expect("schema cache mutex poisoned") = None;
    }
}
