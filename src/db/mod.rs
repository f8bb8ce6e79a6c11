//! Read-only access to the target SQLite database.
//!
//! Every call opens its own connection inside `spawn_blocking`; the
//! connection is dropped when the closure returns, on success or error.

use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use itertools::Itertools;
use rusqlite::types::Value;
use rusqlite::{Connection, OpenFlags};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Rows returned by a capped query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryOutput {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    /// More rows were available than the cap allowed.
    pub truncated: bool,
}

impl QueryOutput {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Render as a Markdown table: header, `---` separator, one line per row.
    pub fn to_markdown(&self) -> String {
        let mut lines = Vec::with_capacity(self.rows.len() + 2);
        lines.push(format!(
            "| {} |",
            self.columns.iter().map(|c| escape_cell(c)).join(" | ")
        ));
        lines.push(format!(
            "| {} |",
            self.columns.iter().map(|_| "---").join(" | ")
        ));
        for row in &self.rows {
            lines.push(format!("| {} |", row.iter().map(format_value).join(" | ")));
        }
        lines.join("\n")
    }
}

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|")
        .replace("\r\n", "\\n")
        .replace('\n', "\\n")
}

fn format_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Real(f) => format!("{:?}", f),
        Value::Text(s) => escape_cell(s),
        Value::Blob(b) => format!("<blob {} bytes>", b.len()),
    }
}

/// Quote an identifier for SQLite, doubling embedded quotes.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[async_trait]
pub trait DataStore: Send + Sync {
    /// Distinct non-null values of `table.column`, rendered as text.
    async fn distinct_values(&self, table: &str, column: &str) -> Result<Vec<String>>;

    /// Run one statement and fetch at most `row_cap` rows.
    async fn fetch(&self, sql: &str, row_cap: usize) -> Result<QueryOutput>;
}

/// SQLite file opened read-only for every call.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    path: PathBuf,
}

impl SqliteStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(path: &Path) -> Result<Connection> {
        Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| PipelineError::Database(format!("Failed to open {}: {}", path.display(), e)))
    }

    async fn with_connection<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || {
            let connection = Self::open(&path)?;
            f(&connection)
        })
        .await
        .map_err(|e| PipelineError::Database(format!("Database task failed: {}", e)))?
    }
}

fn value_as_text(value: Value) -> Option<String> {
    match value {
        Value::Text(s) => Some(s),
        Value::Integer(i) => Some(i.to_string()),
        Value::Real(f) => Some(f.to_string()),
        Value::Null | Value::Blob(_) => None,
    }
}

fn fetch_capped(connection: &Connection, sql: &str, row_cap: usize) -> Result<QueryOutput> {
    let mut statement = connection.prepare(sql)?;
    let columns = statement
        .column_names()
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>();

    let mut rows = statement.query([])?;
    let mut result_rows = Vec::new();
    let mut truncated = false;
    while let Some(row) = rows.next()? {
        if result_rows.len() >= row_cap {
            truncated = true;
            break;
        }
        let record = (0..columns.len())
            .map(|index| row.get::<usize, Value>(index))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        result_rows.push(record);
    }

    Ok(QueryOutput {
        columns,
        rows: result_rows,
        truncated,
    })
}

#[async_trait]
impl DataStore for SqliteStore {
    async fn distinct_values(&self, table: &str, column: &str) -> Result<Vec<String>> {
        let sql = format!(
            "SELECT DISTINCT {col} FROM {table} WHERE {col} IS NOT NULL",
            col = quote_identifier(column),
            table = quote_identifier(table),
        );
        debug!("Distinct value lookup: {}", sql);

        self.with_connection(move |connection| {
            let mut statement = connection.prepare(&sql)?;
            let values = statement
                .query_map([], |row| row.get::<usize, Value>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(values.into_iter().filter_map(value_as_text).collect())
        })
        .await
    }

    async fn fetch(&self, sql: &str, row_cap: usize) -> Result<QueryOutput> {
        let sql = sql.to_string();
        self.with_connection(move |connection| fetch_capped(connection, &sql, row_cap))
            .await
    }
}
