//! DuckDB execution gateway
//!
//! Runs SQL text produced by the translation layer and answers the
//! introspection queries used to ground it. Every call checks a connection out
//! of the pool and returns it on all exit paths. Statements run exactly as
//! given: no validation, no implicit transaction beyond the single statement.

use duckdb::Connection;
use nlsql_schema::ColumnDescriptor;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::debug;

mod introspect;
mod pool;
pub mod value;

pub use introspect::IntrospectedSchema;
pub use pool::{ConnectionPool, PooledConnection};

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("{0}")]
    Database(#[from] duckdb::Error),

    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Table '{0}' not found in database")]
    TableNotFound(String),

    #[error("Execution task failed: {0}")]
    Task(String),
}

/// Rows materialized in memory with their column names
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TabularResult {
    pub columns: Vec<String>,
    pub records: Vec<serde_json::Map<String, serde_json::Value>>,
    pub row_count: usize,
}

impl TabularResult {
    pub fn is_empty(&self) -> bool {
        self.row_count == 0
    }
}

/// Tabular result or the database's rejection
pub type ExecutionResult = Result<TabularResult, ExecutionError>;

/// Whether a statement only reads data
///
/// Decided from the leading keyword, so a `WITH` that wraps a DML statement is
/// still treated as a read.
pub fn is_read_only(sql: &str) -> bool {
    let head = sql
        .trim_start_matches(|c: char| c.is_whitespace() || c == '(')
        .split(|c: char| c.is_whitespace() || c == '(')
        .next()
        .unwrap_or("")
        .to_ascii_lowercase();
    matches!(
        head.as_str(),
        "select" | "show" | "with" | "describe" | "explain" | "values" | "from" | "summarize"
    )
}

pub const DEFAULT_POOL_SIZE: usize = 4;

pub struct DuckGateway {
    pool: ConnectionPool,
}

impl DuckGateway {
    /// Open a database file, or a private in-memory database for `:memory:`
    pub fn open<P: AsRef<Path>>(path: P, pool_size: usize) -> Result<Self, ExecutionError> {
        let conn = if path.as_ref().as_os_str() == ":memory:" {
            Connection::open_in_memory()?
        } else {
            Connection::open(path)?
        };
        Ok(Self::from_connection(conn, pool_size))
    }

    pub fn in_memory() -> Result<Self, ExecutionError> {
        Ok(Self::from_connection(Connection::open_in_memory()?, DEFAULT_POOL_SIZE))
    }

    pub fn from_connection(conn: Connection, pool_size: usize) -> Self {
        Self {
            pool: ConnectionPool::new(conn, pool_size),
        }
    }

    pub fn connection(&self) -> Result<PooledConnection<'_>, ExecutionError> {
        self.pool.acquire()
    }

    /// Run a script of one or more statements, e.g. seed DDL
    pub fn run_script(&self, script: &str) -> Result<(), ExecutionError> {
        self.connection()?.execute_batch(script)?;
        Ok(())
    }

    /// Execute one statement and materialize every row
    ///
    /// Zero rows is a successful empty result with no columns.
    pub fn execute(&self, sql: &str) -> ExecutionResult {
        let started = Instant::now();
        let conn = self.connection()?;
        let mut stmt = conn.prepare(sql)?;
        let mut rows = stmt.query([])?;

        let mut columns: Vec<String> = Vec::new();
        let mut records = Vec::new();

        while let Some(row) = rows.next()? {
            if columns.is_empty() {
                let meta = row.as_ref();
                for i in 0..meta.column_count() {
                    columns.push(meta.column_name(i)?.to_string());
                }
            }

            let mut record = serde_json::Map::new();
            for (i, col_name) in columns.iter().enumerate() {
                record.insert(col_name.clone(), value::to_json(row.get_ref(i)?));
            }
            records.push(record);
        }

        let row_count = records.len();
        debug!(
            row_count,
            duration_ms = started.elapsed().as_millis() as u64,
            "statement executed"
        );

        Ok(TabularResult {
            columns,
            records,
            row_count,
        })
    }

    /// Names of the base tables in the `main` schema; views are left out
    pub fn list_tables(&self) -> Result<Vec<String>, ExecutionError> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(
            "SELECT table_name FROM information_schema.tables \
             WHERE table_schema = 'main' AND table_type = 'BASE TABLE' \
             ORDER BY table_name",
        )?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<duckdb::Result<Vec<String>>>()?;
        Ok(names)
    }

    /// Ordered columns of one table with declared type and nullability
    pub fn describe_table(&self, table_name: &str) -> Result<Vec<ColumnDescriptor>, ExecutionError> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(
            "SELECT column_name, data_type, is_nullable \
             FROM information_schema.columns \
             WHERE table_schema = 'main' AND table_name = ? \
             ORDER BY ordinal_position",
        )?;

        let columns = stmt
            .query_map([table_name], |row| {
                let mut col = ColumnDescriptor::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?);
                col.nullable = row.get::<_, String>(2)? == "YES";
                Ok(col)
            })?
            .collect::<duckdb::Result<Vec<_>>>()?;

        if columns.is_empty() {
            return Err(ExecutionError::TableNotFound(table_name.to_string()));
        }
        Ok(columns)
    }

    /// Up to `limit` rows of a table
    pub fn sample_rows(&self, table_name: &str, limit: usize) -> ExecutionResult {
        let sql = format!(
            "SELECT * FROM \"{}\" LIMIT {}",
            table_name.replace('"', "\"\""),
            limit
        );
        self.execute(&sql)
    }
}

/// Run a gateway call on the blocking pool
///
/// DuckDB calls block the thread; async callers go through here.
pub async fn run_blocking<T, F>(gateway: &Arc<DuckGateway>, f: F) -> Result<T, ExecutionError>
where
    F: FnOnce(&DuckGateway) -> Result<T, ExecutionError> + Send + 'static,
    T: Send + 'static,
{
    let gateway = Arc::clone(gateway);
    tokio::task::spawn_blocking(move || f(gateway.as_ref()))
        .await
        .map_err(|e| ExecutionError::Task(e.to_string()))?
}
