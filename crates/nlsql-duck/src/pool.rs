//! Connection pool over a single DuckDB database instance
//!
//! DuckDB connections are `Send` but not `Sync`, so each call checks one out,
//! uses it on the calling thread and hands it back when the guard drops.
//! Connections are cheap clones of a base connection and share the same
//! database, including in-memory databases.

use duckdb::Connection;
use std::ops::Deref;
use std::sync::Mutex;

use crate::ExecutionError;

pub struct ConnectionPool {
    base: Mutex<Connection>,
    idle: Mutex<Vec<Connection>>,
    max_idle: usize,
}

impl ConnectionPool {
    pub fn new(base: Connection, max_idle: usize) -> Self {
        Self {
            base: Mutex::new(base),
            idle: Mutex::new(Vec::with_capacity(max_idle)),
            max_idle: max_idle.max(1),
        }
    }

    pub fn acquire(&self) -> Result<PooledConnection<'_>, ExecutionError> {
        let reused = self
            .idle
            .lock()
            .map_err(|_| ExecutionError::Pool("idle list poisoned".to_string()))?
            .pop();

        let conn = match reused {
            Some(conn) => conn,
            None => self
                .base
                .lock()
                .map_err(|_| ExecutionError::Pool("base connection poisoned".to_string()))?
                .try_clone()?,
        };

        Ok(PooledConnection {
            pool: self,
            conn: Some(conn),
        })
    }

    fn release(&self, conn: Connection) {
        if let Ok(mut idle) = self.idle.lock() {
            if idle.len() < self.max_idle {
                idle.push(conn);
            }
        }
    }

    pub fn idle_count(&self) -> usize {
        self.idle.lock().map(|idle| idle.len()).unwrap_or(0)
    }
}

/// Checked-out connection, returned to the pool on drop
pub struct PooledConnection<'a> {
    pool: &'a ConnectionPool,
    conn: Option<Connection>,
}

impl Deref for PooledConnection<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.conn.as_ref().expect("connection is only taken on drop")
    }
}

impl Drop for PooledConnection<'_> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn);
        }
    }
}
