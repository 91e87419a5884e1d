//! Warehouse trait for schema lookup and query execution

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;

use crate::{QueryResultSet, TableRef};

#[derive(Debug, Error)]
pub enum WarehouseError {
    #[error("Table '{0}' not found")]
    TableNotFound(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Warehouse connection error: {0}")]
    Connection(String),
}

/// Query execution capability shared by metadata lookups and data queries
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Column names of a table, in definition order
    async fn table_columns(&self, table: &TableRef) -> Result<Vec<String>, WarehouseError>;

    /// Execute SQL verbatim and materialize every row
    async fn query(&self, sql: &str) -> Result<QueryResultSet, WarehouseError>;

    /// Render a table reference the way this warehouse's SQL dialect expects it
    fn render_table(&self, table: &TableRef) -> String {
        format!("`{}`", table.path())
    }
}

/// Mock warehouse for testing
///
/// Answers `table_columns` from registered tables and `query` from results
/// registered per exact SQL text. Every executed statement is recorded.
#[derive(Default)]
pub struct MockWarehouse {
    tables: HashMap<String, Vec<String>>,
    results: HashMap<String, Result<QueryResultSet, String>>,
    executed: Mutex<Vec<String>>,
}

impl MockWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_table(&mut self, table: &TableRef, columns: &[&str]) {
        self.tables
            .insert(table.path(), columns.iter().map(|c| c.to_string()).collect());
    }

    pub fn add_result(&mut self, sql: impl Into<String>, rows: QueryResultSet) {
        self.results.insert(sql.into(), Ok(rows));
    }

    pub fn add_failure(&mut self, sql: impl Into<String>, message: impl Into<String>) {
        self.results.insert(sql.into(), Err(message.into()));
    }

    /// Statements passed to `query`, in call order
    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Warehouse for MockWarehouse {
    async fn table_columns(&self, table: &TableRef) -> Result<Vec<String>, WarehouseError> {
        self.tables
            .get(&table.path())
            .cloned()
            .ok_or_else(|| WarehouseError::TableNotFound(table.path()))
    }

    async fn query(&self, sql: &str) -> Result<QueryResultSet, WarehouseError> {
        if let Ok(mut executed) = self.executed.lock() {
            executed.push(sql.to_string());
        }

        match self.results.get(sql) {
            Some(Ok(rows)) => Ok(rows.clone()),
            Some(Err(message)) => Err(WarehouseError::Query(message.clone())),
            None => Err(WarehouseError::Query(format!("no result registered for: {}", sql))),
        }
    }
}
