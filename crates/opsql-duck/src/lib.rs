//! DuckDB-backed warehouse
//!
//! Resolves table columns through `information_schema` and executes SQL,
//! converting every row into a JSON map keyed by column name.

use async_trait::async_trait;
use duckdb::types::{TimeUnit, ValueRef};
use duckdb::Connection;
use opsql_ir::{QueryResultSet, Row, TableRef, Warehouse, WarehouseError};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

pub struct DuckWarehouse {
    conn: Mutex<Connection>,
}

impl DuckWarehouse {
    /// Open (or create) a database file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, WarehouseError> {
        let conn = Connection::open(path).map_err(connection_error)?;
        Ok(Self::from_connection(conn))
    }

    pub fn in_memory() -> Result<Self, WarehouseError> {
        let conn = Connection::open_in_memory().map_err(connection_error)?;
        Ok(Self::from_connection(conn))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Run setup statements (DDL, seed data)
    pub fn execute_batch(&self, sql: &str) -> Result<(), WarehouseError> {
        self.lock()?
            .execute_batch(sql)
            .map_err(|e| WarehouseError::Query(e.to_string()))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, WarehouseError> {
        self.conn
            .lock()
            .map_err(|_| WarehouseError::Connection("DuckDB connection lock poisoned".to_string()))
    }

    fn columns_of(conn: &Connection, table: &TableRef) -> duckdb::Result<Vec<String>> {
        let mut segments: Vec<&str> = table.dataset.split('.').collect();
        let schema = segments.pop().unwrap_or("main");

        let mut names = Vec::new();
        match segments.pop() {
            Some(catalog) => {
                let mut stmt = conn.prepare(
                    "SELECT column_name FROM information_schema.columns \
                     WHERE table_catalog = ? AND table_schema = ? AND table_name = ? \
                     ORDER BY ordinal_position",
                )?;
                let mut rows = stmt.query([catalog, schema, table.table.as_str()])?;
                while let Some(row) = rows.next()? {
                    names.push(row.get::<_, String>(0)?);
                }
            }
            None => {
                let mut stmt = conn.prepare(
                    "SELECT column_name FROM information_schema.columns \
                     WHERE table_schema = ? AND table_name = ? \
                     ORDER BY ordinal_position",
                )?;
                let mut rows = stmt.query([schema, table.table.as_str()])?;
                while let Some(row) = rows.next()? {
                    names.push(row.get::<_, String>(0)?);
                }
            }
        }

        Ok(names)
    }

    fn run(conn: &Connection, sql: &str) -> duckdb::Result<QueryResultSet> {
        let mut stmt = conn.prepare(sql)?;
        let mut rows = stmt.query([])?;

        let mut columns: Vec<String> = Vec::new();
        let mut result = Vec::new();

        while let Some(row) = rows.next()? {
            // Column names are only available once the statement has executed
            if columns.is_empty() {
                let stmt = row.as_ref();
                for i in 0..stmt.column_count() {
                    columns.push(stmt.column_name(i)?.to_string());
                }
            }

            let mut row_map = Row::new();
            for (i, name) in columns.iter().enumerate() {
                row_map.insert(name.clone(), value_to_json(row.get_ref(i)?));
            }
            result.push(row_map);
        }

        Ok(result)
    }
}

#[async_trait]
impl Warehouse for DuckWarehouse {
    async fn table_columns(&self, table: &TableRef) -> Result<Vec<String>, WarehouseError> {
        let conn = self.lock()?;
        let columns =
            Self::columns_of(&conn, table).map_err(|e| WarehouseError::Query(e.to_string()))?;

        if columns.is_empty() {
            return Err(WarehouseError::TableNotFound(table.path()));
        }

        tracing::debug!(table = %table, columns = columns.len(), "Resolved table columns");
        Ok(columns)
    }

    async fn query(&self, sql: &str) -> Result<QueryResultSet, WarehouseError> {
        let conn = self.lock()?;
        let rows = Self::run(&conn, sql).map_err(|e| WarehouseError::Query(e.to_string()))?;
        tracing::debug!(rows = rows.len(), "DuckDB query finished");
        Ok(rows)
    }

    fn render_table(&self, table: &TableRef) -> String {
        table
            .dataset
            .split('.')
            .chain(std::iter::once(table.table.as_str()))
            .map(quote_identifier)
            .collect::<Vec<_>>()
            .join(".")
    }
}

fn quote_identifier(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn connection_error(e: duckdb::Error) -> WarehouseError {
    WarehouseError::Connection(e.to_string())
}

/// Convert a DuckDB value to JSON
fn value_to_json(value: ValueRef<'_>) -> serde_json::Value {
    use serde_json::{json, Value};

    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Boolean(b) => Value::Bool(b),
        ValueRef::TinyInt(i) => json!(i),
        ValueRef::SmallInt(i) => json!(i),
        ValueRef::Int(i) => json!(i),
        ValueRef::BigInt(i) => json!(i),
        // SUM over integer columns comes back as HUGEINT
        ValueRef::HugeInt(i) => i64::try_from(i)
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(i.to_string())),
        ValueRef::UTinyInt(i) => json!(i),
        ValueRef::USmallInt(i) => json!(i),
        ValueRef::UInt(i) => json!(i),
        ValueRef::UBigInt(i) => json!(i),
        ValueRef::Float(f) => json!(f),
        ValueRef::Double(f) => json!(f),
        ValueRef::Decimal(d) => {
            let text = d.to_string();
            text.parse::<f64>()
                .map(|f| json!(f))
                .unwrap_or(Value::String(text))
        }
        ValueRef::Text(s) => Value::String(String::from_utf8_lossy(s).to_string()),
        ValueRef::Blob(b) => Value::String(format!("<blob {} bytes>", b.len())),
        ValueRef::Date32(days) => chrono::NaiveDate::from_ymd_opt(1970, 1, 1)
            .and_then(|epoch| epoch.checked_add_signed(chrono::Duration::days(days as i64)))
            .map(|date| Value::String(date.format("%Y-%m-%d").to_string()))
            .unwrap_or(Value::Null),
        ValueRef::Timestamp(unit, raw) => {
            let micros = match unit {
                TimeUnit::Second => raw.saturating_mul(1_000_000),
                TimeUnit::Millisecond => raw.saturating_mul(1_000),
                TimeUnit::Microsecond => raw,
                TimeUnit::Nanosecond => raw / 1_000,
            };
            chrono::DateTime::from_timestamp_micros(micros)
                .map(|ts| Value::String(ts.naive_utc().format("%Y-%m-%d %H:%M:%S").to_string()))
                .unwrap_or(Value::Null)
        }
        _ => Value::String("<unsupported>".to_string()),
    }
}
