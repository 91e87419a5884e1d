//! Execution of the finalized SQL against the warehouse

use opsql_ir::{QueryResultSet, Warehouse};
use std::sync::Arc;

use crate::error::PipelineError;

/// Runs statements verbatim. No retry: a broken statement stays broken.
pub struct QueryRunner {
    warehouse: Arc<dyn Warehouse>,
}

impl QueryRunner {
    pub fn new(warehouse: Arc<dyn Warehouse>) -> Self {
        Self { warehouse }
    }

    pub async fn run(&self, sql: &str) -> Result<QueryResultSet, PipelineError> {
        let rows = self
            .warehouse
            .query(sql)
            .await
            .map_err(|e| PipelineError::ExecutionError(e.to_string()))?;

        tracing::info!(rows = rows.len(), "Query executed");
        Ok(rows)
    }
}
