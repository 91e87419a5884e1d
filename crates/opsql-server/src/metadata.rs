//! Schema, column definitions and value aliases from the warehouse

use opsql_ir::{
    default_glossary, ColumnDefinition, PromptContext, Row, SchemaSnapshot, TableRef, ValueAlias,
    Warehouse, WarehouseError,
};
use std::sync::Arc;

use crate::error::PipelineError;

/// Read-only view of the metadata tables; every call hits the warehouse
pub struct MetadataProvider {
    warehouse: Arc<dyn Warehouse>,
    fact_table: TableRef,
    definitions_table: TableRef,
    aliases_table: TableRef,
}

impl MetadataProvider {
    pub fn new(
        warehouse: Arc<dyn Warehouse>,
        fact_table: TableRef,
        definitions_table: TableRef,
        aliases_table: TableRef,
    ) -> Self {
        Self {
            warehouse,
            fact_table,
            definitions_table,
            aliases_table,
        }
    }

    pub async fn schema(&self) -> Result<SchemaSnapshot, PipelineError> {
        let columns = self
            .warehouse
            .table_columns(&self.fact_table)
            .await
            .map_err(unavailable)?;
        Ok(SchemaSnapshot::new(columns))
    }

    pub async fn definitions(&self) -> Result<Vec<ColumnDefinition>, PipelineError> {
        let sql = format!(
            "SELECT column_name, definition, example_value FROM {}",
            self.warehouse.render_table(&self.definitions_table)
        );
        let rows = self.warehouse.query(&sql).await.map_err(unavailable)?;

        rows.iter()
            .map(|row| {
                Ok(ColumnDefinition {
                    column_name: text_field(row, "column_name")?,
                    definition: text_field(row, "definition")?,
                    example_value: text_field(row, "example_value")?,
                })
            })
            .collect()
    }

    pub async fn aliases(&self) -> Result<Vec<ValueAlias>, PipelineError> {
        let sql = format!(
            "SELECT column_name, alias_value, canonical_value FROM {}",
            self.warehouse.render_table(&self.aliases_table)
        );
        let rows = self.warehouse.query(&sql).await.map_err(unavailable)?;

        rows.iter()
            .map(|row| {
                Ok(ValueAlias {
                    column_name: text_field(row, "column_name")?,
                    alias_value: text_field(row, "alias_value")?,
                    canonical_value: text_field(row, "canonical_value")?,
                })
            })
            .collect()
    }

    /// Fetch everything the SQL prompt needs
    pub async fn context(&self) -> Result<PromptContext, PipelineError> {
        let schema = self.schema().await?;
        let definitions = self.definitions().await?;
        let aliases = self.aliases().await?;

        tracing::debug!(
            columns = schema.columns.len(),
            definitions = definitions.len(),
            aliases = aliases.len(),
            "Loaded prompt metadata"
        );

        Ok(PromptContext {
            schema,
            definitions,
            aliases,
            glossary: default_glossary(),
        })
    }
}

fn unavailable(err: WarehouseError) -> PipelineError {
    PipelineError::MetadataUnavailable(err.to_string())
}

/// Read a column as text; NULL becomes empty, numbers are stringified
fn text_field(row: &Row, column: &str) -> Result<String, PipelineError> {
    match row.get(column) {
        Some(serde_json::Value::String(s)) => Ok(s.clone()),
        Some(serde_json::Value::Null) => Ok(String::new()),
        Some(other) => Ok(other.to_string()),
        None => Err(PipelineError::MetadataUnavailable(format!(
            "metadata row is missing column '{}'",
            column
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opsql_ir::MockWarehouse;
    use serde_json::json;

    fn row(pairs: &[(&str, serde_json::Value)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn provider(warehouse: MockWarehouse) -> MetadataProvider {
        MetadataProvider::new(
            Arc::new(warehouse),
            TableRef::new("ops", "dm_daily_operation"),
            TableRef::new("ops", "dm_definitions"),
            TableRef::new("ops", "dm_value_aliasses"),
        )
    }

    #[tokio::test]
    async fn test_context_from_metadata_tables() {
        let mut warehouse = MockWarehouse::new();
        warehouse.add_table(
            &TableRef::new("ops", "dm_daily_operation"),
            &["date", "company", "qty_actual"],
        );
        warehouse.add_result(
            "SELECT column_name, definition, example_value FROM `ops.dm_definitions`",
            vec![row(&[
                ("column_name", json!("qty_actual")),
                ("definition", json!("Realized production in tonnes")),
                ("example_value", json!(1250.5)),
            ])],
        );
        warehouse.add_result(
            "SELECT column_name, alias_value, canonical_value FROM `ops.dm_value_aliasses`",
            vec![row(&[
                ("column_name", json!("company")),
                ("alias_value", json!("KPC")),
                ("canonical_value", json!("KALTIM PRIMA COAL")),
            ])],
        );

        let context = provider(warehouse).context().await.unwrap();

        assert_eq!(context.schema.columns, vec!["date", "company", "qty_actual"]);
        assert_eq!(context.definitions[0].example_value, "1250.5");
        assert_eq!(context.aliases[0].canonical_value, "KALTIM PRIMA COAL");
        assert!(!context.glossary.is_empty());
    }

    #[tokio::test]
    async fn test_missing_fact_table_is_metadata_unavailable() {
        let err = provider(MockWarehouse::new()).schema().await.unwrap_err();
        assert!(matches!(err, PipelineError::MetadataUnavailable(ref m) if m.contains("dm_daily_operation")));
    }

    #[tokio::test]
    async fn test_malformed_definition_row_is_rejected() {
        let mut warehouse = MockWarehouse::new();
        warehouse.add_result(
            "SELECT column_name, definition, example_value FROM `ops.dm_definitions`",
            vec![row(&[("column_name", json!("qty_actual"))])],
        );

        let err = provider(warehouse).definitions().await.unwrap_err();
        assert!(matches!(err, PipelineError::MetadataUnavailable(ref m) if m.contains("definition")));
    }

    #[tokio::test]
    async fn test_null_example_becomes_empty() {
        let mut warehouse = MockWarehouse::new();
        warehouse.add_result(
            "SELECT column_name, definition, example_value FROM `ops.dm_definitions`",
            vec![row(&[
                ("column_name", json!("remark")),
                ("definition", json!("Free text note")),
                ("example_value", json!(null)),
            ])],
        );

        let definitions = provider(warehouse).definitions().await.unwrap();
        assert_eq!(definitions[0].example_value, "");
    }
}
