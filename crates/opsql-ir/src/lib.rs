//! OPSQL shared types
//!
//! Per-request data model for the question-to-answer pipeline: schema and
//! metadata snapshots fetched from the warehouse, the prompt context built
//! from them, result rows, and the response triple handed back to the caller.
//! Nothing here outlives a single request.

use serde::{Deserialize, Serialize};

mod warehouse;
pub use warehouse::*;

/// A single result row: column name to scalar value
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Ordered rows produced by executing a query. Empty is a valid result.
pub type QueryResultSet = Vec<Row>;

/// Fully qualified reference to a warehouse table
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableRef {
    /// Dataset identifier, possibly dotted (e.g. `project.dataset`)
    pub dataset: String,
    pub table: String,
}

impl TableRef {
    pub fn new(dataset: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            dataset: dataset.into(),
            table: table.into(),
        }
    }

    /// Dotted path `dataset.table`, unquoted
    pub fn path(&self) -> String {
        format!("{}.{}", self.dataset, self.table)
    }
}

impl std::fmt::Display for TableRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.path())
    }
}

/// Business description of a fact-table column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    pub column_name: String,
    pub definition: String,
    pub example_value: String,
}

/// Colloquial value mapped to the canonical value stored in a column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueAlias {
    pub column_name: String,
    pub alias_value: String,
    pub canonical_value: String,
}

impl ValueAlias {
    /// Case-insensitive substring match of the alias against free text.
    /// An empty alias never matches.
    pub fn appears_in(&self, text: &str) -> bool {
        let alias = self.alias_value.trim().to_lowercase();
        !alias.is_empty() && text.to_lowercase().contains(&alias)
    }
}

/// Column names of the fact table, in warehouse definition order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaSnapshot {
    pub columns: Vec<String>,
}

impl SchemaSnapshot {
    pub fn new(columns: Vec<String>) -> Self {
        Self { columns }
    }
}

/// Derived metric expressed in terms of fact-table columns
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Formula {
    pub name: String,
    pub expression: String,
}

impl Formula {
    pub fn new(name: impl Into<String>, expression: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            expression: expression.into(),
        }
    }
}

/// Realization metrics every prompt is grounded with
pub fn default_glossary() -> Vec<Formula> {
    vec![
        Formula::new("tingkat_realisasi", "qty_actual / qty_budget"),
        Formula::new("persentase_realisasi", "(qty_actual / qty_budget) * 100"),
    ]
}

/// Everything the SQL prompt is grounded on, fetched fresh per request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PromptContext {
    pub schema: SchemaSnapshot,
    pub definitions: Vec<ColumnDefinition>,
    pub aliases: Vec<ValueAlias>,
    pub glossary: Vec<Formula>,
}

/// The triple returned for every webhook call, success or failure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineResponse {
    pub answer: String,
    pub question: String,
    pub sql: String,
}
