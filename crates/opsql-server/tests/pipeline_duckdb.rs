//! End-to-end pipeline runs against an in-memory DuckDB warehouse

use async_trait::async_trait;
use opsql_duck::DuckWarehouse;
use opsql_server::pipeline::NO_DATA_ANSWER;
use opsql_server::{Config, GenerativeModel, ModelError, QuestionPipeline, ResilientCompletion};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Replays canned completions and records every prompt it sees
struct CannedModel {
    replies: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<String>>,
}

impl CannedModel {
    fn new(replies: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerativeModel for CannedModel {
    async fn generate(&self, prompt: &str) -> Result<String, ModelError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ModelError::Failed("no canned reply left".to_string()))
    }
}

fn warehouse() -> Arc<DuckWarehouse> {
    let warehouse = DuckWarehouse::in_memory().unwrap();
    warehouse
        .execute_batch(
            "CREATE SCHEMA ops;
             CREATE TABLE ops.dm_daily_operation (
                 date DATE,
                 company VARCHAR,
                 qty_actual DOUBLE,
                 qty_budget DOUBLE
             );
             INSERT INTO ops.dm_daily_operation VALUES
                 ('2024-01-01', 'KALTIM PRIMA COAL', 120.5, 100.0),
                 ('2024-01-01', 'ARUTMIN INDONESIA', 80.0, 90.0),
                 ('2024-01-02', 'KALTIM PRIMA COAL', 110.0, 100.0);

             CREATE TABLE ops.dm_definitions (
                 column_name VARCHAR,
                 definition VARCHAR,
                 example_value VARCHAR
             );
             INSERT INTO ops.dm_definitions VALUES
                 ('qty_actual', 'Realized production in tonnes', '120.5'),
                 ('qty_budget', 'Planned production in tonnes', NULL);

             CREATE TABLE ops.dm_value_aliasses (
                 column_name VARCHAR,
                 alias_value VARCHAR,
                 canonical_value VARCHAR
             );
             INSERT INTO ops.dm_value_aliasses VALUES
                 ('company', 'KPC', 'KALTIM PRIMA COAL');",
        )
        .unwrap();
    Arc::new(warehouse)
}

fn pipeline(model: Arc<CannedModel>) -> QuestionPipeline {
    let completion = ResilientCompletion::new(model);
    QuestionPipeline::new(&Config::default(), warehouse(), Arc::new(completion))
}

#[tokio::test]
async fn test_total_question_is_rewritten_and_answered() {
    let model = CannedModel::new(&[
        "```sql\nSELECT * FROM \"ops\".\"dm_daily_operation\"\n```",
        "Total produksi KPC adalah 230,5 ton.",
    ]);

    let response = pipeline(model.clone()).answer("Berapa total produksi KPC?").await;

    assert_eq!(
        response.sql,
        "SELECT SUM(qty_actual) as total_qty_actual FROM \"ops\".\"dm_daily_operation\" WHERE company LIKE '%KALTIM PRIMA COAL%'"
    );
    assert_eq!(response.answer, "Total produksi KPC adalah 230,5 ton.");

    let prompts = model.prompts();
    assert_eq!(prompts.len(), 2);
    assert!(prompts[0].contains("Source table: \"ops\".\"dm_daily_operation\""));
    assert!(prompts[0].contains("date, company, qty_actual, qty_budget"));
    assert!(prompts[0].contains("- qty_budget: Planned production in tonnes (example: )"));
    assert!(prompts[1].contains(r#"{"total_qty_actual":230.5}"#));
}

#[tokio::test]
async fn test_no_rows_gives_fixed_answer() {
    let model = CannedModel::new(&[
        "SELECT * FROM \"ops\".\"dm_daily_operation\" WHERE company = 'NOBODY'",
    ]);

    let response = pipeline(model.clone()).answer("tampilkan data NOBODY").await;

    assert_eq!(response.answer, NO_DATA_ANSWER);
    assert_eq!(model.prompts().len(), 1);
}

#[tokio::test]
async fn test_bad_sql_is_reported_in_answer() {
    let model = CannedModel::new(&["SELECT no_such_column FROM \"ops\".\"dm_daily_operation\""]);

    let response = pipeline(model).answer("apa saja?").await;

    assert!(response.answer.starts_with("Terjadi error: query execution failed"));
    assert!(response.answer.contains("no_such_column"));
    assert_eq!(
        response.sql,
        "SELECT no_such_column FROM \"ops\".\"dm_daily_operation\""
    );
    assert_eq!(response.question, "apa saja?");
}
