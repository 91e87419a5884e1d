//! Question-to-answer orchestration
//!
//! metadata -> SQL prompt -> completion -> extraction -> execution ->
//! (fixed "no data" answer | synthesized answer). Every failure after input
//! parsing is caught here, once, and turned into the answer text.

use opsql_ir::{PipelineResponse, Warehouse};
use std::sync::Arc;

use crate::answer::AnswerSynthesizer;
use crate::completion::ResilientCompletion;
use crate::config::Config;
use crate::error::PipelineError;
use crate::extract::SqlExtractor;
use crate::metadata::MetadataProvider;
use crate::metrics::Metrics;
use crate::prompt::PromptBuilder;
use crate::query::QueryRunner;

/// Answer used when the query returns zero rows
pub const NO_DATA_ANSWER: &str = "Data tidak ditemukan.";

/// Question used when the request carries none
pub const FALLBACK_QUESTION: &str = "Tampilkan semua data";

pub struct QuestionPipeline {
    metadata: MetadataProvider,
    prompts: PromptBuilder,
    completion: Arc<ResilientCompletion>,
    extractor: SqlExtractor,
    runner: QueryRunner,
    synthesizer: AnswerSynthesizer,
    metrics: Option<Arc<Metrics>>,
}

impl QuestionPipeline {
    pub fn new(
        config: &Config,
        warehouse: Arc<dyn Warehouse>,
        completion: Arc<ResilientCompletion>,
    ) -> Self {
        let source_table = warehouse.render_table(&config.warehouse.fact_table_ref());

        Self {
            metadata: MetadataProvider::new(
                warehouse.clone(),
                config.warehouse.fact_table_ref(),
                config.warehouse.definitions_table_ref(),
                config.warehouse.aliases_table_ref(),
            ),
            prompts: PromptBuilder::new(source_table.clone()),
            completion: completion.clone(),
            extractor: SqlExtractor::new(
                source_table,
                config.extraction.fallback_companies.clone(),
            ),
            runner: QueryRunner::new(warehouse),
            synthesizer: AnswerSynthesizer::new(completion),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.extractor = self.extractor.with_metrics(metrics.clone());
        self.metrics = Some(metrics);
        self
    }

    /// Always produces a response; failures become the answer text
    pub async fn answer(&self, question: &str) -> PipelineResponse {
        let mut sql = String::new();

        let answer = match self.run(question, &mut sql).await {
            Ok(answer) => answer,
            Err(err) => {
                tracing::error!(kind = err.kind(), sql = %sql, "Pipeline failed: {}", err);
                if let Some(metrics) = &self.metrics {
                    metrics.pipeline_failures.with_label_values(&[err.kind()]).inc();
                }
                failure_answer(&err)
            }
        };

        PipelineResponse {
            answer,
            question: question.to_string(),
            sql,
        }
    }

    async fn run(&self, question: &str, sql: &mut String) -> Result<String, PipelineError> {
        *sql = self.generate_sql(question).await?;
        tracing::info!("Generated SQL:\n{}", sql);

        let rows = self.runner.run(sql).await?;
        if rows.is_empty() {
            if let Some(metrics) = &self.metrics {
                metrics.empty_results.inc();
            }
            return Ok(NO_DATA_ANSWER.to_string());
        }

        self.synthesizer.synthesize(question, &rows).await
    }

    /// Metadata, prompt, completion and extraction; no execution
    pub async fn generate_sql(&self, question: &str) -> Result<String, PipelineError> {
        let context = self.metadata.context().await?;
        let prompt = self.prompts.build_sql_prompt(question, &context);
        let raw = self.completion.complete(&prompt).await?;

        Ok(self.extractor.extract(&raw, question, &context.aliases))
    }
}

/// The one place that decides what a failure looks like to the user
pub fn failure_answer(err: &PipelineError) -> String {
    match err {
        PipelineError::RetryExhausted { .. } => {
            format!("Terjadi error: {}. Silakan coba lagi beberapa saat lagi.", err)
        }
        PipelineError::ModelFailure(_)
        | PipelineError::MetadataUnavailable(_)
        | PipelineError::ExecutionError(_)
        | PipelineError::InputMalformed(_) => format!("Terjadi error: {}", err),
    }
}
