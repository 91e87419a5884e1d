//! Phrasing query results as a user-facing answer

use opsql_ir::Row;
use std::sync::Arc;

use crate::completion::ResilientCompletion;
use crate::error::PipelineError;
use crate::prompt::build_answer_prompt;

pub struct AnswerSynthesizer {
    completion: Arc<ResilientCompletion>,
}

impl AnswerSynthesizer {
    pub fn new(completion: Arc<ResilientCompletion>) -> Self {
        Self { completion }
    }

    /// Callers handle the empty case themselves; rows are expected non-empty
    pub async fn synthesize(&self, question: &str, rows: &[Row]) -> Result<String, PipelineError> {
        let prompt = build_answer_prompt(question, rows);
        let answer = self.completion.complete(&prompt).await?;
        Ok(answer.trim().to_string())
    }
}
