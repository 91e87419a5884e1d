//! Failure kinds that can end a pipeline run

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// The model kept rate limiting until the attempt ceiling was reached
    #[error("model gave no response after {attempts} attempts (last error: {last_error})")]
    RetryExhausted { attempts: u32, last_error: String },

    /// Non-transient model failure (auth, malformed request, quota)
    #[error("model request failed: {0}")]
    ModelFailure(String),

    #[error("metadata unavailable: {0}")]
    MetadataUnavailable(String),

    #[error("query execution failed: {0}")]
    ExecutionError(String),

    #[error("malformed input: {0}")]
    InputMalformed(String),
}

impl PipelineError {
    /// Stable label used for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::RetryExhausted { .. } => "retry_exhausted",
            PipelineError::ModelFailure(_) => "model_failure",
            PipelineError::MetadataUnavailable(_) => "metadata_unavailable",
            PipelineError::ExecutionError(_) => "execution_error",
            PipelineError::InputMalformed(_) => "input_malformed",
        }
    }
}
