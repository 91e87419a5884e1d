//! OPSQL webhook server
//!
//! Answers natural-language questions about daily mining operations:
//! the question is grounded in warehouse metadata, turned into SQL by a
//! generative model, executed, and the rows are phrased back as prose.

pub mod answer;
pub mod completion;
pub mod config;
pub mod error;
pub mod extract;
pub mod llm;
pub mod logging;
pub mod metadata;
pub mod metrics;
pub mod pipeline;
pub mod prompt;
pub mod query;
pub mod webhook;

pub use completion::ResilientCompletion;
pub use config::Config;
pub use error::PipelineError;
pub use llm::{GenerativeModel, ModelError, OpenAiModel};
pub use pipeline::QuestionPipeline;
