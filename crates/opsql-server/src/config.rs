//! Configuration system for OPSQL server
//!
//! Loads configuration from:
//! 1. config.yaml - operational settings (port, tables, model, logging)
//! 2. .env file - secrets (API keys)
//!
//! Environment variables always override config.yaml values. A missing
//! config.yaml is not an error; every field has a default.

use opsql_ir::TableRef;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// Warehouse location and the three tables the pipeline reads
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WarehouseConfig {
    /// Dataset identifier, possibly dotted (`catalog.schema`)
    pub dataset: String,
    pub fact_table: String,
    pub definitions_table: String,
    pub aliases_table: String,

    /// DuckDB database file; in-memory when unset
    pub database_path: Option<String>,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            dataset: "ops".to_string(),
            fact_table: "dm_daily_operation".to_string(),
            definitions_table: "dm_definitions".to_string(),
            aliases_table: "dm_value_aliasses".to_string(),
            database_path: Some("data/operations.duckdb".to_string()),
        }
    }
}

impl WarehouseConfig {
    pub fn fact_table_ref(&self) -> TableRef {
        TableRef::new(&self.dataset, &self.fact_table)
    }

    pub fn definitions_table_ref(&self) -> TableRef {
        TableRef::new(&self.dataset, &self.definitions_table)
    }

    pub fn aliases_table_ref(&self) -> TableRef {
        TableRef::new(&self.dataset, &self.aliases_table)
    }
}

/// Generative model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub project_id: String,
    pub location: String,

    /// Model identifier sent with every completion request
    pub name: String,

    /// OpenAI-compatible base URL; derived from project and location when unset
    pub api_base: Option<String>,

    /// Attempts per completion before giving up on rate limiting
    pub max_attempts: u32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            project_id: "bumi-poc".to_string(),
            location: "us-central1".to_string(),
            name: "google/gemini-2.0-flash-001".to_string(),
            api_base: None,
            max_attempts: 5,
        }
    }
}

impl ModelConfig {
    /// Base URL of the chat-completions API
    pub fn endpoint(&self) -> String {
        match &self.api_base {
            Some(base) => base.trim_end_matches('/').to_string(),
            None => format!(
                "https://{location}-aiplatform.googleapis.com/v1/projects/{project}/locations/{location}/endpoints/openapi",
                location = self.location,
                project = self.project_id,
            ),
        }
    }
}

/// Heuristics applied to generated SQL
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Company names matched against the question when no alias matches
    pub fallback_companies: Vec<String>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            fallback_companies: vec![
                "KALTIM PRIMA COAL".to_string(),
                "ARUTMIN INDONESIA".to_string(),
            ],
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error) or module-specific
    pub level: String,

    /// Output format: pretty, json, compact
    pub format: String,

    /// Output destination: stdout, file, both
    pub output: String,

    /// Directory for log files
    pub directory: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            output: "stdout".to_string(),
            directory: "./logs".to_string(),
        }
    }
}

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub warehouse: WarehouseConfig,
    pub model: ModelConfig,
    pub extraction: ExtractionConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from YAML file with environment variable overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = serde_yaml::from_str(&contents)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Like [`Config::load`], but a missing file yields the defaults
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            return Self::load(path);
        }

        let mut config = Config::default();
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("OPSQL_SERVER_HOST") {
            self.server.host = host;
        }
        // PORT is set by container platforms; the explicit variable wins
        for var in ["PORT", "OPSQL_SERVER_PORT"] {
            if let Ok(port) = std::env::var(var) {
                if let Ok(port_num) = port.parse() {
                    self.server.port = port_num;
                }
            }
        }

        if let Ok(dataset) = std::env::var("OPSQL_DATASET") {
            self.warehouse.dataset = dataset;
        }
        if let Ok(path) = std::env::var("OPSQL_DATABASE_PATH") {
            self.warehouse.database_path = Some(path);
        }

        if let Ok(project) = std::env::var("OPSQL_PROJECT_ID") {
            self.model.project_id = project;
        }
        if let Ok(location) = std::env::var("OPSQL_LOCATION") {
            self.model.location = location;
        }
        if let Ok(model) = std::env::var("OPSQL_MODEL") {
            self.model.name = model;
        }
        if let Ok(base) = std::env::var("OPSQL_LLM_API_BASE") {
            self.model.api_base = Some(base);
        }

        if let Ok(level) = std::env::var("RUST_LOG") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("LOG_FORMAT") {
            self.logging.format = format;
        }
        if let Ok(output) = std::env::var("LOG_OUTPUT") {
            self.logging.output = output;
        }
        if let Ok(dir) = std::env::var("LOG_DIR") {
            self.logging.directory = dir;
        }
    }

    /// API key for the model endpoint (must be in .env)
    pub fn llm_api_key() -> Result<String, ConfigError> {
        std::env::var("LLM_API_KEY")
            .or_else(|_| std::env::var("OPENAI_API_KEY"))
            .map_err(|_| ConfigError::MissingEnvVar("LLM_API_KEY".to_string()))
    }
}
