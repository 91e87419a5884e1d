//! OPSQL webhook server binary

use opsql_duck::DuckWarehouse;
use opsql_ir::Warehouse;
use opsql_server::{
    logging, metrics::Metrics, webhook, Config, OpenAiModel, QuestionPipeline,
    ResilientCompletion,
};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config_path = std::env::var("OPSQL_CONFIG").unwrap_or_else(|_| "config.yaml".to_string());
    let config = Config::load_or_default(&config_path)?;
    logging::init(&config.logging);

    let warehouse = match &config.warehouse.database_path {
        Some(path) => {
            if let Some(parent) = std::path::Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            info!("Opening DuckDB warehouse at {}", path);
            DuckWarehouse::open(path)?
        }
        None => {
            info!("No database_path configured, using in-memory DuckDB");
            DuckWarehouse::in_memory()?
        }
    };
    let warehouse: Arc<dyn Warehouse> = Arc::new(warehouse);

    let api_key = Config::llm_api_key()?;
    info!("Using model {} at {}", config.model.name, config.model.endpoint());

    let metrics = Arc::new(Metrics::new()?);
    let model = Arc::new(OpenAiModel::new(&config.model, api_key));
    let completion = ResilientCompletion::new(model)
        .with_max_attempts(config.model.max_attempts)
        .with_metrics(metrics.clone());

    let pipeline =
        QuestionPipeline::new(&config, warehouse, Arc::new(completion)).with_metrics(metrics.clone());

    let state = webhook::AppState {
        pipeline: Arc::new(pipeline),
        metrics,
    };

    let addr = format!("{}:{}", config.server.host, config.server.port);
    webhook::serve(&addr, state).await
}
