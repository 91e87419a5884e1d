//! Prometheus counters for the pipeline

use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

pub struct Metrics {
    registry: Registry,
    pub requests: IntCounter,
    pub completion_retries: IntCounter,
    pub sql_rewrites: IntCounter,
    pub empty_results: IntCounter,
    pub pipeline_failures: IntCounterVec,
}

impl Metrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let requests = IntCounter::new("opsql_requests_total", "Webhook requests received")?;
        let completion_retries = IntCounter::new(
            "opsql_completion_retries_total",
            "Model completions retried after rate limiting",
        )?;
        let sql_rewrites = IntCounter::new(
            "opsql_sql_rewrites_total",
            "Broad SELECT * statements rewritten into aggregates",
        )?;
        let empty_results = IntCounter::new(
            "opsql_empty_results_total",
            "Questions whose query returned no rows",
        )?;
        let pipeline_failures = IntCounterVec::new(
            Opts::new("opsql_pipeline_failures_total", "Pipeline runs that ended in an error"),
            &["kind"],
        )?;

        registry.register(Box::new(requests.clone()))?;
        registry.register(Box::new(completion_retries.clone()))?;
        registry.register(Box::new(sql_rewrites.clone()))?;
        registry.register(Box::new(empty_results.clone()))?;
        registry.register(Box::new(pipeline_failures.clone()))?;

        Ok(Self {
            registry,
            requests,
            completion_retries,
            sql_rewrites,
            empty_results,
            pipeline_failures,
        })
    }

    /// Text exposition format for `GET /metrics`
    pub fn render(&self) -> String {
        let mut buffer = Vec::new();
        if let Err(e) = TextEncoder::new().encode(&self.registry.gather(), &mut buffer) {
            tracing::error!("Failed to encode metrics: {}", e);
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}
