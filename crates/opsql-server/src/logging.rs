//! Structured logging for OPSQL server
//!
//! - Human-readable console logging for development
//! - Structured JSON logging for production
//! - Daily rotated log files
//!
//! Every webhook request is wrapped in a span carrying its request id, so
//! the SQL generation, retries and failures of one question can be grepped
//! together.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};
use tracing_appender::rolling::{RollingFileAppender, Rotation};

use crate::config::LoggingConfig;

const LOG_FILE_PREFIX: &str = "opsql-server.log";

/// Third-party targets that are too chatty at debug level
const QUIET_TARGETS: &[&str] = &["hyper=warn", "tokio=warn", "runtime=warn", "tower=warn", "h2=warn", "reqwest=warn"];

/// Log format configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable format for development
    Pretty,
    /// JSON format for production (structured logging)
    Json,
    /// Compact format for testing
    Compact,
}

impl LogFormat {
    /// Unknown values fall back to pretty
    pub fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "json" => LogFormat::Json,
            "compact" => LogFormat::Compact,
            _ => LogFormat::Pretty,
        }
    }
}

/// Log output configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOutput {
    /// Log to stdout only
    Stdout,
    /// Log to file only
    File,
    /// Log to both stdout and file
    Both,
}

impl LogOutput {
    /// Unknown values fall back to stdout
    pub fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "file" => LogOutput::File,
            "both" => LogOutput::Both,
            _ => LogOutput::Stdout,
        }
    }
}

fn env_filter(level: &str) -> EnvFilter {
    let mut filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    for directive in QUIET_TARGETS {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }
    filter
}

fn file_appender(directory: &str) -> RollingFileAppender {
    std::fs::create_dir_all(directory).ok();
    RollingFileAppender::new(Rotation::DAILY, directory, LOG_FILE_PREFIX)
}

/// Initialize the global subscriber from the logging section of the config
///
/// ```bash
/// # Production: JSON to file with info level
/// RUST_LOG=info LOG_FORMAT=json LOG_OUTPUT=file LOG_DIR=/var/log/opsql opsql-server
///
/// # Debugging prompt construction
/// RUST_LOG=opsql_server=debug LOG_FORMAT=compact opsql-server
/// ```
pub fn init(config: &LoggingConfig) {
    let format = LogFormat::parse(&config.format);
    let output = LogOutput::parse(&config.output);
    let filter = env_filter(&config.level);

    let console_layer = match format {
        LogFormat::Pretty => fmt::layer()
            .pretty()
            .with_thread_ids(true)
            .with_target(true)
            .boxed(),
        LogFormat::Json => fmt::layer().json().with_current_span(true).boxed(),
        LogFormat::Compact => fmt::layer().compact().boxed(),
    };

    match output {
        LogOutput::Stdout => {
            tracing_subscriber::registry()
                .with(filter)
                .with(console_layer)
                .init();
        }
        LogOutput::File => {
            let file_layer = fmt::layer()
                .with_writer(file_appender(&config.directory))
                .with_ansi(false);

            tracing_subscriber::registry()
                .with(filter)
                .with(file_layer)
                .init();
        }
        LogOutput::Both => {
            let file_layer = fmt::layer()
                .with_writer(file_appender(&config.directory))
                .with_ansi(false)
                .boxed();

            tracing_subscriber::registry()
                .with(filter)
                .with(console_layer)
                .with(file_layer)
                .init();
        }
    }

    tracing::info!(
        format = ?format,
        output = ?output,
        level = %config.level,
        "Logging system initialized"
    );
    if matches!(output, LogOutput::File | LogOutput::Both) {
        tracing::debug!(directory = %config.directory, "Writing log files");
    }
}
