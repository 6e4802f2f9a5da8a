//! Logging setup for hosts embedding the table cache
//!
//! The cache only emits `tracing` events. Hosts that do not install their own
//! subscriber can call [`init`] with a [`LoggingConfig`] preset: pretty
//! console output by default, daily-rotated JSON files in production.

use std::path::PathBuf;
use tracing_subscriber::{
    EnvFilter, Layer, Registry,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

const LOG_FILE_PREFIX: &str = "dbgrid.log";

/// Where and how `init` writes log output
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Directory for the rolling JSON files
    pub log_dir: PathBuf,
    pub enable_json_logs: bool,
    pub enable_console_logs: bool,
    /// Attach source file and line to each event
    pub include_location: bool,
    /// Emit span open/close events, which time edits and resyncs
    pub enable_spans: bool,
    /// `EnvFilter` directives used when `RUST_LOG` is unset
    pub default_filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: log_directory(),
            enable_json_logs: true,
            enable_console_logs: true,
            include_location: cfg!(debug_assertions),
            enable_spans: cfg!(debug_assertions),
            default_filter: "info,dbgrid_core=debug,dbgrid_table=debug,dbgrid_services=debug"
                .to_string(),
        }
    }
}

impl LoggingConfig {
    /// JSON files only, info and above from the cache
    pub fn production() -> Self {
        Self {
            log_dir: log_directory(),
            enable_json_logs: true,
            enable_console_logs: false,
            include_location: false,
            enable_spans: false,
            default_filter: "warn,dbgrid_core=info,dbgrid_table=info,dbgrid_services=info"
                .to_string(),
        }
    }

    /// Console only, no files
    pub fn testing() -> Self {
        Self {
            log_dir: std::env::temp_dir().join("dbgrid-tests"),
            enable_json_logs: false,
            enable_console_logs: true,
            include_location: true,
            enable_spans: true,
            default_filter: "debug".to_string(),
        }
    }
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Install a global subscriber built from `config`. `RUST_LOG` overrides
/// the preset filter.
///
/// Fails if a global subscriber is already set.
pub fn init(config: LoggingConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_filter));

    let mut layers: Vec<BoxedLayer> = Vec::new();
    if config.enable_console_logs {
        layers.push(console_layer(&config, filter.clone()));
    }
    if config.enable_json_logs {
        std::fs::create_dir_all(&config.log_dir)?;
        layers.push(json_file_layer(&config, filter));
    }

    tracing_subscriber::registry().with(layers).try_init()?;

    tracing::info!(
        log_dir = %config.log_dir.display(),
        json = config.enable_json_logs,
        console = config.enable_console_logs,
        "Logging initialized"
    );
    Ok(())
}

/// NEW fires once per span; ENTER would fire on every poll of an awaited
/// store call
fn span_events(config: &LoggingConfig) -> FmtSpan {
    if config.enable_spans {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    }
}

fn console_layer(config: &LoggingConfig, filter: EnvFilter) -> BoxedLayer {
    fmt::layer()
        .with_target(true)
        .with_file(config.include_location)
        .with_line_number(config.include_location)
        .with_span_events(span_events(config))
        .pretty()
        .with_filter(filter)
        .boxed()
}

fn json_file_layer(config: &LoggingConfig, filter: EnvFilter) -> BoxedLayer {
    let appender = tracing_appender::rolling::daily(&config.log_dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    // Dropping the guard stops the writer; it lives as long as the process
    std::mem::forget(guard);

    fmt::layer()
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(span_events(config))
        .with_ansi(false)
        .json()
        .with_current_span(true)
        .with_writer(writer)
        .with_filter(filter)
        .boxed()
}

/// Default directory for JSON log files
pub fn log_directory() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("dbgrid")
        .join("logs")
}
