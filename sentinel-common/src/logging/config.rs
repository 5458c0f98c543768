//! Logging configuration and initialization.

use std::env;

use thiserror::Error;
use tracing_subscriber::fmt;
use tracing_subscriber::fmt::time::{ChronoLocal, ChronoUtc, FormatTime};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Error returned when the logging subscriber cannot be installed.
#[derive(Debug, Error)]
pub enum LogError {
    #[error("failed to initialize logging: {0}")]
    Init(String),
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable format (default for terminals)
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
    /// JSON format for machine parsing and log aggregation
    Json,
}

impl LogFormat {
    /// Parse format from string
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            "compact" => LogFormat::Compact,
            _ => LogFormat::Pretty,
        }
    }
}

/// Timestamp format for log entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimestampFormat {
    /// Local time with timezone (default)
    #[default]
    Local,
    /// UTC time (ISO 8601)
    Utc,
    /// No timestamps
    None,
}

impl TimestampFormat {
    /// Parse format from string
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "utc" => TimestampFormat::Utc,
            "none" | "off" => TimestampFormat::None,
            _ => TimestampFormat::Local,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Output format (pretty, compact, json)
    pub format: LogFormat,
    /// Timestamp format
    pub timestamps: TimestampFormat,
    /// Default log level filter, used when RUST_LOG is not set
    pub default_level: String,
    /// Include source file location
    pub include_location: bool,
    /// Include thread IDs
    pub include_thread_ids: bool,
    /// Include target (module path)
    pub include_target: bool,
    /// Include ANSI color codes in output
    pub ansi_enabled: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Pretty,
            timestamps: TimestampFormat::Local,
            default_level: "info".to_string(),
            include_location: true,
            include_thread_ids: false,
            include_target: true,
            ansi_enabled: true,
        }
    }
}

impl LogConfig {
    /// Create config from environment variables
    ///
    /// Reads:
    /// - `LOG_FORMAT`: pretty, compact, or json
    /// - `LOG_TIMESTAMPS`: local, utc, or none
    /// - `LOG_LEVEL`: default log level (fallback if RUST_LOG not set)
    /// - `LOG_LOCATION`: true/false for file:line info
    /// - `LOG_THREAD_IDS`: true/false for thread IDs
    pub fn from_env() -> Self {
        Self {
            format: env::var("LOG_FORMAT")
                .map(|s| LogFormat::parse(&s))
                .unwrap_or_default(),
            timestamps: env::var("LOG_TIMESTAMPS")
                .map(|s| TimestampFormat::parse(&s))
                .unwrap_or_default(),
            default_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            include_location: env::var("LOG_LOCATION")
                .map(|s| s == "true" || s == "1")
                .unwrap_or(true),
            include_thread_ids: env::var("LOG_THREAD_IDS")
                .map(|s| s == "true" || s == "1")
                .unwrap_or(false),
            include_target: true,
            ansi_enabled: env::var("NO_COLOR").is_err(),
        }
    }

    /// Create config for JSON output (log aggregation)
    pub fn json() -> Self {
        Self {
            format: LogFormat::Json,
            timestamps: TimestampFormat::Utc,
            include_thread_ids: true,
            ansi_enabled: false,
            ..Default::default()
        }
    }

    /// Create config for compact output (production consoles)
    pub fn compact() -> Self {
        Self {
            format: LogFormat::Compact,
            include_location: false,
            ..Default::default()
        }
    }

    /// Set the default log level
    pub fn with_default_level(mut self, level: impl Into<String>) -> Self {
        self.default_level = level.into();
        self
    }
}

/// Initialize logging with the given configuration
///
/// # Errors
///
/// Returns an error if the subscriber cannot be initialized (e.g., a
/// global subscriber is already set).
pub fn init_logging(config: LogConfig) -> Result<(), LogError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.default_level));

    let layer = match config.timestamps {
        TimestampFormat::Local => build_layer(
            &config,
            ChronoLocal::new("%Y-%m-%d %H:%M:%S%.3f %z".to_string()),
        ),
        TimestampFormat::Utc => build_layer(
            &config,
            ChronoUtc::new("%Y-%m-%dT%H:%M:%S%.3fZ".to_string()),
        ),
        TimestampFormat::None => build_layer(&config, ()),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(layer)
        .try_init()
        .map_err(|e| LogError::Init(e.to_string()))
}

/// Build the format layer with common settings applied.
fn build_layer<S, T>(config: &LogConfig, timer: T) -> Box<dyn Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    T: FormatTime + Send + Sync + 'static,
{
    let layer = fmt::layer()
        .with_target(config.include_target)
        .with_thread_ids(config.include_thread_ids)
        .with_file(config.include_location)
        .with_line_number(config.include_location)
        .with_level(true)
        .with_ansi(config.ansi_enabled)
        .with_timer(timer);

    match config.format {
        LogFormat::Pretty => layer.pretty().boxed(),
        LogFormat::Compact => layer.compact().boxed(),
        LogFormat::Json => layer.json().boxed(),
    }
}
