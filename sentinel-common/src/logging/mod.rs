//! Standardized logging configuration for the sentinel server.
//!
//! Provides a consistent logging setup across all crates with support for:
//! - Human-readable console output (default)
//! - Compact single-line output for production
//! - JSON output for log aggregation
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Standard tracing filter (e.g., `info`, `sentinel_core=debug`)
//! - `LOG_FORMAT`: Output format - `pretty` (default), `compact`, or `json`
//! - `LOG_TIMESTAMPS`: Timestamp format - `local` (default), `utc`, or `none`
//!
//! # Usage
//!
//! ```rust,ignore
//! use sentinel_common::logging::{init_logging, LogConfig};
//!
//! // Use defaults from environment
//! init_logging(LogConfig::from_env())?;
//!
//! // Or configure explicitly
//! init_logging(LogConfig {
//!     format: LogFormat::Json,
//!     default_level: "info".to_string(),
//!     ..Default::default()
//! })?;
//! ```

mod config;

pub use config::{init_logging, LogConfig, LogError, LogFormat, TimestampFormat};
