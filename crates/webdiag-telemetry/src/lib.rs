//! Structured logging for webdiag.
//!
//! This crate installs the process-wide `tracing` subscriber that every
//! other webdiag crate logs through:
//!
//! - **JSON**: one object per line, request span fields included
//! - **Text**: one human-readable line per record
//! - Output to standard error or to an append-only log file
//!
//! # Example
//!
//! ```rust,ignore
//! use webdiag_telemetry::{init_logging, LogConfig, LogFormat, LogLevel};
//!
//! let config = LogConfig::default()
//!     .with_level(LogLevel::Debug)
//!     .with_format(LogFormat::Text);
//!
//! init_logging(&config)?;
//! tracing::info!("ready");
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod logging;

pub use config::{LogConfig, LogFormat, LogLevel};
pub use error::TelemetryError;
pub use logging::{init_logging, open_log_file};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
