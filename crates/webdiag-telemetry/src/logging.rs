//! Subscriber installation.
//!
//! [`init_logging`] installs the process-wide subscriber once at startup.
//! Request-scoped fields (`method`, `url`, `ip`, `request_id`) are carried
//! by the `request` span and show up in every record emitted inside it.

use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;

use tracing::Subscriber;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::{LogConfig, LogFormat};
use crate::error::TelemetryError;
use crate::TelemetryResult;

/// Installs the global logging subscriber.
///
/// Records go to `config.file` when set, opened for appending and created
/// with mode `0600` if missing, and to standard error otherwise. Emits one
/// info record describing the active configuration.
///
/// # Errors
///
/// Returns [`TelemetryError::LogFile`] if the log file cannot be opened and
/// [`TelemetryError::LoggingInit`] if a global subscriber is already set.
pub fn init_logging(config: &LogConfig) -> TelemetryResult<()> {
    let writer = match &config.file {
        Some(path) => BoxMakeWriter::new(Mutex::new(open_log_file(path)?)),
        None => BoxMakeWriter::new(std::io::stderr),
    };

    tracing_subscriber::registry()
        .with(log_layer(config, writer)?)
        .try_init()
        .map_err(|e| TelemetryError::LoggingInit(e.to_string()))?;

    tracing::info!(
        level = %config.level,
        format = %config.format,
        file = %config.file.as_deref().map_or_else(|| "stderr".into(), Path::to_string_lossy),
        add_source = config.add_source,
        "logging initialized"
    );

    Ok(())
}

/// Builds the formatting layer for `config`, writing to `writer`.
///
/// The layer is filtered to `config.level` and above. ANSI colors are only
/// used for text output to standard error.
///
/// # Errors
///
/// Returns [`TelemetryError::InvalidConfig`] if the level cannot be turned
/// into a filter.
pub fn log_layer<S, W>(
    config: &LogConfig,
    writer: W,
) -> TelemetryResult<Box<dyn Layer<S> + Send + Sync + 'static>>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let filter = EnvFilter::builder()
        .with_default_directive(config.level.as_filter().into())
        .parse("")
        .map_err(|e| TelemetryError::InvalidConfig(format!("invalid loglevel: {e}")))?;

    let layer = match config.format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_file(config.add_source)
            .with_line_number(config.add_source)
            .with_writer(writer)
            .with_filter(filter)
            .boxed(),
        LogFormat::Text => tracing_subscriber::fmt::layer()
            .with_ansi(config.file.is_none())
            .with_file(config.add_source)
            .with_line_number(config.add_source)
            .with_writer(writer)
            .with_filter(filter)
            .boxed(),
    };

    Ok(layer)
}

/// Opens `path` for appending, creating it with mode `0600` if missing.
///
/// # Errors
///
/// Returns [`TelemetryError::LogFile`] if the file cannot be opened.
pub fn open_log_file(path: &Path) -> TelemetryResult<File> {
    let mut options = OpenOptions::new();
    options.append(true).create(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    options.open(path).map_err(|source| TelemetryError::LogFile {
        path: path.to_path_buf(),
        source,
    })
}
