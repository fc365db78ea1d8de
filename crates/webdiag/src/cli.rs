//! Command-line interface.
//!
//! Every flag can also be set through a `WEBDIAG_*` environment variable;
//! a flag on the command line wins over the environment.

use std::path::PathBuf;

use clap::Parser;

use webdiag_server::ServerConfig;
use webdiag_telemetry::{LogConfig, LogFormat, LogLevel};

/// Exit status for a listen or serve failure.
pub const EXIT_SERVER: u8 = 1;

/// Exit status for an invalid command line.
pub const EXIT_USAGE: u8 = 2;

/// Exit status when logging cannot be set up.
pub const EXIT_LOG: u8 = 3;

/// Command-line arguments.
#[derive(Parser, Debug, Clone)]
#[command(name = "webdiag", version, about = "HTTP diagnostic server")]
pub struct Cli {
    /// Address to listen on, `host:port` or `:port`
    #[arg(long, env = "WEBDIAG_ADDR", default_value = webdiag_server::config::DEFAULT_HTTP_ADDR)]
    pub addr: String,

    /// Append logs to this file instead of standard error
    #[arg(long, env = "WEBDIAG_LOGFILE")]
    pub logfile: Option<PathBuf>,

    /// Minimum log level: debug, info, warn, error
    #[arg(long, env = "WEBDIAG_LOGLEVEL", default_value = "Info", value_parser = parse_level)]
    pub loglevel: LogLevel,

    /// Log encoding: json, text
    #[arg(long, env = "WEBDIAG_LOGTYPE", default_value = "json", value_parser = parse_format)]
    pub logtype: LogFormat,

    /// Annotate log records with their source file and line
    #[arg(long, env = "WEBDIAG_LOGSOURCE")]
    pub logsource: bool,
}

impl Cli {
    /// Returns the logging configuration selected on the command line.
    #[must_use]
    pub fn log_config(&self) -> LogConfig {
        LogConfig::default()
            .with_level(self.loglevel)
            .with_format(self.logtype)
            .with_file(self.logfile.clone())
            .with_source(self.logsource)
    }

    /// Returns the server configuration selected on the command line.
    #[must_use]
    pub fn server_config(&self) -> ServerConfig {
        ServerConfig::builder().http_addr(&self.addr).build()
    }
}

fn parse_level(s: &str) -> Result<LogLevel, String> {
    s.parse()
        .map_err(|_| format!("must be one of: {}", LogLevel::names()))
}

fn parse_format(s: &str) -> Result<LogFormat, String> {
    s.parse()
        .map_err(|_| format!("must be one of: {}", LogFormat::names()))
}
