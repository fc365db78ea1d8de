//! # Webdiag
//!
//! Wiring for the `webdiag` binary: command-line parsing, exit statuses and
//! the server run loop.

#![doc(html_root_url = "https://docs.rs/webdiag/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod cli;

use std::sync::Arc;

use anyhow::Context as _;

use webdiag_core::RequestIdGenerator;
use webdiag_server::{diagnostic_router, Server, ServerError, ShutdownSignal, APP_NAME};

pub use cli::{Cli, EXIT_LOG, EXIT_SERVER, EXIT_USAGE};

/// Version of this crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Serves the diagnostic pages until SIGINT, SIGTERM or `cancel`.
///
/// Logging must already be initialised. An exceeded drain deadline is
/// logged and counts as a clean exit.
pub async fn run(cli: &Cli, cancel: &ShutdownSignal) -> anyhow::Result<()> {
    let ids = RequestIdGenerator::new().context("failed to initialize request ids")?;
    tracing::debug!(prefix = ids.prefix(), "request id prefix chosen");

    let server = Server::new(
        cli.server_config(),
        diagnostic_router(APP_NAME),
        Arc::new(ids),
    );
    let mut running = server.start().await?;

    match running.await_shutdown(cancel).await {
        Ok(()) | Err(ServerError::ShutdownTimeout { .. }) => Ok(()),
        Err(err) => Err(err.into()),
    }
}
