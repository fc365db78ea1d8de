//! Webdiag - entry point.

use std::process::ExitCode;

use clap::Parser;

use webdiag::{Cli, EXIT_LOG, EXIT_SERVER, EXIT_USAGE};
use webdiag_server::ShutdownSignal;
use webdiag_telemetry::init_logging;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = if err.use_stderr() { EXIT_USAGE } else { 0 };
            // Nothing more can be reported if stderr itself is gone.
            let _ = err.print();
            return ExitCode::from(code);
        }
    };

    if let Err(err) = init_logging(&cli.log_config()) {
        eprintln!("webdiag: {err}");
        return ExitCode::from(EXIT_LOG);
    }

    tracing::info!(version = webdiag::VERSION, "starting webdiag");

    match webdiag::run(&cli, &ShutdownSignal::new()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %format!("{err:#}"), "server failed");
            ExitCode::from(EXIT_SERVER)
        }
    }
}
