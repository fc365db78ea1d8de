//! # Webdiag Server
//!
//! HTTP server for the webdiag diagnostic service.
//!
//! This crate provides:
//!
//! - [`Server`] / [`RunningServer`] - listen, serve, and bounded graceful shutdown
//! - [`Pipeline`] - request ID and request logging stages in front of the router
//! - [`Router`] - exact-path dispatch with a catch-all root
//! - [`diagnostic_router`] - the diagnostic pages
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use webdiag_core::RequestIdGenerator;
//! use webdiag_server::{diagnostic_router, Server, ServerConfig, ShutdownSignal, APP_NAME};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::new(
//!         ServerConfig::default(),
//!         diagnostic_router(APP_NAME),
//!         Arc::new(RequestIdGenerator::new()?),
//!     );
//!
//!     let mut running = server.start().await?;
//!     running.await_shutdown(&ShutdownSignal::new()).await?;
//!     Ok(())
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/webdiag-server/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod config;
mod error;
pub mod handler;
pub mod lifecycle;
pub mod middleware;
pub mod router;
pub mod routes;
mod server;
pub mod shutdown;

pub use config::{ServerConfig, ServerConfigBuilder};
pub use error::{ServerError, ServerResult};
pub use handler::{allow_methods, Handler, MethodGuard};
pub use lifecycle::ServerState;
pub use middleware::{LogRequestStage, Middleware, Next, Pipeline, RequestIdStage, REQUEST_ID_HEADER};
pub use router::Router;
pub use routes::{diagnostic_router, APP_NAME};
pub use server::{RunningServer, Server};
pub use shutdown::{ConnectionTracker, OsSignals, ShutdownSignal, SignalKind};
