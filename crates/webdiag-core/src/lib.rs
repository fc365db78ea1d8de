//! # Webdiag Core
//!
//! Core types shared by the webdiag server and its handlers.
//!
//! This crate provides the pieces every request passes through before a
//! handler sees it:
//!
//! - [`RequestIdGenerator`] - process-unique, monotonically increasing request IDs
//! - [`RequestContext`] - request-scoped logger and request ID, with fallbacks
//! - [`client_ip`] - client address resolution honouring `X-Real-IP`
//! - [`CoreError`] - startup errors raised by this crate

#![doc(html_root_url = "https://docs.rs/webdiag-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod client_ip;
mod context;
mod error;
pub mod request_id;

pub use client_ip::{client_ip, REAL_IP_HEADER};
pub use context::{logger, request_id, RequestContext};
pub use error::{CoreError, CoreResult};
pub use request_id::{RequestIdGenerator, PREFIX_LEN, SEQUENCE_WIDTH};
