//! Server configuration types.
//!
//! # Example
//!
//! ```rust
//! use webdiag_server::ServerConfig;
//! use std::time::Duration;
//!
//! let config = ServerConfig::builder()
//!     .http_addr("127.0.0.1:9000")
//!     .shutdown_timeout(Duration::from_secs(5))
//!     .build();
//!
//! assert_eq!(config.http_addr(), "127.0.0.1:9000");
//! ```

use std::time::Duration;

/// Default HTTP bind address.
pub const DEFAULT_HTTP_ADDR: &str = "localhost:8080";

/// Default graceful shutdown deadline in seconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 10;

/// Default time allowed to receive a request's headers, in seconds.
pub const DEFAULT_HEADER_READ_TIMEOUT_SECS: u64 = 5;

/// Default maximum handler run time in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Server configuration.
///
/// Use [`ServerConfig::builder()`] to construct instances.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen address as `host:port` or `:port`
    http_addr: String,

    /// How long in-flight requests get to finish once shutdown starts
    shutdown_timeout: Duration,

    /// How long a client gets to send the request head
    header_read_timeout: Duration,

    /// Upper bound on running the handler once the body is read
    request_timeout: Duration,

    /// Whether connections are kept open between requests
    keep_alive: bool,
}

impl ServerConfig {
    /// Creates a new server configuration builder.
    #[must_use]
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }

    /// Returns the configured listen address.
    #[must_use]
    pub fn http_addr(&self) -> &str {
        &self.http_addr
    }

    /// Returns the port of a bare `:port` address.
    ///
    /// Such an address listens on every interface, IPv6 and IPv4 alike.
    /// Any other form returns `None` and is handed to the system resolver
    /// as is.
    #[must_use]
    pub fn wildcard_port(&self) -> Option<u16> {
        self.http_addr.strip_prefix(':')?.parse().ok()
    }

    /// Returns the graceful shutdown deadline.
    #[must_use]
    pub fn shutdown_timeout(&self) -> Duration {
        self.shutdown_timeout
    }

    /// Returns the request head read timeout.
    #[must_use]
    pub fn header_read_timeout(&self) -> Duration {
        self.header_read_timeout
    }

    /// Returns the maximum handler run time.
    ///
    /// The body is read beforehand under [`header_read_timeout`](Self::header_read_timeout).
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Returns whether HTTP keep-alive is enabled.
    #[must_use]
    pub fn keep_alive(&self) -> bool {
        self.keep_alive
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Builder for [`ServerConfig`].
#[derive(Debug, Clone)]
pub struct ServerConfigBuilder {
    http_addr: String,
    shutdown_timeout: Duration,
    header_read_timeout: Duration,
    request_timeout: Duration,
    keep_alive: bool,
}

impl ServerConfigBuilder {
    /// Creates a new builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            http_addr: DEFAULT_HTTP_ADDR.to_string(),
            shutdown_timeout: Duration::from_secs(DEFAULT_SHUTDOWN_TIMEOUT_SECS),
            header_read_timeout: Duration::from_secs(DEFAULT_HEADER_READ_TIMEOUT_SECS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            keep_alive: true,
        }
    }

    /// Sets the listen address (`host:port` or `:port`).
    #[must_use]
    pub fn http_addr(mut self, addr: impl Into<String>) -> Self {
        self.http_addr = addr.into();
        self
    }

    /// Sets the graceful shutdown deadline.
    ///
    /// This is the maximum time the server waits for in-flight requests
    /// once shutdown has started.
    #[must_use]
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Sets the request head read timeout.
    #[must_use]
    pub fn header_read_timeout(mut self, timeout: Duration) -> Self {
        self.header_read_timeout = timeout;
        self
    }

    /// Sets the maximum handler run time.
    ///
    /// The clock starts once the body has been read. A handler still
    /// running at the deadline is dropped and the client gets
    /// `504 Gateway Timeout`. Defaults to
    /// [`DEFAULT_REQUEST_TIMEOUT_SECS`] seconds, which also caps how long a
    /// slow handler can hold up a graceful shutdown.
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Enables or disables HTTP keep-alive.
    #[must_use]
    pub fn keep_alive(mut self, enabled: bool) -> Self {
        self.keep_alive = enabled;
        self
    }

    /// Builds the [`ServerConfig`].
    #[must_use]
    pub fn build(self) -> ServerConfig {
        ServerConfig {
            http_addr: self.http_addr,
            shutdown_timeout: self.shutdown_timeout,
            header_read_timeout: self.header_read_timeout,
            request_timeout: self.request_timeout,
            keep_alive: self.keep_alive,
        }
    }
}

impl Default for ServerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();

        assert_eq!(config.http_addr(), "localhost:8080");
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(10));
        assert_eq!(config.header_read_timeout(), Duration::from_secs(5));
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
        assert!(config.keep_alive());
    }

    #[test]
    fn test_host_address_has_no_wildcard_port() {
        let config = ServerConfig::builder().http_addr("localhost:3000").build();
        assert_eq!(config.wildcard_port(), None);

        let config = ServerConfig::builder().http_addr("[::1]:3000").build();
        assert_eq!(config.wildcard_port(), None);
    }

    #[test]
    fn test_bare_port_is_wildcard() {
        let config = ServerConfig::builder().http_addr(":8080").build();
        assert_eq!(config.wildcard_port(), Some(8080));
        assert_eq!(config.http_addr(), ":8080");
    }

    #[test]
    fn test_malformed_bare_port_is_not_wildcard() {
        let config = ServerConfig::builder().http_addr(":http").build();
        assert_eq!(config.wildcard_port(), None);
    }

    #[test]
    fn test_builder_chaining() {
        let config = ServerConfig::builder()
            .http_addr("127.0.0.1:0")
            .shutdown_timeout(Duration::from_millis(250))
            .header_read_timeout(Duration::from_secs(1))
            .request_timeout(Duration::from_secs(2))
            .keep_alive(false)
            .build();

        assert_eq!(config.http_addr(), "127.0.0.1:0");
        assert_eq!(config.shutdown_timeout(), Duration::from_millis(250));
        assert_eq!(config.header_read_timeout(), Duration::from_secs(1));
        assert_eq!(config.request_timeout(), Duration::from_secs(2));
        assert!(!config.keep_alive());
    }
}
