//! Request context types.
//!
//! The [`RequestContext`] carries the per-request logger and request ID from
//! the dispatch layer into handlers. It is passed explicitly to every
//! handler; nothing is looked up from ambient state.
//!
//! Lookups never fail. A context that was never attached (for example one
//! built directly in a unit test) resolves to the process-wide default
//! logger and an empty request ID.

use std::time::{Duration, Instant};

use http::Method;
use tracing::Span;

/// Per-request context handed to every handler.
///
/// Contexts are immutable once built. [`attach`](Self::attach) returns a
/// new context layered over its parent instead of modifying it.
///
/// # Example
///
/// ```
/// use http::Method;
/// use webdiag_core::RequestContext;
///
/// let root = RequestContext::new();
/// assert_eq!(root.request_id(), "");
///
/// let ctx = root.attach("abcDEF0000000001", "203.0.113.7", &Method::GET, "/hello");
/// assert_eq!(ctx.request_id(), "abcDEF0000000001");
/// assert_eq!(root.request_id(), "");
/// ```
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Correlation ID assigned by the request ID stage.
    request_id: Option<String>,

    /// Span carrying `method`, `url`, `ip` and `request_id`.
    logger: Option<Span>,

    /// Resolved client address.
    client_ip: Option<String>,

    /// When the request started processing.
    started_at: Instant,
}

impl RequestContext {
    /// Creates an empty context with no logger and no request ID.
    #[must_use]
    pub fn new() -> Self {
        Self {
            request_id: None,
            logger: None,
            client_ip: None,
            started_at: Instant::now(),
        }
    }

    /// Returns a child context carrying a logger bound to the request.
    ///
    /// The logger is a `request` span with the fields `method`, `url`, `ip`
    /// and `request_id`. If this context already has a logger the new span
    /// is nested under it. `self` is left untouched.
    #[must_use]
    pub fn attach(&self, request_id: &str, client_ip: &str, method: &Method, url: &str) -> Self {
        let parent = self.logger.as_ref().and_then(Span::id);
        let logger = tracing::info_span!(
            parent: parent,
            "request",
            method = %method,
            url = %url,
            ip = %client_ip,
            request_id = %request_id,
        );

        Self {
            request_id: Some(request_id.to_owned()),
            logger: Some(logger),
            client_ip: Some(client_ip.to_owned()),
            started_at: self.started_at,
        }
    }

    /// Returns the request logger, or the default logger if none is attached.
    ///
    /// The default logger is [`Span::none()`]: events recorded against it go
    /// straight to the process-wide subscriber without request fields.
    #[must_use]
    pub fn logger(&self) -> Span {
        self.logger.clone().unwrap_or_else(Span::none)
    }

    /// Returns the request ID, or `""` if none is attached.
    #[must_use]
    pub fn request_id(&self) -> &str {
        self.request_id.as_deref().unwrap_or("")
    }

    /// Returns the resolved client address, if attached.
    #[must_use]
    pub fn client_ip(&self) -> Option<&str> {
        self.client_ip.as_deref()
    }

    /// Returns the elapsed time since the request started.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolves the logger for an optional context.
///
/// Falls back to the default logger when `ctx` is `None` or carries no
/// logger. Logging must never be the reason a handler fails.
#[must_use]
pub fn logger(ctx: Option<&RequestContext>) -> Span {
    ctx.map_or_else(Span::none, RequestContext::logger)
}

/// Resolves the request ID for an optional context, `""` when absent.
#[must_use]
pub fn request_id(ctx: Option<&RequestContext>) -> &str {
    ctx.map_or("", RequestContext::request_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_registry<T>(f: impl FnOnce() -> T) -> T {
        tracing::subscriber::with_default(tracing_subscriber::registry(), f)
    }

    #[test]
    fn test_empty_context_falls_back() {
        let ctx = RequestContext::new();
        assert!(ctx.logger().is_none());
        assert_eq!(ctx.request_id(), "");
        assert!(ctx.client_ip().is_none());
    }

    #[test]
    fn test_absent_context_falls_back() {
        assert!(logger(None).is_none());
        assert_eq!(request_id(None), "");
    }

    #[test]
    fn test_attach_binds_request_fields() {
        with_registry(|| {
            let ctx = RequestContext::new().attach(
                "abcDEF0000000042",
                "203.0.113.7",
                &Method::POST,
                "/request?x=1",
            );

            let span = ctx.logger();
            assert!(!span.is_disabled());

            let meta = span.metadata().unwrap();
            assert_eq!(meta.name(), "request");
            for field in ["method", "url", "ip", "request_id"] {
                assert!(meta.fields().field(field).is_some(), "missing field {field}");
            }

            assert_eq!(ctx.request_id(), "abcDEF0000000042");
            assert_eq!(ctx.client_ip(), Some("203.0.113.7"));
            assert_eq!(request_id(Some(&ctx)), "abcDEF0000000042");
            assert!(!logger(Some(&ctx)).is_none());
        });
    }

    #[test]
    fn test_attach_leaves_parent_untouched() {
        with_registry(|| {
            let parent = RequestContext::new();
            let _child = parent.attach("id", "127.0.0.1:1", &Method::GET, "/");

            assert_eq!(parent.request_id(), "");
            assert!(parent.logger().is_none());
        });
    }

    #[test]
    fn test_attach_overlays_existing_context() {
        with_registry(|| {
            let first = RequestContext::new().attach("first", "ip", &Method::GET, "/");
            let second = first.attach("second", "ip", &Method::GET, "/");

            assert_eq!(first.request_id(), "first");
            assert_eq!(second.request_id(), "second");
            assert_ne!(first.logger().id(), second.logger().id());
        });
    }

    #[test]
    fn test_elapsed_is_shared_with_child() {
        let parent = RequestContext::new();
        std::thread::sleep(Duration::from_millis(10));
        let child = parent.attach("id", "ip", &Method::GET, "/");
        assert!(child.elapsed() >= Duration::from_millis(10));
    }
}
