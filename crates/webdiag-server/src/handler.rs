//! Handler types and response helpers.
//!
//! A handler is any `Fn(RequestContext, Request) -> impl Future<Output = Response>`.
//! The context is passed explicitly; handlers obtain their logger and the
//! request ID from it and never from ambient state.
//!
//! # Example
//!
//! ```rust
//! use webdiag_core::RequestContext;
//! use webdiag_server::handler::{text_response, Request, Response};
//! use http::StatusCode;
//!
//! async fn ping(ctx: RequestContext, _req: Request) -> Response {
//!     ctx.logger().in_scope(|| tracing::debug!("ping handler"));
//!     text_response(StatusCode::OK, "pong\n")
//! }
//! ```

use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;

use bytes::Bytes;
use http::header::{HeaderValue, ALLOW, CONTENT_TYPE, X_CONTENT_TYPE_OPTIONS};
use http::{Method, StatusCode};
use http_body_util::Full;

use webdiag_core::RequestContext;

/// Request with a fully buffered body.
pub type Request = http::Request<Full<Bytes>>;

/// Response with a fully buffered body.
pub type Response = http::Response<Full<Bytes>>;

/// A boxed, sendable future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Transport peer address, stored in the request extensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteAddr(pub SocketAddr);

/// Request ID assigned by the request ID stage, stored in the request
/// extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(pub String);

/// Handles one request.
pub trait Handler: Send + Sync + 'static {
    /// Produces the response for `request`.
    fn call(&self, ctx: RequestContext, request: Request) -> BoxFuture<'static, Response>;
}

impl<F, Fut> Handler for F
where
    F: Fn(RequestContext, Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    fn call(&self, ctx: RequestContext, request: Request) -> BoxFuture<'static, Response> {
        Box::pin(self(ctx, request))
    }
}

/// Returns the peer address recorded for `request`, or `""`.
#[must_use]
pub fn remote_addr(request: &Request) -> String {
    request
        .extensions()
        .get::<RemoteAddr>()
        .map(|addr| addr.0.to_string())
        .unwrap_or_default()
}

/// Builds a plain text response.
pub fn text_response(status: StatusCode, body: impl Into<Bytes>) -> Response {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

/// Builds an HTML response.
pub fn html_response(status: StatusCode, body: impl Into<Bytes>) -> Response {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/html; charset=utf-8"),
    );
    response
}

/// Builds an error response: `message` plus a newline, as plain text that
/// browsers must not sniff.
pub fn error_response(status: StatusCode, message: &str) -> Response {
    let mut response = text_response(status, format!("{message}\n"));
    response
        .headers_mut()
        .insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    response
}

/// The `404 page not found` response.
pub fn not_found() -> Response {
    error_response(StatusCode::NOT_FOUND, "404 page not found")
}

/// Restricts `handler` to the `allowed` methods.
///
/// Other methods never reach the handler. They get an `Allow` header
/// listing the allowed methods plus `OPTIONS`; an `OPTIONS` request is
/// answered with `204 No Content`, anything else with `405`.
pub fn allow_methods<H: Handler>(allowed: &[Method], handler: H) -> MethodGuard<H> {
    let mut listed: Vec<&str> = allowed.iter().map(Method::as_str).collect();
    listed.push(Method::OPTIONS.as_str());

    MethodGuard {
        allowed: allowed.to_vec(),
        allow_header: listed.join(", "),
        inner: handler,
    }
}

/// Handler wrapper returned by [`allow_methods`].
#[derive(Debug)]
pub struct MethodGuard<H> {
    allowed: Vec<Method>,
    allow_header: String,
    inner: H,
}

impl<H> MethodGuard<H> {
    /// Returns the value sent in the `Allow` header.
    #[must_use]
    pub fn allow_header(&self) -> &str {
        &self.allow_header
    }

    fn reject(&self, method: &Method) -> Response {
        let mut response = if *method == Method::OPTIONS {
            let mut empty = Response::new(Full::new(Bytes::new()));
            *empty.status_mut() = StatusCode::NO_CONTENT;
            empty
        } else {
            let reason = StatusCode::METHOD_NOT_ALLOWED
                .canonical_reason()
                .unwrap_or_default();
            error_response(StatusCode::METHOD_NOT_ALLOWED, &format!("{method} {reason}"))
        };

        if let Ok(value) = HeaderValue::from_str(&self.allow_header) {
            response.headers_mut().insert(ALLOW, value);
        }
        response
    }
}

impl<H: Handler> Handler for MethodGuard<H> {
    fn call(&self, ctx: RequestContext, request: Request) -> BoxFuture<'static, Response> {
        if self.allowed.contains(request.method()) {
            return self.inner.call(ctx, request);
        }

        ctx.logger()
            .in_scope(|| tracing::error!(method = %request.method(), "invalid method"));
        let response = self.reject(request.method());
        Box::pin(async move { response })
    }
}
