//! Exact-path request routing.
//!
//! A request path is compared verbatim against the registered paths. There
//! are no parameters or prefixes, with one exception: when `/` is
//! registered it receives every path that matched nothing else, so the root
//! handler decides what an unknown path looks like. Without a `/` route an
//! unmatched path gets `404 page not found`.
//!
//! # Example
//!
//! ```rust
//! use webdiag_core::RequestContext;
//! use webdiag_server::handler::{text_response, Request, Response};
//! use webdiag_server::Router;
//! use http::StatusCode;
//!
//! async fn hello(_ctx: RequestContext, _req: Request) -> Response {
//!     text_response(StatusCode::OK, "hello\n")
//! }
//!
//! let router = Router::new().route("/hello", hello);
//!
//! assert!(router.resolve("/hello").is_some());
//! assert!(router.resolve("/hello/").is_none());
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use webdiag_core::RequestContext;

use crate::handler::{not_found, BoxFuture, Handler, Request, Response};

/// Path that receives otherwise unmatched requests.
pub const ROOT_PATH: &str = "/";

/// Maps request paths to handlers.
///
/// Cloning is cheap; handlers are shared.
#[derive(Clone, Default)]
pub struct Router {
    routes: HashMap<String, Arc<dyn Handler>>,
}

impl Router {
    /// Creates an empty router.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `path`, replacing any previous handler.
    #[must_use]
    pub fn route(mut self, path: impl Into<String>, handler: impl Handler) -> Self {
        self.routes.insert(path.into(), Arc::new(handler));
        self
    }

    /// Returns the handler for `path`, falling back to the root handler.
    #[must_use]
    pub fn resolve(&self, path: &str) -> Option<&Arc<dyn Handler>> {
        self.routes
            .get(path)
            .or_else(|| self.routes.get(ROOT_PATH))
    }

    /// Runs the handler for `request`'s path, or answers `404`.
    pub fn dispatch(&self, ctx: RequestContext, request: Request) -> BoxFuture<'static, Response> {
        match self.resolve(request.uri().path()) {
            Some(handler) => handler.call(ctx, request),
            None => {
                ctx.logger()
                    .in_scope(|| tracing::debug!(path = %request.uri().path(), "no route"));
                Box::pin(async { not_found() })
            }
        }
    }

    /// Returns the registered paths, sorted.
    #[must_use]
    pub fn paths(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = self.routes.keys().map(String::as_str).collect();
        paths.sort_unstable();
        paths
    }

    /// Returns the number of registered paths.
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Returns `true` if no paths are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router").field("paths", &self.paths()).finish()
    }
}
