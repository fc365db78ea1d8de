//! Request dispatch pipeline.
//!
//! Every request flows through the same fixed stages before reaching the
//! router:
//!
//! 1. **Request ID**: assigns the next ID and sets `X-Request-ID` on the
//!    response, whatever the handler returned
//! 2. **Log request**: resolves the client IP, attaches the request logger
//!    to the context and records the request
//!
//! The handler then runs inside the request's logging span, bounded by the
//! configured request timeout.

use std::sync::Arc;
use std::time::Duration;

use http::header::HeaderValue;
use http::StatusCode;
use tracing::Instrument;

use webdiag_core::{client_ip, RequestContext, RequestIdGenerator};

use crate::handler::{error_response, remote_addr, BoxFuture, Request, RequestId, Response};
use crate::router::Router;

/// Response header carrying the request ID.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// A pipeline stage.
pub trait Middleware: Send + Sync + 'static {
    /// Stage name, for diagnostics.
    fn name(&self) -> &'static str;

    /// Processes `request`, usually by calling `next` and adjusting the
    /// result.
    fn process<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response>;
}

/// The rest of the pipeline after the current stage.
pub struct Next<'a> {
    inner: NextInner<'a>,
}

type Terminal<'a> =
    Box<dyn FnOnce(&mut RequestContext, Request) -> BoxFuture<'static, Response> + Send + 'a>;

enum NextInner<'a> {
    Chain {
        middleware: &'a dyn Middleware,
        next: Box<Next<'a>>,
    },
    Handler(Terminal<'a>),
}

impl<'a> Next<'a> {
    fn new(middleware: &'a dyn Middleware, next: Next<'a>) -> Self {
        Self {
            inner: NextInner::Chain {
                middleware,
                next: Box::new(next),
            },
        }
    }

    fn handler<F>(f: F) -> Self
    where
        F: FnOnce(&mut RequestContext, Request) -> BoxFuture<'static, Response> + Send + 'a,
    {
        Self {
            inner: NextInner::Handler(Box::new(f)),
        }
    }

    /// Runs the remaining stages and the handler.
    pub async fn run(self, ctx: &mut RequestContext, request: Request) -> Response {
        match self.inner {
            NextInner::Chain { middleware, next } => middleware.process(ctx, request, *next).await,
            NextInner::Handler(handler) => handler(ctx, request).await,
        }
    }
}

/// Assigns each request the next ID from the shared generator.
#[derive(Debug, Clone)]
pub struct RequestIdStage {
    ids: Arc<RequestIdGenerator>,
}

impl RequestIdStage {
    /// Creates the stage around a shared generator.
    #[must_use]
    pub fn new(ids: Arc<RequestIdGenerator>) -> Self {
        Self { ids }
    }
}

impl Middleware for RequestIdStage {
    fn name(&self) -> &'static str {
        "request_id"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        mut request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let request_id = self.ids.next_id();
            request
                .extensions_mut()
                .insert(RequestId(request_id.clone()));

            let mut response = next.run(ctx, request).await;

            // Generated IDs are alphanumeric; only a custom prefix can fail here.
            if let Ok(value) = HeaderValue::from_str(&request_id) {
                response.headers_mut().insert(REQUEST_ID_HEADER, value);
            }
            response
        })
    }
}

/// Attaches the request logger and records each request.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogRequestStage;

impl Middleware for LogRequestStage {
    fn name(&self) -> &'static str {
        "log_request"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let request_id = request
                .extensions()
                .get::<RequestId>()
                .map(|id| id.0.clone())
                .unwrap_or_default();
            let ip = client_ip(request.headers(), &remote_addr(&request));
            let url = request.uri().to_string();

            *ctx = ctx.attach(&request_id, &ip, request.method(), &url);

            let span = ctx.logger();
            span.in_scope(|| tracing::info!("request received"));

            let response = next.run(ctx, request).instrument(span.clone()).await;
            span.in_scope(|| {
                tracing::debug!(
                    status = response.status().as_u16(),
                    elapsed = ?ctx.elapsed(),
                    "request completed"
                );
            });
            response
        })
    }
}

/// The fixed-order pipeline in front of the router.
pub struct Pipeline {
    stages: Vec<Arc<dyn Middleware>>,
    router: Arc<Router>,
    request_timeout: Duration,
}

impl Pipeline {
    /// Builds the pipeline: request ID, then log request, then `router`.
    #[must_use]
    pub fn new(ids: Arc<RequestIdGenerator>, router: Router, request_timeout: Duration) -> Self {
        Self {
            stages: vec![
                Arc::new(RequestIdStage::new(ids)),
                Arc::new(LogRequestStage),
            ],
            router: Arc::new(router),
            request_timeout,
        }
    }

    /// Returns the stage names in execution order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    /// Runs `request` through every stage and the router.
    ///
    /// A handler running longer than the request timeout is abandoned and
    /// the client gets `504 Gateway Timeout`.
    pub async fn dispatch(&self, request: Request) -> Response {
        let router = Arc::clone(&self.router);
        let timeout = self.request_timeout;

        self.run(request, move |ctx: &mut RequestContext, request| {
            let ctx = ctx.clone();
            Box::pin(async move {
                let logger = ctx.logger();
                match tokio::time::timeout(timeout, router.dispatch(ctx, request)).await {
                    Ok(response) => response,
                    Err(_) => {
                        logger.in_scope(|| {
                            tracing::warn!(timeout = ?timeout, "handler timed out");
                        });
                        error_response(StatusCode::GATEWAY_TIMEOUT, "request timed out")
                    }
                }
            })
        })
        .await
    }

    /// Runs `request` through every stage and answers with `response`
    /// instead of routing it.
    ///
    /// Used when a request fails before it can be routed, so the reply
    /// still carries a request ID and is logged.
    pub async fn reject(&self, request: Request, response: Response) -> Response {
        self.run(request, move |_: &mut RequestContext, _| {
            Box::pin(async move { response })
        })
        .await
    }

    async fn run<F>(&self, request: Request, terminal: F) -> Response
    where
        F: FnOnce(&mut RequestContext, Request) -> BoxFuture<'static, Response> + Send + 'static,
    {
        let mut next = Next::handler(terminal);
        for stage in self.stages.iter().rev() {
            next = Next::new(stage.as_ref(), next);
        }

        let mut ctx = RequestContext::new();
        next.run(&mut ctx, request).await
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stage_names())
            .field("router", &self.router)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}
