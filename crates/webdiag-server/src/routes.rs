//! Diagnostic pages.
//!
//! | Path | Methods | Response |
//! |---|---|---|
//! | `/` | GET | HTML root page |
//! | `/hello` | GET | `hello` |
//! | `/hellohtml` | GET | HTML hello page |
//! | `/headers` | GET | HTML table of the request headers |
//! | `/remote` | any | Peer address and proxy headers |
//! | `/request` | any | Raw request dump |
//! | `/build` | GET | Modification time of the running executable |
//!
//! Every handler records one debug event through the request logger.

use std::fmt::{self, Write as _};
use std::sync::Arc;
use std::time::SystemTime;

use chrono::{DateTime, Local};
use http::header::{HeaderName, HeaderValue, CACHE_CONTROL, HOST};
use http::{HeaderMap, Method, StatusCode, Version};

use webdiag_core::RequestContext;

use crate::handler::{
    allow_methods, error_response, html_response, not_found, remote_addr, text_response, Request,
    Response,
};
use crate::router::{Router, ROOT_PATH};

/// Default application name shown on the root page.
pub const APP_NAME: &str = "Web Diagnostics";

/// Cache policy for responses that must always be fresh.
pub const NO_CACHE: &str = "no-cache, no-store, must-revalidate";

/// Body of the 500 response when a page cannot be produced.
pub const MSG_RENDER_ERROR: &str =
    "Sorry, the server was unable to display this page. Please contact the administrator.";

/// Proxy headers listed by `/remote`, in output order.
pub const PROXY_HEADERS: [&str; 4] = [
    "Cf-Connecting-Ip",
    "X-Client-Ip",
    "X-Forwarded-For",
    "X-Real-Ip",
];

/// Timestamp layout used by `/build`.
pub const BUILD_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Builds the router serving every diagnostic page.
///
/// `app_name` titles the root page.
#[must_use]
pub fn diagnostic_router(app_name: &str) -> Router {
    let app_name: Arc<str> = Arc::from(app_name);
    let get = [Method::GET];

    Router::new()
        .route(
            ROOT_PATH,
            allow_methods(&get, move |ctx: RequestContext, req: Request| {
                root(Arc::clone(&app_name), ctx, req)
            }),
        )
        .route("/hello", allow_methods(&get, hello))
        .route("/hellohtml", allow_methods(&get, hello_html))
        .route("/headers", allow_methods(&get, headers))
        .route("/remote", remote)
        .route("/request", request_dump)
        .route("/build", allow_methods(&get, build))
}

/// `/`: the root page. Unknown paths fall through to here and get a 404.
pub async fn root(app_name: Arc<str>, ctx: RequestContext, req: Request) -> Response {
    let logger = ctx.logger();

    if req.uri().path() != ROOT_PATH {
        logger.in_scope(|| tracing::warn!("invalid path"));
        return not_found();
    }

    logger.in_scope(|| tracing::debug!("root handler"));
    render(&ctx, render_root(&app_name))
}

/// `/hello`: plain text greeting.
pub async fn hello(ctx: RequestContext, _req: Request) -> Response {
    ctx.logger().in_scope(|| tracing::debug!("hello handler"));
    no_cache(text_response(StatusCode::OK, "hello\n"))
}

/// `/hellohtml`: HTML greeting.
pub async fn hello_html(ctx: RequestContext, _req: Request) -> Response {
    ctx.logger().in_scope(|| tracing::debug!("hello html handler"));
    no_cache(render(&ctx, render_hello()))
}

/// `/headers`: table of the request headers sorted by name.
pub async fn headers(ctx: RequestContext, req: Request) -> Response {
    ctx.logger()
        .in_scope(|| tracing::debug!(count = req.headers().len(), "headers handler"));
    render(&ctx, render_headers(&sorted_headers(req.headers())))
}

/// `/remote`: transport peer address followed by any proxy headers.
pub async fn remote(ctx: RequestContext, req: Request) -> Response {
    ctx.logger().in_scope(|| tracing::debug!("remote handler"));

    let mut body = format!("RemoteAddr: {}\n", remote_addr(&req));
    for name in PROXY_HEADERS {
        let value = req
            .headers()
            .get(name)
            .map(|value| String::from_utf8_lossy(value.as_bytes()))
            .filter(|value| !value.is_empty());
        if let Some(value) = value {
            body.push_str(&format!("{name}: {value}\n"));
        }
    }

    text_response(StatusCode::OK, body)
}

/// `/request`: the request as it arrived on the wire.
pub async fn request_dump(ctx: RequestContext, req: Request) -> Response {
    ctx.logger().in_scope(|| tracing::debug!("request handler"));

    let (parts, body) = req.into_parts();
    let body = http_body_util::BodyExt::collect(body)
        .await
        .map(http_body_util::Collected::to_bytes)
        .unwrap_or_default();

    let mut dump = dump_head(&parts.method, &parts.uri, parts.version, &parts.headers).into_bytes();
    dump.extend_from_slice(&body);
    dump.push(b'\n');

    text_response(StatusCode::OK, dump)
}

/// `/build`: when the running executable was last modified, in local time.
pub async fn build(ctx: RequestContext, _req: Request) -> Response {
    let logger = ctx.logger();
    logger.in_scope(|| tracing::debug!("build handler"));

    match executable_modified() {
        Ok(modified) => no_cache(text_response(
            StatusCode::OK,
            format!("{}\n", format_timestamp(modified)),
        )),
        Err(err) => {
            logger.in_scope(|| tracing::error!(error = %err, "unable to read executable time"));
            no_cache(error_response(StatusCode::INTERNAL_SERVER_ERROR, MSG_RENDER_ERROR))
        }
    }
}

fn no_cache(mut response: Response) -> Response {
    response
        .headers_mut()
        .insert(CACHE_CONTROL, HeaderValue::from_static(NO_CACHE));
    response
}

fn render(ctx: &RequestContext, page: Result<String, fmt::Error>) -> Response {
    match page {
        Ok(html) => html_response(StatusCode::OK, html),
        Err(_) => {
            ctx.logger()
                .in_scope(|| tracing::error!("unable to render page"));
            error_response(StatusCode::INTERNAL_SERVER_ERROR, MSG_RENDER_ERROR)
        }
    }
}

/// Escapes text for inclusion in HTML content and attribute values.
#[must_use]
pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&#34;")
        .replace('\'', "&#39;")
}

fn page(title: &str, body: impl FnOnce(&mut String) -> fmt::Result) -> Result<String, fmt::Error> {
    let mut html = String::new();
    writeln!(html, "<!DOCTYPE html>")?;
    writeln!(html, "<html lang=\"en\">")?;
    writeln!(html, "<head>")?;
    writeln!(html, "<meta charset=\"utf-8\">")?;
    writeln!(html, "<title>{}</title>", html_escape(title))?;
    writeln!(html, "</head>")?;
    writeln!(html, "<body>")?;
    writeln!(html, "<h1>{}</h1>", html_escape(title))?;
    body(&mut html)?;
    writeln!(html, "</body>")?;
    writeln!(html, "</html>")?;
    Ok(html)
}

fn render_root(app_name: &str) -> Result<String, fmt::Error> {
    page(app_name, |html| {
        writeln!(html, "<ul>")?;
        for path in ["/hello", "/hellohtml", "/headers", "/remote", "/request", "/build"] {
            writeln!(html, "<li><a href=\"{path}\">{path}</a></li>")?;
        }
        writeln!(html, "</ul>")
    })
}

fn render_hello() -> Result<String, fmt::Error> {
    page("Hello", |html| writeln!(html, "<p>hello</p>"))
}

fn render_headers(headers: &[(String, String)]) -> Result<String, fmt::Error> {
    page("Request Headers", |html| {
        writeln!(html, "<table>")?;
        writeln!(html, "<tr><th>Header</th><th>Value</th></tr>")?;
        for (name, value) in headers {
            writeln!(
                html,
                "<tr><td>{}</td><td>{}</td></tr>",
                html_escape(name),
                html_escape(value)
            )?;
        }
        writeln!(html, "</table>")
    })
}

/// Returns each header once, in canonical form, sorted by name, with
/// repeated values joined by `", "`. `Host` is left out; it belongs to the
/// request line, not the header list.
#[must_use]
pub fn sorted_headers(headers: &HeaderMap) -> Vec<(String, String)> {
    let mut sorted: Vec<(String, String)> = headers
        .keys()
        .filter(|name| **name != HOST)
        .map(|name| {
            let values: Vec<_> = headers
                .get_all(name)
                .iter()
                .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
                .collect();
            (canonical_name(name), values.join(", "))
        })
        .collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));
    sorted
}

/// Renders a header name the way it is conventionally written, with each
/// dash-separated word capitalised: `x-real-ip` becomes `X-Real-Ip`.
#[must_use]
pub fn canonical_name(name: &HeaderName) -> String {
    let mut out = String::with_capacity(name.as_str().len());
    let mut upper = true;
    for c in name.as_str().chars() {
        out.push(if upper { c.to_ascii_uppercase() } else { c });
        upper = c == '-';
    }
    out
}

fn dump_head(method: &Method, uri: &http::Uri, version: Version, headers: &HeaderMap) -> String {
    let target = uri.path_and_query().map_or("/", |pq| pq.as_str());
    let mut head = format!("{method} {target} {}\r\n", version_str(version));

    if let Some(host) = headers.get(HOST) {
        head.push_str(&format!("Host: {}\r\n", String::from_utf8_lossy(host.as_bytes())));
    }

    let mut names: Vec<&HeaderName> = headers.keys().filter(|name| **name != HOST).collect();
    names.sort_by_key(|name| name.as_str());
    for name in names {
        for value in headers.get_all(name) {
            head.push_str(&format!(
                "{}: {}\r\n",
                canonical_name(name),
                String::from_utf8_lossy(value.as_bytes())
            ));
        }
    }

    head.push_str("\r\n");
    head
}

fn version_str(version: Version) -> &'static str {
    match version {
        Version::HTTP_09 => "HTTP/0.9",
        Version::HTTP_10 => "HTTP/1.0",
        Version::HTTP_2 => "HTTP/2.0",
        Version::HTTP_3 => "HTTP/3.0",
        _ => "HTTP/1.1",
    }
}

fn executable_modified() -> std::io::Result<SystemTime> {
    std::fs::metadata(std::env::current_exe()?)?.modified()
}

/// Formats `time` in local time as `YYYY-MM-DD HH:MM:SS`.
#[must_use]
pub fn format_timestamp(time: SystemTime) -> String {
    DateTime::<Local>::from(time)
        .format(BUILD_TIME_FORMAT)
        .to_string()
}
