//! End-to-end server tests over real TCP connections.
//!
//! Each test starts a server on `127.0.0.1:0` and talks to it with a hyper
//! HTTP/1 client connection.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use http::header::{ALLOW, CACHE_CONTROL, HOST};
use http::{HeaderMap, Method, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;
use tokio::sync::Notify;

use webdiag_core::{RequestContext, RequestIdGenerator};
use webdiag_server::handler::{text_response, Request};
use webdiag_server::{
    diagnostic_router, Router, RunningServer, Server, ServerConfig, ServerError, ServerState,
    ShutdownSignal, APP_NAME, REQUEST_ID_HEADER,
};

const PREFIX: &str = "TeSt01";

struct Reply {
    status: StatusCode,
    headers: HeaderMap,
    body: String,
}

fn config(shutdown_timeout: Duration) -> ServerConfig {
    ServerConfig::builder()
        .http_addr("127.0.0.1:0")
        .shutdown_timeout(shutdown_timeout)
        .build()
}

async fn start(router: Router, shutdown_timeout: Duration) -> RunningServer {
    let ids = Arc::new(RequestIdGenerator::with_prefix(PREFIX));
    Server::new(config(shutdown_timeout), router, ids)
        .start()
        .await
        .unwrap()
}

fn request(method: Method, path: &str, body: &'static [u8]) -> http::Request<Full<Bytes>> {
    http::Request::builder()
        .method(method)
        .uri(path)
        .header(HOST, "diag.test")
        .body(Full::new(Bytes::from_static(body)))
        .unwrap()
}

async fn send(addr: SocketAddr, req: http::Request<Full<Bytes>>) -> Reply {
    let stream = TcpStream::connect(addr).await.unwrap();
    let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
        .await
        .unwrap();
    tokio::spawn(conn);

    let response = sender.send_request(req).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.into_body().collect().await.unwrap().to_bytes();

    Reply {
        status,
        headers,
        body: String::from_utf8(body.to_vec()).unwrap(),
    }
}

async fn get(addr: SocketAddr, path: &str) -> Reply {
    send(addr, request(Method::GET, path, b"")).await
}

/// Router with `/slow`, which signals `entered` and then sleeps for `delay`.
fn slow_router(entered: Arc<Notify>, delay: Duration) -> Router {
    Router::new().route("/slow", move |_: RequestContext, _: Request| {
        let entered = Arc::clone(&entered);
        async move {
            entered.notify_one();
            tokio::time::sleep(delay).await;
            text_response(StatusCode::OK, "done")
        }
    })
}

#[tokio::test]
async fn test_hello_carries_request_ids() {
    let mut server = start(diagnostic_router(APP_NAME), Duration::from_secs(1)).await;
    let addr = server.local_addr();

    let first = get(addr, "/hello").await;
    assert_eq!(first.status, StatusCode::OK);
    assert_eq!(first.body, "hello\n");
    assert_eq!(first.headers[CACHE_CONTROL], "no-cache, no-store, must-revalidate");
    assert_eq!(first.headers[REQUEST_ID_HEADER], "TeSt010000000001");

    let second = get(addr, "/hello").await;
    assert_eq!(second.headers[REQUEST_ID_HEADER], "TeSt010000000002");

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_unknown_path_is_404_with_request_id() {
    let mut server = start(diagnostic_router(APP_NAME), Duration::from_secs(1)).await;

    let reply = get(server.local_addr(), "/does-not-exist").await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
    assert_eq!(reply.body, "404 page not found\n");
    assert!(reply.headers.contains_key(REQUEST_ID_HEADER));

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_root_page() {
    let mut server = start(diagnostic_router(APP_NAME), Duration::from_secs(1)).await;

    let reply = get(server.local_addr(), "/").await;
    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply.body.contains("<title>Web Diagnostics</title>"));

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_method_guard() {
    let mut server = start(diagnostic_router(APP_NAME), Duration::from_secs(1)).await;
    let addr = server.local_addr();

    let rejected = send(addr, request(Method::POST, "/hello", b"")).await;
    assert_eq!(rejected.status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(rejected.headers[ALLOW], "GET, OPTIONS");
    assert_eq!(rejected.body, "POST Method Not Allowed\n");
    assert!(rejected.headers.contains_key(REQUEST_ID_HEADER));

    let options = send(addr, request(Method::OPTIONS, "/headers", b"")).await;
    assert_eq!(options.status, StatusCode::NO_CONTENT);
    assert_eq!(options.headers[ALLOW], "GET, OPTIONS");
    assert!(options.body.is_empty());

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_remote_reports_peer_and_proxy_headers() {
    let mut server = start(diagnostic_router(APP_NAME), Duration::from_secs(1)).await;

    let mut req = request(Method::GET, "/remote", b"");
    req.headers_mut()
        .insert("x-real-ip", "203.0.113.7".parse().unwrap());
    let reply = send(server.local_addr(), req).await;

    let mut lines = reply.body.lines();
    assert!(lines.next().unwrap().starts_with("RemoteAddr: 127.0.0.1:"));
    assert_eq!(lines.next(), Some("X-Real-Ip: 203.0.113.7"));
    assert_eq!(lines.next(), None);

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_request_dump_includes_body() {
    let mut server = start(diagnostic_router(APP_NAME), Duration::from_secs(1)).await;

    let reply = send(server.local_addr(), request(Method::POST, "/request?v=1", b"payload")).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply
        .body
        .starts_with("POST /request?v=1 HTTP/1.1\r\nHost: diag.test\r\n"));
    assert!(reply.body.contains("Content-Length: 7\r\n"));
    assert!(reply.body.ends_with("\r\n\r\npayload\n"));

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_shutdown_drains_in_flight_request() {
    let entered = Arc::new(Notify::new());
    let mut server = start(
        slow_router(Arc::clone(&entered), Duration::from_millis(300)),
        Duration::from_secs(5),
    )
    .await;
    let addr = server.local_addr();

    let in_flight = tokio::spawn(async move { get(addr, "/slow").await });
    entered.notified().await;

    let (result, ()) = tokio::join!(server.shutdown(), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(TcpStream::connect(addr).await.is_err());
    });
    result.unwrap();
    assert_eq!(server.state(), ServerState::Stopped);

    let reply = in_flight.await.unwrap();
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body, "done");
}

#[tokio::test]
async fn test_shutdown_deadline_exceeded() {
    let entered = Arc::new(Notify::new());
    let mut server = start(
        slow_router(Arc::clone(&entered), Duration::from_secs(30)),
        Duration::from_millis(200),
    )
    .await;
    let addr = server.local_addr();

    let in_flight = tokio::spawn(async move { get(addr, "/slow").await });
    entered.notified().await;

    let started = Instant::now();
    let err = server.shutdown().await.unwrap_err();

    assert!(matches!(err, ServerError::ShutdownTimeout { active: 1 }));
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(server.state(), ServerState::Stopped);

    // A second shutdown is a no-op.
    server.shutdown().await.unwrap();
    in_flight.abort();
}

#[tokio::test]
async fn test_cancel_triggers_shutdown() {
    let mut server = start(diagnostic_router(APP_NAME), Duration::from_secs(1)).await;
    let addr = server.local_addr();
    let cancel = ShutdownSignal::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.trigger();
    });

    tokio::time::timeout(Duration::from_secs(5), server.await_shutdown(&cancel))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(server.state(), ServerState::Stopped);
    assert!(TcpStream::connect(addr).await.is_err());
}

#[tokio::test]
async fn test_keep_alive_connection_closed_on_shutdown() {
    let mut server = start(diagnostic_router(APP_NAME), Duration::from_secs(5)).await;
    let addr = server.local_addr();

    let stream = TcpStream::connect(addr).await.unwrap();
    let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
        .await
        .unwrap();
    let conn = tokio::spawn(conn);

    let response = sender
        .send_request(request(Method::GET, "/hello", b""))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    response.into_body().collect().await.unwrap();

    // The idle connection must not hold shutdown up until the deadline.
    let started = Instant::now();
    server.shutdown().await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(2));

    // The server closes the idle connection, which ends the client side.
    tokio::time::timeout(Duration::from_secs(2), conn)
        .await
        .unwrap()
        .unwrap()
        .ok();
}
