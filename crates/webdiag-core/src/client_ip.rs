//! Client IP resolution.
//!
//! The client address recorded in request logs comes from the
//! [`REAL_IP_HEADER`] when a reverse proxy sets it, and from the transport
//! peer address otherwise.
//!
//! The header value is used verbatim and is not validated. Any client can
//! set it, so the logged address is only trustworthy when the server runs
//! behind a reverse proxy that overwrites the header.

use http::HeaderMap;

/// Header a trusted reverse proxy uses to pass on the original client IP.
pub const REAL_IP_HEADER: &str = "x-real-ip";

/// Returns the client address for a request.
///
/// Prefers a non-empty [`REAL_IP_HEADER`]; otherwise returns `remote_addr`
/// unchanged (typically `ip:port`). A header that is not valid visible
/// ASCII counts as absent.
///
/// # Example
///
/// ```
/// use http::HeaderMap;
/// use webdiag_core::client_ip;
///
/// let mut headers = HeaderMap::new();
/// assert_eq!(client_ip(&headers, "10.0.0.1:5555"), "10.0.0.1:5555");
///
/// headers.insert("x-real-ip", "203.0.113.7".parse().unwrap());
/// assert_eq!(client_ip(&headers, "10.0.0.1:5555"), "203.0.113.7");
/// ```
#[must_use]
pub fn client_ip(headers: &HeaderMap, remote_addr: &str) -> String {
    headers
        .get(REAL_IP_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .unwrap_or(remote_addr)
        .to_owned()
}
