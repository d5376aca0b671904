//! Client identity resolution.

use std::net::SocketAddr;

use axum::http::HeaderMap;

/// Header set by reverse proxies with the original client chain.
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";
/// Header set by nginx-style proxies with the original client address.
pub const REAL_IP_HEADER: &str = "x-real-ip";
/// Identity used when nothing else identifies the caller.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// The identity attempts are counted against.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(String);

impl ClientId {
    /// Create a client identity from a raw value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Resolve the client identity for a request.
    ///
    /// The first non-empty value wins, in order: the first entry of
    /// `X-Forwarded-For`, `X-Real-IP`, the peer address of the connection,
    /// and finally the literal `"unknown"`.
    pub fn resolve(headers: &HeaderMap, remote_addr: Option<SocketAddr>) -> Self {
        if let Some(first) = header_str(headers, FORWARDED_FOR_HEADER)
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|value| !value.is_empty())
        {
            return Self::new(first);
        }

        if let Some(real_ip) = header_str(headers, REAL_IP_HEADER)
            .map(str::trim)
            .filter(|value| !value.is_empty())
        {
            return Self::new(real_ip);
        }

        match remote_addr {
            Some(addr) => Self::new(addr.ip().to_string()),
            None => Self::new(UNKNOWN_CLIENT),
        }
    }

    /// The identity as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}
