//! Client identification utilities
//!
//! Resolving the originating client address behind reverse proxies.

use axum::http::HeaderMap;
use std::net::IpAddr;

const X_FORWARDED_FOR: &str = "x-forwarded-for";
const X_REAL_IP: &str = "x-real-ip";

/// Extract the client IP address
///
/// With `trust_forwarded` set, checks the first `X-Forwarded-For` entry, then
/// `X-Real-IP`, and falls back to the socket peer address. Without it the
/// headers are ignored: any client can write them, so only a proxy that
/// overwrites them makes them meaningful.
pub fn client_ip(headers: &HeaderMap, peer: IpAddr, trust_forwarded: bool) -> IpAddr {
    if !trust_forwarded {
        return peer;
    }
    forwarded_ip(headers).unwrap_or(peer)
}

fn forwarded_ip(headers: &HeaderMap) -> Option<IpAddr> {
    let first_forwarded = headers
        .get(X_FORWARDED_FOR)
        .and_then(|v| v.to_str().ok())
        .and_then(|xff| xff.split(',').next())
        .and_then(|ip| ip.trim().parse::<IpAddr>().ok());

    first_forwarded.or_else(|| {
        headers
            .get(X_REAL_IP)
            .and_then(|v| v.to_str().ok())
            .and_then(|ip| ip.trim().parse::<IpAddr>().ok())
    })
}
