use axum::http::HeaderMap;
use std::net::SocketAddr;

pub const UNKNOWN: &str = "unknown";

pub fn client_identity(headers: &HeaderMap, peer: Option<SocketAddr>, trust_forwarded: bool) -> String {
    if trust_forwarded {
        if let Some(ip) = forwarded_ip(headers) {
            return ip;
        }
    }
    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN.to_string())
}

fn forwarded_ip(headers: &HeaderMap) -> Option<String> {
    let first_hop = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    };
    first_hop("x-forwarded-for").or_else(|| first_hop("x-real-ip"))
}
