use std::net::SocketAddr;

use axum::extract::ConnectInfo;
use axum::http::{HeaderMap, Request};

/// 无法识别客户端时使用的标识
pub const UNKNOWN_CLIENT: &str = "unknown";

/// 生成限流/缓存键：`{prefix}:{client_id}`
pub fn build_key(prefix: &str, client_id: &str) -> String {
    format!("{}:{}", prefix, client_id)
}

/// 解析客户端标识
///
/// 顺序：`X-Forwarded-For` 的第一跳 → `X-Real-IP` → 连接地址 → `"unknown"`
pub fn client_id(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.split(',').map(str::trim).find(|ip| !ip.is_empty()));

    let real_ip = || {
        headers
            .get("x-real-ip")
            .and_then(|h| h.to_str().ok())
            .map(str::trim)
            .filter(|ip| !ip.is_empty())
    };

    forwarded
        .or_else(real_ip)
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

/// 从请求中解析客户端标识，连接地址来自 `ConnectInfo` 扩展
pub fn client_id_from_request<B>(req: &Request<B>) -> String {
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0);
    client_id(req.headers(), peer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn peer() -> Option<SocketAddr> {
        Some("10.1.2.3:5555".parse().unwrap())
    }

    #[test]
    fn test_build_key() {
        assert_eq!(build_key("login", "203.0.113.9"), "login:203.0.113.9");
    }

    #[test]
    fn test_forwarded_for_first_hop_wins() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", ",198.51.100.7, 10.0.0.1".parse().unwrap());
        headers.insert("x-real-ip", "192.0.2.1".parse().unwrap());

        assert_eq!(client_id(&headers, peer()), "198.51.100.7");
    }

    #[test]
    fn test_real_ip_before_peer() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", "192.0.2.1".parse().unwrap());

        assert_eq!(client_id(&headers, peer()), "192.0.2.1");
    }

    #[test]
    fn test_peer_then_unknown() {
        let headers = HeaderMap::new();
        assert_eq!(client_id(&headers, peer()), "10.1.2.3");
        assert_eq!(client_id(&headers, None), UNKNOWN_CLIENT);
    }

    #[test]
    fn test_client_id_from_request_uses_connect_info() {
        let mut req = Request::builder().uri("/").body(Body::empty()).unwrap();
        req.extensions_mut().insert(ConnectInfo(peer().unwrap()));

        assert_eq!(client_id_from_request(&req), "10.1.2.3");
    }
}
