//! Client IP extraction from proxy headers
//!
//! - `none`: the socket peer address only
//! - `standard`: X-Forwarded-For, then Proxy-Client-IP, then WL-Proxy-Client-IP
//! - `cloudflare`: CF-Connecting-IP
//!
//! Anything unparseable, empty or `unknown` is skipped, and the socket
//! address is the final fallback.

use axum::http::HeaderMap;
use std::net::IpAddr;
use tracing::warn;

use crate::config::{ClientIpConfig, TrustedProxyMode};

pub fn extract_client_ip(headers: &HeaderMap, socket_addr: IpAddr, config: &ClientIpConfig) -> IpAddr {
    match config.mode {
        TrustedProxyMode::Cloudflare => header_ip(headers, "cf-connecting-ip").unwrap_or_else(|| {
            warn!("CF-Connecting-IP header missing in Cloudflare mode, using socket address");
            socket_addr
        }),
        TrustedProxyMode::Standard => extract_from_x_forwarded_for(headers, config)
            .or_else(|| header_ip(headers, "proxy-client-ip"))
            .or_else(|| header_ip(headers, "wl-proxy-client-ip"))
            .unwrap_or(socket_addr),
        TrustedProxyMode::None => socket_addr,
    }
}

fn parse_candidate(value: &str) -> Option<IpAddr> {
    let value = value.trim();
    if value.is_empty() || value.eq_ignore_ascii_case("unknown") {
        return None;
    }
    value.parse().ok()
}

fn header_ip(headers: &HeaderMap, name: &str) -> Option<IpAddr> {
    headers
        .get(name)
        .and_then(|h| h.to_str().ok())
        .and_then(parse_candidate)
}

/// Without trusted proxies the leftmost entry is the client. With a trusted
/// CIDR list the chain is walked right to left and the first address outside
/// every trusted network wins.
fn extract_from_x_forwarded_for(headers: &HeaderMap, config: &ClientIpConfig) -> Option<IpAddr> {
    let xff = headers.get("x-forwarded-for")?.to_str().ok()?;

    let chain: Vec<IpAddr> = xff.split(',').filter_map(parse_candidate).collect();

    if config.trusted_proxies.is_empty() {
        return chain.first().copied();
    }

    chain
        .iter()
        .rev()
        .find(|ip| !config.trusted_proxies.iter().any(|net| net.contains(*ip)))
        .or_else(|| chain.first())
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn config(mode: TrustedProxyMode, trusted: &[&str]) -> ClientIpConfig {
        ClientIpConfig {
            mode,
            trusted_proxies: trusted.iter().map(|c| c.parse().unwrap()).collect(),
        }
    }

    fn socket() -> IpAddr {
        "192.168.1.1".parse().unwrap()
    }

    #[test]
    fn test_none_mode_ignores_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.1"));

        let ip = extract_client_ip(&headers, socket(), &config(TrustedProxyMode::None, &[]));
        assert_eq!(ip, socket());
    }

    #[test]
    fn test_leftmost_forwarded_entry_without_trusted_proxies() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("unknown, 203.0.113.1, 198.51.100.1"),
        );

        let ip = extract_client_ip(&headers, socket(), &config(TrustedProxyMode::Standard, &[]));
        assert_eq!(ip, "203.0.113.1".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_trusted_chain_is_walked_from_the_right() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("1.2.3.4, 203.0.113.7, 10.0.0.2, 10.0.0.1"),
        );

        let ip = extract_client_ip(
            &headers,
            socket(),
            &config(TrustedProxyMode::Standard, &["10.0.0.0/8"]),
        );
        assert_eq!(ip, "203.0.113.7".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_proxy_client_ip_fallbacks() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("unknown"));
        headers.insert("proxy-client-ip", HeaderValue::from_static(""));
        headers.insert("wl-proxy-client-ip", HeaderValue::from_static("2001:db8::1"));

        let ip = extract_client_ip(&headers, socket(), &config(TrustedProxyMode::Standard, &[]));
        assert_eq!(ip, "2001:db8::1".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_cloudflare_header_and_fallback() {
        let cf = config(TrustedProxyMode::Cloudflare, &[]);
        assert_eq!(extract_client_ip(&HeaderMap::new(), socket(), &cf), socket());

        let mut headers = HeaderMap::new();
        headers.insert("cf-connecting-ip", HeaderValue::from_static("203.0.113.9"));
        assert_eq!(
            extract_client_ip(&headers, socket(), &cf),
            "203.0.113.9".parse::<IpAddr>().unwrap()
        );
    }
}
