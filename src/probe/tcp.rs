//! TCP connect probe, also used as the stand-in for ICMP.

use std::future::Future;
use std::io;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;

use super::{elapsed_ms, ProbeError, ProbeResult};

/// Synthetic status reported for a completed connect.
pub const TCP_CONNECTED_STATUS: u16 = 200;

/// Attempt one TCP connection to the address.
///
/// A completed handshake reports status 200; anything else reports status 0.
pub async fn run_tcp_probe(address: &str, timeout: Duration) -> ProbeResult {
    let start = Instant::now();

    let target = match tcp_target(address) {
        Ok(t) => t,
        Err(e) => {
            tracing::debug!("TCP probe skipped for {}: {}", address, e);
            return ProbeResult::network_error(elapsed_ms(start));
        }
    };

    connect_within(&target, timeout, start, TcpStream::connect(&target)).await
}

/// Drive a connect future under `timeout`, measuring from `start`.
async fn connect_within<F, S>(target: &str, timeout: Duration, start: Instant, connect: F) -> ProbeResult
where
    F: Future<Output = io::Result<S>>,
{
    match tokio::time::timeout(timeout, connect).await {
        Ok(Ok(_stream)) => ProbeResult::status(TCP_CONNECTED_STATUS, elapsed_ms(start)),
        Ok(Err(e)) => {
            tracing::debug!("TCP probe to {} failed: {}", target, e);
            ProbeResult::network_error(elapsed_ms(start))
        }
        Err(_) => {
            tracing::debug!("TCP probe to {} timed out after {:?}", target, timeout);
            ProbeResult::network_error(elapsed_ms(start))
        }
    }
}

/// ICMP-style reachability check.
///
/// This is a TCP connect, not an ICMP echo: hosts that answer pings but
/// have no listening port on the resolved port report down.
pub async fn run_icmp_probe(address: &str, timeout: Duration) -> ProbeResult {
    run_tcp_probe(address, timeout).await
}

/// Resolve an address to `host:port`.
///
/// Accepts URLs (`https://host/path`) and bare `host[:port]` forms. Without an
/// explicit port, `https` addresses use 443 and everything else uses 80.
pub fn tcp_target(address: &str) -> Result<String, ProbeError> {
    let address = address.trim();
    if address.is_empty() {
        return Err(ProbeError::InvalidAddress("empty address".to_string()));
    }

    if address.contains("://") {
        let url = reqwest::Url::parse(address)
            .map_err(|e| ProbeError::InvalidAddress(format!("{}: {}", address, e)))?;
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| ProbeError::InvalidAddress(format!("{}: missing host", address)))?;
        let port = url
            .port()
            .unwrap_or(if url.scheme() == "https" { 443 } else { 80 });
        return Ok(format!("{}:{}", host, port));
    }

    let authority = address
        .split(['/', '?', '#'])
        .next()
        .unwrap_or(address);
    let authority = authority.rsplit('@').next().unwrap_or(authority);

    if let Some(rest) = authority.strip_prefix('[') {
        // Bracketed IPv6, optionally followed by a port
        let (host, tail) = rest
            .split_once(']')
            .ok_or_else(|| ProbeError::InvalidAddress(format!("{}: unclosed '['", address)))?;
        let port = match tail.strip_prefix(':') {
            Some(p) => parse_port(address, p)?,
            None if tail.is_empty() => 80,
            None => return Err(ProbeError::InvalidAddress(address.to_string())),
        };
        return Ok(format!("[{}]:{}", host, port));
    }

    match authority.matches(':').count() {
        0 => Ok(format!("{}:80", authority)),
        1 => {
            let (host, port) = authority.split_once(':').unwrap_or((authority, ""));
            if host.is_empty() {
                return Err(ProbeError::InvalidAddress(format!("{}: missing host", address)));
            }
            Ok(format!("{}:{}", host, parse_port(address, port)?))
        }
        // Bare IPv6 literal without a port
        _ => Ok(format!("[{}]:80", authority)),
    }
}

fn parse_port(address: &str, port: &str) -> Result<u16, ProbeError> {
    port.parse::<u16>()
        .map_err(|_| ProbeError::InvalidAddress(format!("{}: bad port {:?}", address, port)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn test_tcp_target_defaults() {
        assert_eq!(tcp_target("https://example.com").unwrap(), "example.com:443");
        assert_eq!(tcp_target("http://example.com/status").unwrap(), "example.com:80");
        assert_eq!(tcp_target("https://example.com:8443/x").unwrap(), "example.com:8443");
        assert_eq!(tcp_target("example.com").unwrap(), "example.com:80");
        assert_eq!(tcp_target("example.com:22").unwrap(), "example.com:22");
        assert_eq!(tcp_target("10.0.0.1:5432/db").unwrap(), "10.0.0.1:5432");
        assert_eq!(tcp_target("[::1]:9000").unwrap(), "[::1]:9000");
        assert_eq!(tcp_target("::1").unwrap(), "[::1]:80");
        assert_eq!(tcp_target("https://[::1]").unwrap(), "[::1]:443");
    }

    #[test]
    fn test_tcp_target_rejects_garbage() {
        assert!(tcp_target("").is_err());
        assert!(tcp_target("example.com:http").is_err());
        assert!(tcp_target(":80").is_err());
        assert!(tcp_target("[::1").is_err());
    }

    #[tokio::test]
    async fn test_tcp_probe_connects() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((_socket, _)) = listener.accept().await {}
        });

        let result = run_tcp_probe(&addr.to_string(), Duration::from_secs(5)).await;
        assert_eq!(result.status, TCP_CONNECTED_STATUS);
        assert!(!result.network_error);

        let result = run_icmp_probe(&format!("tcp://{}", addr), Duration::from_secs(5)).await;
        assert_eq!(result.status, TCP_CONNECTED_STATUS);
    }

    #[tokio::test]
    async fn test_tcp_probe_refused() {
        // Bind then drop so the port is very likely closed
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = run_tcp_probe(&addr.to_string(), Duration::from_secs(5)).await;
        assert_eq!(result.status, 0);
        assert!(result.network_error);
    }

    #[tokio::test]
    async fn test_tcp_connect_timeout_counts_toward_latency() {
        let start = Instant::now();
        let hung = std::future::pending::<io::Result<TcpStream>>();

        let result = connect_within("10.255.255.1:81", Duration::from_millis(100), start, hung).await;
        assert_eq!(result.status, 0);
        assert!(result.network_error);
        assert!(result.latency_ms >= 100, "latency was {}ms", result.latency_ms);
    }

    #[tokio::test]
    async fn test_tcp_probe_unroutable_is_network_error() {
        // Either times out or fails fast when there is no route
        let result = run_tcp_probe("10.255.255.1:81", Duration::from_millis(100)).await;
        assert_eq!(result.status, 0);
        assert!(result.network_error);
        assert!(result.latency_ms < 5000);
    }

    #[tokio::test]
    async fn test_invalid_address_is_network_error() {
        let result = run_tcp_probe("host:notaport", Duration::from_millis(100)).await;
        assert_eq!(result, ProbeResult::network_error(result.latency_ms));
    }
}
