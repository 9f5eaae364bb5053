//! Probe module for network monitoring.
//!
//! Supports HTTP and TCP probes. The `icmp` mode is a TCP connect, not a
//! real ICMP echo, so it needs no raw-socket privileges.

mod http;
mod tcp;

pub use http::*;
pub use tcp::*;

use crate::db::ProbeMode;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Upper bound on a single attempt, including connect and response headers.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Probe error types.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("invalid address: {0}")]
    InvalidAddress(String),
    #[error("failed to build client: {0}")]
    Client(String),
}

/// Outcome of one attempt against one target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeResult {
    /// Response status, or 0 when nothing answered.
    pub status: u16,
    pub latency_ms: i64,
    pub network_error: bool,
}

impl ProbeResult {
    pub fn status(status: u16, latency_ms: i64) -> Self {
        Self {
            status,
            latency_ms: latency_ms.max(0),
            network_error: false,
        }
    }

    pub fn network_error(latency_ms: i64) -> Self {
        Self {
            status: 0,
            latency_ms: latency_ms.max(0),
            network_error: true,
        }
    }

    /// Whether anything answered, regardless of the status code.
    pub fn is_success(&self) -> bool {
        self.status > 0
    }
}

/// Performs a single reachability attempt.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, mode: ProbeMode, address: &str) -> ProbeResult;
}

/// Prober that talks to the network.
pub struct NetProber {
    client: reqwest::Client,
    timeout: Duration,
}

impl NetProber {
    pub fn new() -> Result<Self, ProbeError> {
        Self::with_timeout(PROBE_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, ProbeError> {
        Ok(Self {
            client: build_http_client(timeout)?,
            timeout,
        })
    }
}

#[async_trait]
impl Prober for NetProber {
    async fn probe(&self, mode: ProbeMode, address: &str) -> ProbeResult {
        // Add jitter to avoid thundering herd
        let jitter = rand::random::<u64>() % 100;
        tokio::time::sleep(Duration::from_millis(jitter)).await;

        match mode {
            ProbeMode::Http => run_http_probe(&self.client, address).await,
            ProbeMode::Tcp => run_tcp_probe(address, self.timeout).await,
            ProbeMode::Icmp => run_icmp_probe(address, self.timeout).await,
        }
    }
}

/// Elapsed wall-clock milliseconds since `start`.
pub(crate) fn elapsed_ms(start: std::time::Instant) -> i64 {
    i64::try_from(start.elapsed().as_millis()).unwrap_or(i64::MAX)
}
