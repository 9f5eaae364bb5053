//! HTTP probe implementation.

use std::time::{Duration, Instant};

use super::{elapsed_ms, ProbeError, ProbeResult};

/// Build the client shared by every HTTP attempt.
pub fn build_http_client(timeout: Duration) -> Result<reqwest::Client, ProbeError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ProbeError::Client(e.to_string()))
}

/// Issue one GET against the given address.
///
/// Any transport failure (DNS, connect, TLS, timeout) yields status 0.
pub async fn run_http_probe(client: &reqwest::Client, address: &str) -> ProbeResult {
    let url = if address.starts_with("http://") || address.starts_with("https://") {
        address.to_string()
    } else {
        format!("http://{}", address)
    };

    let start = Instant::now();

    match client.get(&url).send().await {
        Ok(response) => ProbeResult::status(response.status().as_u16(), elapsed_ms(start)),
        Err(e) => {
            tracing::debug!("HTTP probe to {} failed: {}", url, e);
            ProbeResult::network_error(elapsed_ms(start))
        }
    }
}
