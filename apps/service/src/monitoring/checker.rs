use anyhow::Result;
use std::time::{Duration, Instant};

use super::types::ProbeOutcome;

/// Status code a target must answer with to count as up
pub const DEFAULT_EXPECTED_STATUS: u16 = 200;

/// Probe trait for reachability checks.
///
/// Implementations never fail: every network condition is folded into a
/// down outcome.
#[async_trait::async_trait]
pub trait Probe: Send + Sync {
    async fn probe(&self, url: &str) -> ProbeOutcome;
}

/// HTTP GET probe
pub struct HttpProbe {
    client: reqwest::Client,
    expected_status: u16,
}

impl HttpProbe {
    pub fn new(timeout: Duration, expected_status: u16) -> Result<Self> {
        let client = client_builder(timeout).build()?;
        Ok(Self { client, expected_status })
    }

    /// Probe that ignores proxy environment variables
    #[cfg(test)]
    pub fn direct(timeout: Duration, expected_status: u16) -> Result<Self> {
        let client = client_builder(timeout).no_proxy().build()?;
        Ok(Self { client, expected_status })
    }
}

fn client_builder(timeout: Duration) -> reqwest::ClientBuilder {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("sitewatch/", env!("CARGO_PKG_VERSION")))
}

#[async_trait::async_trait]
impl Probe for HttpProbe {
    async fn probe(&self, url: &str) -> ProbeOutcome {
        let start = Instant::now();

        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => return ProbeOutcome::unreachable(describe_error(&e)),
        };

        let latency = start.elapsed().as_millis() as u64;
        let status_code = response.status().as_u16();

        if status_code == self.expected_status {
            ProbeOutcome::up(status_code, latency)
        } else {
            ProbeOutcome::unexpected_status(status_code, self.expected_status, latency)
        }
    }
}

fn describe_error(error: &reqwest::Error) -> String {
    if error.is_timeout() {
        format!("request timed out: {error}")
    } else if error.is_connect() {
        format!("connection failed: {error}")
    } else if error.is_builder() {
        format!("invalid request: {error}")
    } else {
        format!("HTTP request failed: {error}")
    }
}
