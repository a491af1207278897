//! Active HTTP probing for pull-model monitors.

use async_trait::async_trait;
use tokio::time::{Duration, Instant};
use upmon_common::types::{PollOutcome, ProbeConfig};

/// Executes one poll against a probe target. Trait seam so the sweep can
/// be driven by a scripted prober in tests.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn poll(&self, probe: &ProbeConfig) -> PollOutcome;
}

pub struct HttpProber {
    client: reqwest::Client,
}

impl HttpProber {
    pub fn new() -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("upmon/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Prober for HttpProber {
    async fn poll(&self, probe: &ProbeConfig) -> PollOutcome {
        let timeout = Duration::from_secs(probe.timeout_secs.max(1));
        let start = Instant::now();

        let response = match self
            .client
            .get(&probe.url)
            .timeout(timeout)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                return PollOutcome {
                    success: false,
                    status_code: None,
                    response_ms: Some(start.elapsed().as_millis() as i64),
                    error: Some(request_error(&e)),
                }
            }
        };

        let status = response.status().as_u16();
        let response_ms = start.elapsed().as_millis() as i64;

        if !status_accepted(probe, status) {
            return PollOutcome {
                success: false,
                status_code: Some(status),
                response_ms: Some(response_ms),
                error: Some(format!("unexpected status {status}")),
            };
        }

        if let Some(needle) = &probe.body_contains {
            let body = match response.text().await {
                Ok(body) => body,
                Err(e) => {
                    return PollOutcome {
                        success: false,
                        status_code: Some(status),
                        response_ms: Some(response_ms),
                        error: Some(format!("failed to read body: {e}")),
                    }
                }
            };
            if !body.contains(needle.as_str()) {
                return PollOutcome {
                    success: false,
                    status_code: Some(status),
                    response_ms: Some(response_ms),
                    error: Some(format!("body does not contain '{needle}'")),
                };
            }
        }

        PollOutcome {
            success: true,
            status_code: Some(status),
            response_ms: Some(response_ms),
            error: None,
        }
    }
}

fn status_accepted(probe: &ProbeConfig, status: u16) -> bool {
    if probe.expected_status.is_empty() {
        (200..300).contains(&status)
    } else {
        probe.expected_status.contains(&status)
    }
}

fn request_error(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        "request timed out".to_string()
    } else if e.is_connect() {
        format!("connection failed: {e}")
    } else {
        e.to_string()
    }
}
