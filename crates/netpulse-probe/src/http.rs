use std::time::Instant;

use async_trait::async_trait;
use netpulse_types::{config::ProbeConfig, query::HistoryWindow, Result};
use reqwest::Client;
use serde_json::Value;
use tokio::time::Duration;
use tracing::debug;

use crate::{probe_error, LiveSource, MetricsRecorder, ProbeMetrics};

/// JSON-over-HTTP probe service client.
///
/// Expects `GET {endpoint}/metrics?interface=..` and
/// `GET {endpoint}/history?interface=..&hours=..&interval=..`.
pub struct HttpProbe {
    client: Client,
    base_url: String,
    metrics: MetricsRecorder,
}

impl HttpProbe {
    pub fn new(config: &ProbeConfig) -> Result<Self> {
        let endpoint = config
            .endpoint
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .ok_or_else(|| probe_error("probe.endpoint is not configured"))?;
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|err| probe_error(format!("failed to build HTTP client: {err}")))?;
        Ok(Self {
            client,
            base_url: endpoint.trim_end_matches('/').to_string(),
            metrics: MetricsRecorder::default(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json(&self, path: &str, query: &[(&str, String)]) -> Result<Value> {
        let url = format!("{}/{}", self.base_url, path);
        let start = Instant::now();
        let outcome = self.send(&url, query).await;
        match &outcome {
            Ok(_) => self.metrics.record_success(start),
            Err(err) => {
                debug!(url = %url, error = %err, "probe request failed");
                self.metrics.record_failure();
            }
        }
        outcome
    }

    async fn send(&self, url: &str, query: &[(&str, String)]) -> Result<Value> {
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|err| probe_error(format!("request to {url} failed: {err}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(probe_error(format!("{url} answered {status}")));
        }
        response
            .json::<Value>()
            .await
            .map_err(|err| probe_error(format!("invalid JSON from {url}: {err}")))
    }
}

#[async_trait]
impl LiveSource for HttpProbe {
    fn name(&self) -> &str {
        "http"
    }

    async fn fetch_metrics(&self, interface: &str) -> Result<Value> {
        self.get_json("metrics", &[("interface", interface.to_string())])
            .await
    }

    async fn fetch_history(&self, interface: &str, window: HistoryWindow) -> Result<Value> {
        self.get_json(
            "history",
            &[
                ("interface", interface.to_string()),
                ("hours", window.span_hours().to_string()),
                ("interval", window.interval_hours.to_string()),
            ],
        )
        .await
    }

    fn metrics(&self) -> ProbeMetrics {
        self.metrics.snapshot()
    }
}
