//! Live probe/capture source abstraction layer.

mod http;

use std::{
    sync::{Arc, Mutex},
    time::Instant,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use netpulse_types::{query::HistoryWindow, NetpulseError, Result};
use serde_json::Value;
use tokio::time::{sleep, Duration};
use tracing::info;

pub use http::HttpProbe;

/// Aggregated live source counters.
#[derive(Debug, Default, Clone)]
pub struct ProbeMetrics {
    pub successful_fetches: u64,
    pub failed_fetches: u64,
    pub last_latency_ms: Option<u64>,
    pub last_success_at: Option<DateTime<Utc>>,
}

/// Upstream supplying raw readings for a named interface. Payloads are
/// returned untouched; shaping them is the normalizer's job.
#[async_trait]
pub trait LiveSource: Send + Sync {
    fn name(&self) -> &str;
    async fn fetch_metrics(&self, interface: &str) -> Result<Value>;
    async fn fetch_history(&self, interface: &str, window: HistoryWindow) -> Result<Value> {
        let _ = (interface, window);
        Err(probe_error(format!("{} does not serve history", self.name())))
    }
    fn metrics(&self) -> ProbeMetrics;
}

#[async_trait]
impl LiveSource for Box<dyn LiveSource> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn fetch_metrics(&self, interface: &str) -> Result<Value> {
        (**self).fetch_metrics(interface).await
    }

    async fn fetch_history(&self, interface: &str, window: HistoryWindow) -> Result<Value> {
        (**self).fetch_history(interface, window).await
    }

    fn metrics(&self) -> ProbeMetrics {
        (**self).metrics()
    }
}

/// Shared counter bookkeeping for source implementations.
#[derive(Clone, Default)]
pub(crate) struct MetricsRecorder {
    inner: Arc<Mutex<ProbeMetrics>>,
}

impl MetricsRecorder {
    pub(crate) fn record_success(&self, start: Instant) {
        if let Ok(mut guard) = self.inner.lock() {
            guard.successful_fetches += 1;
            guard.last_latency_ms = Some(start.elapsed().as_millis() as u64);
            guard.last_success_at = Some(Utc::now());
        }
    }

    pub(crate) fn record_failure(&self) {
        if let Ok(mut guard) = self.inner.lock() {
            guard.failed_fetches += 1;
        }
    }

    pub(crate) fn snapshot(&self) -> ProbeMetrics {
        self.inner.lock().map(|m| m.clone()).unwrap_or_default()
    }
}

/// Stand-in used when no probe endpoint is configured: every call fails, so
/// the orchestrator always degrades to its lower tiers.
#[derive(Default)]
pub struct UnavailableSource {
    metrics: MetricsRecorder,
}

impl UnavailableSource {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LiveSource for UnavailableSource {
    fn name(&self) -> &str {
        "unavailable"
    }

    async fn fetch_metrics(&self, interface: &str) -> Result<Value> {
        self.metrics.record_failure();
        Err(probe_error(format!(
            "no live source configured for interface {interface}"
        )))
    }

    async fn fetch_history(&self, interface: &str, _window: HistoryWindow) -> Result<Value> {
        self.metrics.record_failure();
        Err(probe_error(format!(
            "no live source configured for interface {interface}"
        )))
    }

    fn metrics(&self) -> ProbeMetrics {
        self.metrics.snapshot()
    }
}

#[derive(Debug, Clone)]
pub enum StaticBehavior {
    Respond(Value),
    Fail(String),
    /// Never completes; exercises caller timeouts.
    Hang,
}

/// Scripted source for integration and testing.
pub struct StaticSource {
    behavior: StaticBehavior,
    history: Option<Value>,
    delay: Duration,
    metrics: MetricsRecorder,
}

impl StaticSource {
    pub fn new(behavior: StaticBehavior) -> Self {
        Self {
            behavior,
            history: None,
            delay: Duration::ZERO,
            metrics: MetricsRecorder::default(),
        }
    }

    pub fn responding(payload: Value) -> Self {
        Self::new(StaticBehavior::Respond(payload))
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self::new(StaticBehavior::Fail(message.into()))
    }

    pub fn hanging() -> Self {
        Self::new(StaticBehavior::Hang)
    }

    pub fn with_history(mut self, payload: Value) -> Self {
        self.history = Some(payload);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    async fn respond(&self, payload: Option<&Value>) -> Result<Value> {
        let start = Instant::now();
        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }
        let outcome = match (&self.behavior, payload) {
            (StaticBehavior::Hang, _) => std::future::pending::<Result<Value>>().await,
            (StaticBehavior::Fail(message), _) => Err(probe_error(message.clone())),
            (StaticBehavior::Respond(_), Some(payload)) => Ok(payload.clone()),
            (StaticBehavior::Respond(_), None) => Err(probe_error("no payload scripted")),
        };
        match &outcome {
            Ok(_) => self.metrics.record_success(start),
            Err(_) => self.metrics.record_failure(),
        }
        outcome
    }
}

#[async_trait]
impl LiveSource for StaticSource {
    fn name(&self) -> &str {
        "static"
    }

    async fn fetch_metrics(&self, interface: &str) -> Result<Value> {
        info!(interface, "static source fetch");
        let payload = match &self.behavior {
            StaticBehavior::Respond(value) => Some(value),
            _ => None,
        };
        self.respond(payload).await
    }

    async fn fetch_history(&self, interface: &str, window: HistoryWindow) -> Result<Value> {
        info!(interface, points = window.points, "static source history fetch");
        self.respond(self.history.as_ref()).await
    }

    fn metrics(&self) -> ProbeMetrics {
        self.metrics.snapshot()
    }
}

/// Generate an error aligned with live source semantics.
pub fn probe_error(message: impl Into<String>) -> NetpulseError {
    NetpulseError::Probe(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn unavailable_source_always_fails() {
        let source = UnavailableSource::new();
        assert!(source.fetch_metrics("eth0").await.is_err());
        assert!(source
            .fetch_history("eth0", HistoryWindow::hours(3))
            .await
            .is_err());
        assert_eq!(source.metrics().failed_fetches, 2);
    }

    #[tokio::test]
    async fn static_source_replays_payloads() {
        let source = StaticSource::responding(json!({"latency": 20}))
            .with_history(json!([{"latency": 21}]));
        assert_eq!(source.fetch_metrics("eth0").await.unwrap(), json!({"latency": 20}));
        assert_eq!(
            source
                .fetch_history("eth0", HistoryWindow::hours(1))
                .await
                .unwrap(),
            json!([{"latency": 21}])
        );
        let metrics = source.metrics();
        assert_eq!(metrics.successful_fetches, 2);
        assert!(metrics.last_success_at.is_some());
    }

    #[tokio::test]
    async fn static_source_without_history_fails_history() {
        let source = StaticSource::responding(json!({"latency": 20}));
        assert!(source
            .fetch_history("eth0", HistoryWindow::hours(1))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn hanging_source_can_be_timed_out() {
        let source = StaticSource::hanging();
        let result =
            tokio::time::timeout(Duration::from_millis(20), source.fetch_metrics("eth0")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn boxed_sources_delegate() {
        let source: Box<dyn LiveSource> = Box::new(StaticSource::failing("boom"));
        let err = source.fetch_metrics("eth0").await.unwrap_err();
        assert!(err.to_string().contains("boom"));
        assert_eq!(source.name(), "static");
    }
}
