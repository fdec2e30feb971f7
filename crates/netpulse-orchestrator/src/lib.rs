//! Fallback orchestration across the live, cache and synthetic tiers.
//!
//! Read operations never fail: each environmental problem (live source down
//! or slow, store unreadable, empty data) drops the request to the next tier
//! and the synthetic tier always answers. Only caller mistakes surface as
//! [`netpulse_types::NetpulseError::Validation`].

mod cache;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use netpulse_network::RealtimeServer;
use netpulse_normalize::{MetricsNormalizer, UpstreamShape};
use netpulse_ops::{store_error, MetricsStore};
use netpulse_patterns::HistorySynthesizer;
use netpulse_probe::LiveSource;
use netpulse_types::{
    config::{HistoryConfig, NetpulseConfig},
    events::{LifecyclePhase, SystemEvent},
    metrics::{
        HealthThresholds, InterfaceHistory, LogEntry, MetricKind, MetricSeries, MetricSnapshot,
        MetricSource, MetricSummary, NetworkHealth, SeriesOrder, TimeSeriesPoint,
    },
    query::{normalize_interface, HistoryQuery, HistoryRequest, HistoryWindow},
    validation_error, Result,
};
use serde_json::Value;
use tokio::time::{timeout, Duration};
use tracing::{debug, info, warn};

pub use cache::SnapshotCache;

/// Per-call knobs for [`FallbackOrchestrator::get_metrics`].
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsOptions {
    /// Go straight to the cache tier.
    pub skip_live: bool,
    /// Overrides the configured live source timeout.
    pub live_timeout: Option<Duration>,
}

pub struct FallbackOrchestrator<L, S, N>
where
    L: LiveSource,
    S: MetricsStore,
    N: RealtimeServer,
{
    live: L,
    store: S,
    network: N,
    cache: SnapshotCache,
    synthesizer: HistorySynthesizer,
    normalizer: MetricsNormalizer,
    live_timeout: Duration,
    store_timeout: Duration,
    history: HistoryConfig,
    thresholds: HealthThresholds,
}

impl<L, S, N> FallbackOrchestrator<L, S, N>
where
    L: LiveSource,
    S: MetricsStore,
    N: RealtimeServer,
{
    pub fn new(
        config: &NetpulseConfig,
        live: L,
        store: S,
        network: N,
        synthesizer: HistorySynthesizer,
    ) -> Self {
        Self {
            live,
            store,
            network,
            cache: SnapshotCache::from_config(&config.cache),
            synthesizer,
            normalizer: MetricsNormalizer::new(),
            live_timeout: Duration::from_millis(config.probe.timeout_ms),
            store_timeout: Duration::from_millis(config.store.timeout_ms),
            history: config.history.clone(),
            thresholds: config.health,
        }
    }

    pub fn network(&self) -> &N {
        &self.network
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn live(&self) -> &L {
        &self.live
    }

    pub fn cache(&self) -> &SnapshotCache {
        &self.cache
    }

    pub fn history_config(&self) -> &HistoryConfig {
        &self.history
    }

    pub async fn boot(&self) -> Result<()> {
        self.network.run().await?;
        info!(live = self.live.name(), "fallback orchestrator ready");
        self.publish(SystemEvent::lifecycle(
            LifecyclePhase::Boot,
            "orchestrator boot complete",
        ))
        .await;
        Ok(())
    }

    /// Announces that the API is accepting requests.
    pub async fn ready(&self, details: impl Into<String>) {
        self.publish(SystemEvent::lifecycle(LifecyclePhase::Ready, details)).await;
    }

    pub async fn shutdown(&self) {
        info!("fallback orchestrator shutting down");
        self.publish(SystemEvent::lifecycle(
            LifecyclePhase::Shutdown,
            "orchestrator stopped",
        ))
        .await;
    }

    /// Current reading for `interface`, from the best tier that answers.
    pub async fn get_metrics(&self, interface: &str, options: MetricsOptions) -> MetricSnapshot {
        let interface = normalize_interface(Some(interface));
        let mut reasons = Vec::new();

        if !options.skip_live {
            let limit = options.live_timeout.unwrap_or(self.live_timeout);
            match self.fetch_live_snapshot(&interface, limit).await {
                Ok(snapshot) => {
                    self.cache.set(interface.clone(), snapshot.clone());
                    self.publish(SystemEvent::metrics(snapshot.clone(), false)).await;
                    return snapshot;
                }
                Err(reason) => reasons.push(reason),
            }
        }

        let snapshot = match self.cached_snapshot(&interface, &mut reasons).await {
            Some(snapshot) => snapshot,
            None => self.synthesizer.snapshot(&interface, Utc::now()),
        };
        self.report_fallback(&interface, snapshot.source, reasons).await;
        self.publish(SystemEvent::metrics(snapshot.clone(), false)).await;
        snapshot
    }

    /// Validates `request` and serves the history it names. `prefer_days`
    /// selects the multi-day default when no span is given.
    pub async fn history_for(
        &self,
        request: &HistoryRequest,
        prefer_days: bool,
    ) -> Result<InterfaceHistory> {
        let query = request.validate(&self.history, prefer_days)?;
        Ok(self.get_history(&query).await)
    }

    /// Series per metric for the query window, ascending by timestamp.
    pub async fn get_history(&self, query: &HistoryQuery) -> InterfaceHistory {
        let now = Utc::now();
        let interface = normalize_interface(Some(&query.interface));
        let window = query.window;
        let mut reasons = Vec::new();

        let mut history = match self.fetch_live_history(&interface, window, now).await {
            Ok(history) => history,
            Err(reason) => {
                reasons.push(reason);
                match self.logged_history(&interface, window, now, &mut reasons).await {
                    Some(history) => history,
                    None => self.synthesizer.synthesize_interface(&interface, window, now),
                }
            }
        };
        if !reasons.is_empty() {
            self.report_fallback(&interface, history.source, reasons).await;
        }
        if let Some(metric) = query.metric {
            history.series.retain(|kind, _| *kind == metric);
        }
        history
    }

    /// Stores a submitted reading and makes it the interface's latest value.
    pub async fn record_metrics(&self, snapshot: MetricSnapshot) -> Result<LogEntry> {
        let mut snapshot = snapshot;
        snapshot.interface = normalize_interface(Some(&snapshot.interface));
        snapshot.validate()?;
        let entry = match self.append_store(snapshot).await {
            Ok(entry) => entry,
            Err(err) => {
                warn!(error = %err, "failed to append to metrics log");
                self.publish(SystemEvent::ops(
                    format!("metrics log write failed: {err}"),
                    vec!["store".into()],
                ))
                .await;
                return Err(err);
            }
        };
        let cutoff = Utc::now() - self.store.retention();
        if entry.snapshot.timestamp >= cutoff {
            self.cache
                .set_if_newer(entry.snapshot.interface.clone(), entry.snapshot.clone());
        }
        debug!(interface = %entry.snapshot.interface, "metrics recorded");
        self.publish(SystemEvent::metrics(entry.snapshot.clone(), true)).await;
        Ok(entry)
    }

    /// Records a raw upstream payload after normalizing it.
    pub async fn record_payload(&self, raw: &Value, interface_hint: Option<&str>) -> Result<LogEntry> {
        if !self.normalizer.is_meaningful(raw) {
            return Err(validation_error(
                "payload carries no latency, packet loss or throughput fields",
            ));
        }
        self.normalizer.check_ranges(raw)?;
        let hint = normalize_interface(interface_hint);
        let normalized =
            self.normalizer
                .normalize_detailed(raw, UpstreamShape::Auto, Some(&hint), Utc::now());
        debug!(shape = ?normalized.shape, interface = %hint, "recording upstream payload");
        self.record_metrics(normalized.snapshot).await
    }

    /// Averages and health verdict over the last `window`.
    pub async fn summary(&self, interface: &str, window: HistoryWindow) -> MetricSummary {
        let interface = normalize_interface(Some(interface));
        let now = Utc::now();
        let mut snapshots: Vec<MetricSnapshot> = match self
            .query_store(Some(&interface), Some(window.start(now)))
            .await
        {
            Ok(entries) if !entries.is_empty() => entries
                .into_iter()
                .map(|entry| entry.snapshot.with_source(MetricSource::Cache))
                .collect(),
            Ok(_) => self.synthesizer.recent_activity(&interface, window.points, now),
            Err(err) => {
                warn!(interface = %interface, error = %err, "store unavailable for summary");
                self.synthesizer.recent_activity(&interface, window.points, now)
            }
        };
        if snapshots.is_empty() {
            snapshots.push(self.synthesizer.snapshot(&interface, now));
        }
        MetricSummary::from_snapshots(interface.clone(), &snapshots, &self.thresholds)
            .unwrap_or_else(|| MetricSummary {
                interface,
                samples: 0,
                source: MetricSource::Synthetic,
                metrics: BTreeMap::new(),
                health: NetworkHealth::Good,
            })
    }

    /// Newest-first readings for an activity feed.
    pub async fn recent_activity(&self, interface: &str, count: u32) -> Vec<MetricSnapshot> {
        let interface = normalize_interface(Some(interface));
        match self.query_store(Some(&interface), None).await {
            Ok(entries) if !entries.is_empty() => entries
                .into_iter()
                .take(count as usize)
                .map(|entry| entry.snapshot.with_source(MetricSource::Cache))
                .collect(),
            Ok(_) => self.synthesizer.recent_activity(&interface, count, Utc::now()),
            Err(err) => {
                warn!(interface = %interface, error = %err, "store unavailable for activity feed");
                self.synthesizer.recent_activity(&interface, count, Utc::now())
            }
        }
    }

    /// Store read bounded by the store timeout; a stall counts as a failure.
    async fn query_store(
        &self,
        interface: Option<&str>,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<LogEntry>> {
        match timeout(self.store_timeout, self.store.query(interface, since)).await {
            Ok(result) => result,
            Err(_) => Err(store_error(format!(
                "metrics log read timed out after {}ms",
                self.store_timeout.as_millis()
            ))),
        }
    }

    async fn append_store(&self, snapshot: MetricSnapshot) -> Result<LogEntry> {
        match timeout(self.store_timeout, self.store.append(snapshot)).await {
            Ok(result) => result,
            Err(_) => Err(store_error(format!(
                "metrics log write timed out after {}ms",
                self.store_timeout.as_millis()
            ))),
        }
    }

    async fn fetch_live_snapshot(&self, interface: &str, limit: Duration) -> Result<MetricSnapshot, String> {
        let raw = match timeout(limit, self.live.fetch_metrics(interface)).await {
            Ok(Ok(raw)) => raw,
            Ok(Err(err)) => return Err(format!("live source failed: {err}")),
            Err(_) => return Err(format!("live source timed out after {}ms", limit.as_millis())),
        };
        if !self.normalizer.is_meaningful(&raw) {
            return Err("live source returned no usable metrics".into());
        }
        let normalized =
            self.normalizer
                .normalize_detailed(&raw, UpstreamShape::Auto, Some(interface), Utc::now());
        debug!(shape = ?normalized.shape, interface, "live reading normalized");
        Ok(normalized.snapshot.with_source(MetricSource::Live))
    }

    async fn cached_snapshot(&self, interface: &str, reasons: &mut Vec<String>) -> Option<MetricSnapshot> {
        if let Some(snapshot) = self.cache.get(interface) {
            return Some(snapshot.with_source(MetricSource::Cache));
        }
        let since = Utc::now() - self.store.retention();
        match self.query_store(Some(interface), Some(since)).await {
            Ok(entries) => match entries.into_iter().next() {
                Some(entry) => Some(entry.snapshot.with_source(MetricSource::Cache)),
                None => {
                    reasons.push("metrics log has no entries".into());
                    None
                }
            },
            Err(err) => {
                reasons.push(format!("metrics log unavailable: {err}"));
                None
            }
        }
    }

    async fn fetch_live_history(
        &self,
        interface: &str,
        window: HistoryWindow,
        now: DateTime<Utc>,
    ) -> Result<InterfaceHistory, String> {
        let raw = match timeout(self.live_timeout, self.live.fetch_history(interface, window)).await {
            Ok(Ok(raw)) => raw,
            Ok(Err(err)) => return Err(format!("live history failed: {err}")),
            Err(_) => {
                return Err(format!(
                    "live history timed out after {}ms",
                    self.live_timeout.as_millis()
                ))
            }
        };
        let start = window.start(now);
        let snapshots: Vec<MetricSnapshot> = self
            .normalizer
            .normalize_many(&raw, UpstreamShape::Auto, interface)
            .into_iter()
            .filter(|snapshot| snapshot.timestamp >= start)
            .collect();
        if snapshots.is_empty() {
            return Err("live history returned no usable points".into());
        }
        Ok(history_from_snapshots(interface, MetricSource::Live, &snapshots))
    }

    async fn logged_history(
        &self,
        interface: &str,
        window: HistoryWindow,
        now: DateTime<Utc>,
        reasons: &mut Vec<String>,
    ) -> Option<InterfaceHistory> {
        match self.query_store(Some(interface), Some(window.start(now))).await {
            Ok(entries) if !entries.is_empty() => {
                let snapshots: Vec<MetricSnapshot> =
                    entries.into_iter().map(|entry| entry.snapshot).collect();
                Some(history_from_snapshots(interface, MetricSource::Cache, &snapshots))
            }
            Ok(_) => {
                reasons.push("metrics log has no entries in window".into());
                None
            }
            Err(err) => {
                reasons.push(format!("metrics log unavailable: {err}"));
                None
            }
        }
    }

    async fn report_fallback(&self, interface: &str, served_by: MetricSource, reasons: Vec<String>) {
        warn!(
            interface,
            tier = %served_by,
            reasons = ?reasons,
            "degraded below live tier"
        );
        self.publish(SystemEvent::fallback(interface, served_by, reasons)).await;
    }

    async fn publish(&self, event: SystemEvent) {
        if let Err(err) = self.network.publish(event).await {
            warn!(error = %err, "failed to publish realtime event");
        }
    }
}

fn history_from_snapshots(
    interface: &str,
    source: MetricSource,
    snapshots: &[MetricSnapshot],
) -> InterfaceHistory {
    let series: BTreeMap<MetricKind, MetricSeries> = MetricKind::ALL
        .into_iter()
        .map(|kind| {
            let mut series: MetricSeries = snapshots
                .iter()
                .map(|s| TimeSeriesPoint::new(s.timestamp, s.value(kind)))
                .collect();
            series.sort(SeriesOrder::Ascending);
            (kind, series)
        })
        .collect();
    InterfaceHistory {
        interface: interface.to_string(),
        source,
        series,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    };

    use async_trait::async_trait;
    use futures::StreamExt;
    use netpulse_network::LocalServer;
    use netpulse_ops::MetricsLog;
    use netpulse_patterns::{PatternGenerator, PACKET_LOSS_CEILING_PCT};
    use netpulse_probe::{probe_error, ProbeMetrics, StaticSource, UnavailableSource};
    use netpulse_types::events::EventPayload;
    use serde_json::json;

    fn config() -> NetpulseConfig {
        let mut config = NetpulseConfig::default();
        config.probe.timeout_ms = 200;
        config.store.timeout_ms = 100;
        config
    }

    fn orchestrator<L: LiveSource>(live: L) -> FallbackOrchestrator<L, MetricsLog, LocalServer> {
        orchestrator_with_store(live, MetricsLog::default())
    }

    fn orchestrator_with_store<L: LiveSource, S: MetricsStore>(
        live: L,
        store: S,
    ) -> FallbackOrchestrator<L, S, LocalServer> {
        FallbackOrchestrator::new(
            &config(),
            live,
            store,
            LocalServer::new(32),
            HistorySynthesizer::new(PatternGenerator::deterministic()),
        )
    }

    fn reading(interface: &str, latency: f64) -> MetricSnapshot {
        let mut snapshot = MetricSnapshot::empty(interface, MetricSource::Live, Utc::now());
        snapshot.latency_ms = latency;
        snapshot.packet_loss_pct = 0.2;
        snapshot.download_mbps = 75.0;
        snapshot.upload_mbps = 15.0;
        snapshot
    }

    /// Live source that can be switched off mid-test.
    struct SwitchableSource {
        online: AtomicBool,
    }

    #[async_trait]
    impl LiveSource for SwitchableSource {
        fn name(&self) -> &str {
            "switchable"
        }

        async fn fetch_metrics(&self, _interface: &str) -> Result<Value> {
            if self.online.load(Ordering::SeqCst) {
                Ok(json!({"latency": 11.0, "packetLoss": 0.1, "download": 95.0, "upload": 22.0}))
            } else {
                Err(probe_error("offline"))
            }
        }

        fn metrics(&self) -> ProbeMetrics {
            ProbeMetrics::default()
        }
    }

    /// Store whose every operation fails.
    struct BrokenStore;

    #[async_trait]
    impl MetricsStore for BrokenStore {
        async fn append(&self, _snapshot: MetricSnapshot) -> Result<LogEntry> {
            Err(netpulse_ops::store_error("disk on fire"))
        }

        async fn query(
            &self,
            _interface: Option<&str>,
            _since: Option<DateTime<Utc>>,
        ) -> Result<Vec<LogEntry>> {
            Err(netpulse_ops::store_error("disk on fire"))
        }

        async fn prune(&self, _retention: chrono::Duration) -> Result<usize> {
            Err(netpulse_ops::store_error("disk on fire"))
        }

        fn retention(&self) -> chrono::Duration {
            chrono::Duration::hours(24)
        }
    }

    /// Store that never answers.
    struct StalledStore;

    #[async_trait]
    impl MetricsStore for StalledStore {
        async fn append(&self, _snapshot: MetricSnapshot) -> Result<LogEntry> {
            std::future::pending().await
        }

        async fn query(
            &self,
            _interface: Option<&str>,
            _since: Option<DateTime<Utc>>,
        ) -> Result<Vec<LogEntry>> {
            std::future::pending().await
        }

        async fn prune(&self, _retention: chrono::Duration) -> Result<usize> {
            std::future::pending().await
        }

        fn retention(&self) -> chrono::Duration {
            chrono::Duration::hours(24)
        }
    }

    #[tokio::test]
    async fn live_reading_wins_when_available() {
        let live = StaticSource::responding(json!({
            "latency": 14.5, "packetLoss": 0.3, "download": 101.0, "upload": 24.0
        }));
        let orchestrator = orchestrator(live);
        let snapshot = orchestrator.get_metrics("eth0", MetricsOptions::default()).await;
        assert_eq!(snapshot.source, MetricSource::Live);
        assert_eq!(snapshot.latency_ms, 14.5);
        assert_eq!(snapshot.interface, "eth0");
        assert!(orchestrator.cache().get("eth0").is_some());
    }

    #[tokio::test]
    async fn failing_live_source_degrades_instead_of_erroring() {
        let orchestrator = orchestrator(StaticSource::failing("connection refused"));
        let snapshot = orchestrator.get_metrics("eth0", MetricsOptions::default()).await;
        assert_ne!(snapshot.source, MetricSource::Live);
        assert_eq!(snapshot.source, MetricSource::Synthetic);
        assert!(snapshot.synthetic);
        assert!(snapshot.validate().is_ok());
    }

    #[tokio::test]
    async fn slow_live_source_is_abandoned_after_timeout() {
        let orchestrator = orchestrator(StaticSource::hanging());
        let options = MetricsOptions {
            live_timeout: Some(Duration::from_millis(30)),
            ..Default::default()
        };
        let started = std::time::Instant::now();
        let snapshot = orchestrator.get_metrics("wlan0", options).await;
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(snapshot.source, MetricSource::Synthetic);
    }

    #[tokio::test]
    async fn empty_live_payload_counts_as_failure() {
        let orchestrator = orchestrator(StaticSource::responding(json!({})));
        let snapshot = orchestrator.get_metrics("eth0", MetricsOptions::default()).await;
        assert_eq!(snapshot.source, MetricSource::Synthetic);
    }

    #[tokio::test]
    async fn logged_reading_is_served_from_cache_tier() {
        let store = MetricsLog::default();
        store.append(reading("eth0", 42.0)).await.unwrap();
        let orchestrator = orchestrator_with_store(UnavailableSource::new(), store);
        let snapshot = orchestrator.get_metrics("eth0", MetricsOptions::default()).await;
        assert_eq!(snapshot.source, MetricSource::Cache);
        assert_eq!(snapshot.latency_ms, 42.0);
    }

    #[tokio::test]
    async fn last_live_reading_is_reused_when_source_drops() {
        let live = SwitchableSource {
            online: AtomicBool::new(true),
        };
        let orchestrator = orchestrator(live);
        let first = orchestrator.get_metrics("eth0", MetricsOptions::default()).await;
        assert_eq!(first.source, MetricSource::Live);

        orchestrator.live().online.store(false, Ordering::SeqCst);
        let second = orchestrator.get_metrics("eth0", MetricsOptions::default()).await;
        assert_eq!(second.source, MetricSource::Cache);
        assert_eq!(second.latency_ms, first.latency_ms);
    }

    #[tokio::test]
    async fn broken_store_still_yields_synthetic_data() {
        let orchestrator = orchestrator_with_store(UnavailableSource::new(), BrokenStore);
        let snapshot = orchestrator.get_metrics("eth0", MetricsOptions::default()).await;
        assert_eq!(snapshot.source, MetricSource::Synthetic);

        let history = orchestrator
            .get_history(&HistoryQuery {
                interface: "eth0".into(),
                window: HistoryWindow::hours(6),
                metric: None,
            })
            .await;
        assert_eq!(history.source, MetricSource::Synthetic);

        let mut events = orchestrator.network().subscribe();
        let err = orchestrator.record_metrics(reading("eth0", 1.0)).await.unwrap_err();
        assert!(!err.is_validation());
        let event = events.next().await.expect("ops event");
        assert!(matches!(event.payload, EventPayload::Ops(_)));
    }

    #[tokio::test]
    async fn stalled_store_is_abandoned_after_timeout() {
        let orchestrator = orchestrator_with_store(UnavailableSource::new(), StalledStore);
        let bound = Duration::from_secs(2);

        let snapshot = tokio::time::timeout(
            bound,
            orchestrator.get_metrics("eth0", MetricsOptions::default()),
        )
        .await
        .expect("get_metrics resolves");
        assert_eq!(snapshot.source, MetricSource::Synthetic);

        let query = HistoryQuery {
            interface: "eth0".into(),
            window: HistoryWindow::hours(6),
            metric: None,
        };
        let history = tokio::time::timeout(bound, orchestrator.get_history(&query))
            .await
            .expect("get_history resolves");
        assert_eq!(history.source, MetricSource::Synthetic);

        let summary = tokio::time::timeout(bound, orchestrator.summary("eth0", HistoryWindow::hours(3)))
            .await
            .expect("summary resolves");
        assert_eq!(summary.samples, 3);

        let feed = tokio::time::timeout(bound, orchestrator.recent_activity("eth0", 2))
            .await
            .expect("activity resolves");
        assert_eq!(feed.len(), 2);

        let err = tokio::time::timeout(bound, orchestrator.record_metrics(reading("eth0", 5.0)))
            .await
            .expect("record resolves")
            .unwrap_err();
        assert!(matches!(err, netpulse_types::NetpulseError::Store(_)));
        assert!(orchestrator.cache().is_empty());
    }

    #[tokio::test]
    async fn expired_submission_is_not_served_from_cache() {
        let orchestrator = orchestrator(UnavailableSource::new());
        let mut stale = reading("eth0", 999.0);
        stale.timestamp = Utc::now() - chrono::Duration::hours(25);
        orchestrator.record_metrics(stale).await.unwrap();
        assert!(orchestrator.store().is_empty().await);
        assert!(orchestrator.cache().get("eth0").is_none());

        let snapshot = orchestrator.get_metrics("eth0", MetricsOptions::default()).await;
        assert_eq!(snapshot.source, MetricSource::Synthetic);
        assert_ne!(snapshot.latency_ms, 999.0);
    }

    #[tokio::test]
    async fn late_older_submission_does_not_hide_newer_reading() {
        let orchestrator = orchestrator(UnavailableSource::new());
        orchestrator.record_metrics(reading("eth0", 10.0)).await.unwrap();
        let mut older = reading("eth0", 77.0);
        older.timestamp = Utc::now() - chrono::Duration::hours(3);
        orchestrator.record_metrics(older).await.unwrap();

        let newest = orchestrator.store().query(Some("eth0"), None).await.unwrap();
        assert_eq!(newest[0].snapshot.latency_ms, 10.0);
        let snapshot = orchestrator.get_metrics("eth0", MetricsOptions::default()).await;
        assert_eq!(snapshot.source, MetricSource::Cache);
        assert_eq!(snapshot.latency_ms, 10.0);
    }

    #[tokio::test]
    async fn synthetic_history_end_to_end() {
        let orchestrator = orchestrator(UnavailableSource::new());
        let request = HistoryRequest {
            interface: Some("eth0".into()),
            hours: Some(24),
            ..Default::default()
        };
        let history = orchestrator.history_for(&request, false).await.unwrap();
        assert_eq!(history.source, MetricSource::Synthetic);
        assert_eq!(history.interface, "eth0");
        assert_eq!(history.series.len(), 4);
        for (kind, series) in &history.series {
            assert_eq!(series.len(), 24);
            assert!(series
                .points()
                .windows(2)
                .all(|pair| pair[1].timestamp - pair[0].timestamp == chrono::Duration::hours(1)));
            for value in series.values() {
                assert!(value >= 0.0);
                if *kind == MetricKind::PacketLoss {
                    assert!(value <= PACKET_LOSS_CEILING_PCT);
                }
            }
        }
    }

    #[tokio::test]
    async fn history_prefers_log_over_synthesis() {
        let store = MetricsLog::default();
        for minutes in [50, 10, 30] {
            let mut snapshot = reading("eth0", minutes as f64);
            snapshot.timestamp = Utc::now() - chrono::Duration::minutes(minutes);
            store.append(snapshot).await.unwrap();
        }
        let orchestrator = orchestrator_with_store(UnavailableSource::new(), store);
        let history = orchestrator
            .get_history(&HistoryQuery {
                interface: "eth0".into(),
                window: HistoryWindow::hours(2),
                metric: Some(MetricKind::Latency),
            })
            .await;
        assert_eq!(history.source, MetricSource::Cache);
        assert_eq!(history.series.len(), 1);
        let latency = history.get(MetricKind::Latency).expect("latency series");
        assert_eq!(latency.values().collect::<Vec<_>>(), vec![50.0, 30.0, 10.0]);
    }

    #[tokio::test]
    async fn history_uses_live_source_when_it_answers() {
        let now = Utc::now();
        let live = StaticSource::responding(json!({"latency": 1})).with_history(json!([
            {"latency": 18.0, "timestamp": (now - chrono::Duration::hours(1)).to_rfc3339()},
            {"latency": 16.0, "timestamp": (now - chrono::Duration::hours(2)).to_rfc3339()}
        ]));
        let orchestrator = orchestrator(live);
        let history = orchestrator
            .get_history(&HistoryQuery {
                interface: "eth0".into(),
                window: HistoryWindow::hours(24),
                metric: None,
            })
            .await;
        assert_eq!(history.source, MetricSource::Live);
        let latency = history.get(MetricKind::Latency).unwrap();
        assert_eq!(latency.values().collect::<Vec<_>>(), vec![16.0, 18.0]);
    }

    #[tokio::test]
    async fn invalid_history_requests_are_rejected() {
        let orchestrator = orchestrator(UnavailableSource::new());
        let zero = HistoryRequest {
            hours: Some(0),
            ..Default::default()
        };
        assert!(orchestrator
            .history_for(&zero, false)
            .await
            .unwrap_err()
            .is_validation());
        let unknown = HistoryRequest {
            metric: Some("bandwidth".into()),
            ..Default::default()
        };
        assert!(orchestrator
            .history_for(&unknown, false)
            .await
            .unwrap_err()
            .is_validation());
    }

    #[tokio::test]
    async fn recording_validates_appends_and_publishes() {
        let orchestrator = orchestrator(UnavailableSource::new());
        let mut events = orchestrator.network().subscribe();

        let mut bad = reading("eth0", 10.0);
        bad.packet_loss_pct = 140.0;
        assert!(orchestrator
            .record_metrics(bad)
            .await
            .unwrap_err()
            .is_validation());

        let entry = orchestrator.record_metrics(reading("eth0", 10.0)).await.unwrap();
        assert_eq!(entry.snapshot.latency_ms, 10.0);
        assert_eq!(orchestrator.store().query(None, None).await.unwrap().len(), 1);

        let event = events.next().await.expect("published event");
        match event.payload {
            EventPayload::Metrics(metrics) => assert!(metrics.recorded),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn raw_payloads_are_normalized_before_recording() {
        let orchestrator = orchestrator(UnavailableSource::new());
        let entry = orchestrator
            .record_payload(&json!({"packet_loss": 0.9, "download_speed": 40}), Some("wlan0"))
            .await
            .unwrap();
        assert_eq!(entry.snapshot.interface, "wlan0");
        assert_eq!(entry.snapshot.download_mbps, 40.0);
        assert!(orchestrator
            .record_payload(&json!({"hello": "world"}), None)
            .await
            .unwrap_err()
            .is_validation());

        let out_of_range = json!({"interface": "eth0", "latencyMs": -50, "packetLossPct": 150});
        assert!(orchestrator
            .record_payload(&out_of_range, None)
            .await
            .unwrap_err()
            .is_validation());
        assert_eq!(orchestrator.store().query(Some("eth0"), None).await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn cancelled_request_writes_nothing() {
        let orchestrator = Arc::new(orchestrator(StaticSource::hanging()));
        let task = {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move {
                orchestrator
                    .get_metrics(
                        "eth0",
                        MetricsOptions {
                            live_timeout: Some(Duration::from_secs(30)),
                            ..Default::default()
                        },
                    )
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());
        assert!(orchestrator.cache().is_empty());
        assert!(orchestrator.store().is_empty().await);
    }

    #[tokio::test]
    async fn summary_averages_logged_readings() {
        let store = MetricsLog::default();
        store.append(reading("eth0", 20.0)).await.unwrap();
        store.append(reading("eth0", 40.0)).await.unwrap();
        let orchestrator = orchestrator_with_store(UnavailableSource::new(), store);
        let summary = orchestrator.summary("eth0", HistoryWindow::hours(1)).await;
        assert_eq!(summary.samples, 2);
        assert_eq!(summary.source, MetricSource::Cache);
        assert_eq!(summary.metrics[&MetricKind::Latency].mean, 30.0);

        let synthetic = orchestrator.summary("wlan0", HistoryWindow::hours(6)).await;
        assert_eq!(synthetic.source, MetricSource::Synthetic);
        assert_eq!(synthetic.samples, 6);
    }

    #[tokio::test]
    async fn activity_feed_is_newest_first() {
        let orchestrator = orchestrator(UnavailableSource::new());
        let feed = orchestrator.recent_activity("eth0", 4).await;
        assert_eq!(feed.len(), 4);
        assert!(feed.windows(2).all(|pair| pair[0].timestamp > pair[1].timestamp));
    }
}
