use std::{collections::BTreeMap, fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{validation_error, NetpulseError, Result};

/// Fallback tier a reading was served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricSource {
    Live,
    Cache,
    Synthetic,
}

impl MetricSource {
    pub fn as_str(self) -> &'static str {
        match self {
            MetricSource::Live => "live",
            MetricSource::Cache => "cache",
            MetricSource::Synthetic => "synthetic",
        }
    }
}

impl fmt::Display for MetricSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricSource {
    type Err = NetpulseError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "live" => Ok(MetricSource::Live),
            "cache" => Ok(MetricSource::Cache),
            "synthetic" => Ok(MetricSource::Synthetic),
            other => Err(validation_error(format!("unknown metric source '{other}'"))),
        }
    }
}

/// The four metrics a dashboard charts per interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Latency,
    PacketLoss,
    DownloadSpeed,
    UploadSpeed,
}

impl MetricKind {
    pub const ALL: [MetricKind; 4] = [
        MetricKind::Latency,
        MetricKind::PacketLoss,
        MetricKind::DownloadSpeed,
        MetricKind::UploadSpeed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MetricKind::Latency => "latency",
            MetricKind::PacketLoss => "packet_loss",
            MetricKind::DownloadSpeed => "download_speed",
            MetricKind::UploadSpeed => "upload_speed",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKind {
    type Err = NetpulseError;

    fn from_str(s: &str) -> Result<Self> {
        let needle = s.trim();
        MetricKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(needle))
            .ok_or_else(|| {
                validation_error(format!(
                    "unknown metric '{needle}' (expected latency|packet_loss|download_speed|upload_speed)"
                ))
            })
    }
}

/// Point-in-time reading for one interface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSnapshot {
    pub latency_ms: f64,
    pub packet_loss_pct: f64,
    pub download_mbps: f64,
    pub upload_mbps: f64,
    pub timestamp: DateTime<Utc>,
    pub interface: String,
    pub source: MetricSource,
    #[serde(default)]
    pub synthetic: bool,
}

impl MetricSnapshot {
    pub const MAX_PACKET_LOSS_PCT: f64 = 100.0;

    /// Zeroed reading stamped with `timestamp`.
    pub fn empty(interface: impl Into<String>, source: MetricSource, timestamp: DateTime<Utc>) -> Self {
        Self {
            latency_ms: 0.0,
            packet_loss_pct: 0.0,
            download_mbps: 0.0,
            upload_mbps: 0.0,
            timestamp,
            interface: interface.into(),
            source,
            synthetic: source == MetricSource::Synthetic,
        }
    }

    pub fn value(&self, kind: MetricKind) -> f64 {
        match kind {
            MetricKind::Latency => self.latency_ms,
            MetricKind::PacketLoss => self.packet_loss_pct,
            MetricKind::DownloadSpeed => self.download_mbps,
            MetricKind::UploadSpeed => self.upload_mbps,
        }
    }

    pub fn set_value(&mut self, kind: MetricKind, value: f64) {
        let slot = match kind {
            MetricKind::Latency => &mut self.latency_ms,
            MetricKind::PacketLoss => &mut self.packet_loss_pct,
            MetricKind::DownloadSpeed => &mut self.download_mbps,
            MetricKind::UploadSpeed => &mut self.upload_mbps,
        };
        *slot = value;
    }

    /// Re-tags the reading. A snapshot served from the cache tier keeps its
    /// `synthetic` flag, since a cached value may itself have been generated.
    pub fn with_source(mut self, source: MetricSource) -> Self {
        self.source = source;
        if source == MetricSource::Synthetic {
            self.synthetic = true;
        }
        self
    }

    /// Rejects readings that break the numeric invariants.
    pub fn validate(&self) -> Result<()> {
        if self.interface.trim().is_empty() {
            return Err(validation_error("interface must not be empty"));
        }
        for kind in MetricKind::ALL {
            let value = self.value(kind);
            if !value.is_finite() || value < 0.0 {
                return Err(validation_error(format!(
                    "{kind} must be a finite non-negative number (got {value})"
                )));
            }
        }
        if self.packet_loss_pct > Self::MAX_PACKET_LOSS_PCT {
            return Err(validation_error(format!(
                "packet_loss must not exceed 100% (got {})",
                self.packet_loss_pct
            )));
        }
        Ok(())
    }

    /// Clamps every field into its valid range.
    pub fn sanitized(mut self) -> Self {
        for kind in MetricKind::ALL {
            let value = self.value(kind);
            let clamped = if value.is_finite() { value.max(0.0) } else { 0.0 };
            self.set_value(kind, clamped);
        }
        self.packet_loss_pct = self.packet_loss_pct.min(Self::MAX_PACKET_LOSS_PCT);
        self
    }
}

/// Persisted form of a snapshot in the metrics log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub recorded_at: DateTime<Utc>,
    #[serde(flatten)]
    pub snapshot: MetricSnapshot,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

impl TimeSeriesPoint {
    pub fn new(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self { timestamp, value }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeriesOrder {
    /// Oldest first, as charted on the dashboard.
    #[default]
    Ascending,
    /// Newest first, as shown in a recent-activity feed.
    NewestFirst,
}

/// Ordered points for a single metric on a single interface.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricSeries {
    points: Vec<TimeSeriesPoint>,
}

impl MetricSeries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            points: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, point: TimeSeriesPoint) {
        self.points.push(point);
    }

    pub fn points(&self) -> &[TimeSeriesPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.points.iter().map(|p| p.value)
    }

    pub fn sort(&mut self, order: SeriesOrder) {
        match order {
            SeriesOrder::Ascending => self.points.sort_by_key(|p| p.timestamp),
            SeriesOrder::NewestFirst => self.points.sort_by(|a, b| b.timestamp.cmp(&a.timestamp)),
        }
    }
}

impl FromIterator<TimeSeriesPoint> for MetricSeries {
    fn from_iter<I: IntoIterator<Item = TimeSeriesPoint>>(iter: I) -> Self {
        Self {
            points: iter.into_iter().collect(),
        }
    }
}

/// Series for every metric of one interface, tagged with the tier used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterfaceHistory {
    pub interface: String,
    pub source: MetricSource,
    pub series: BTreeMap<MetricKind, MetricSeries>,
}

impl InterfaceHistory {
    pub fn get(&self, kind: MetricKind) -> Option<&MetricSeries> {
        self.series.get(&kind)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkHealth {
    Good,
    Degraded,
    Poor,
}

/// Latency and loss limits for [`NetworkHealth::classify`], read from the
/// `[health]` config section. camelCase keys are accepted as aliases.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HealthThresholds {
    #[serde(alias = "degradedLatencyMs")]
    pub degraded_latency_ms: f64,
    #[serde(alias = "poorLatencyMs")]
    pub poor_latency_ms: f64,
    #[serde(alias = "degradedPacketLossPct")]
    pub degraded_packet_loss_pct: f64,
    #[serde(alias = "poorPacketLossPct")]
    pub poor_packet_loss_pct: f64,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            degraded_latency_ms: 100.0,
            poor_latency_ms: 250.0,
            degraded_packet_loss_pct: 1.0,
            poor_packet_loss_pct: 3.0,
        }
    }
}

impl NetworkHealth {
    pub fn classify(latency_ms: f64, packet_loss_pct: f64, thresholds: &HealthThresholds) -> Self {
        if latency_ms >= thresholds.poor_latency_ms
            || packet_loss_pct >= thresholds.poor_packet_loss_pct
        {
            NetworkHealth::Poor
        } else if latency_ms >= thresholds.degraded_latency_ms
            || packet_loss_pct >= thresholds.degraded_packet_loss_pct
        {
            NetworkHealth::Degraded
        } else {
            NetworkHealth::Good
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricStats {
    pub mean: f64,
    pub min: f64,
    pub max: f64,
}

impl MetricStats {
    fn from_values(values: impl Iterator<Item = f64>) -> Option<Self> {
        let mut count = 0usize;
        let mut sum = 0.0;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for value in values {
            count += 1;
            sum += value;
            min = min.min(value);
            max = max.max(value);
        }
        (count > 0).then(|| MetricStats {
            mean: sum / count as f64,
            min,
            max,
        })
    }
}

/// Averages over a set of snapshots plus a health verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSummary {
    pub interface: String,
    pub samples: usize,
    pub source: MetricSource,
    pub metrics: BTreeMap<MetricKind, MetricStats>,
    pub health: NetworkHealth,
}

impl MetricSummary {
    /// Returns `None` for an empty slice. `source` is the lowest-fidelity
    /// tier present among the samples.
    pub fn from_snapshots(
        interface: impl Into<String>,
        snapshots: &[MetricSnapshot],
        thresholds: &HealthThresholds,
    ) -> Option<Self> {
        if snapshots.is_empty() {
            return None;
        }
        let mut metrics = BTreeMap::new();
        for kind in MetricKind::ALL {
            if let Some(stats) = MetricStats::from_values(snapshots.iter().map(|s| s.value(kind))) {
                metrics.insert(kind, stats);
            }
        }
        let source = snapshots
            .iter()
            .map(|s| s.source)
            .max_by_key(|source| match source {
                MetricSource::Live => 0,
                MetricSource::Cache => 1,
                MetricSource::Synthetic => 2,
            })
            .unwrap_or(MetricSource::Synthetic);
        let mean = |kind| metrics.get(&kind).map(|s: &MetricStats| s.mean).unwrap_or(0.0);
        let health = NetworkHealth::classify(
            mean(MetricKind::Latency),
            mean(MetricKind::PacketLoss),
            thresholds,
        );
        Some(Self {
            interface: interface.into(),
            samples: snapshots.len(),
            source,
            metrics,
            health,
        })
    }
}
