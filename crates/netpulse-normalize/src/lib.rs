//! Maps heterogeneous upstream payloads onto [`MetricSnapshot`].
//!
//! Normalization never fails: unknown or malformed fields fall back to zero,
//! a missing timestamp becomes "now" and a missing interface becomes the
//! caller's hint or [`DEFAULT_INTERFACE`].
//!
//! Every shape except [`UpstreamShape::Canonical`] comes from a live
//! upstream, so those readings are tagged [`MetricSource::Live`]; the shape
//! that matched is reported alongside through [`Normalized`].

mod fields;

use chrono::{DateTime, Utc};
use netpulse_types::{
    metrics::{MetricKind, MetricSnapshot, MetricSource},
    validation_error, Result, DEFAULT_INTERFACE,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use fields::{as_number, as_timestamp, first_present, metric_keys, INTERFACE_KEYS, TIMESTAMP_KEYS};

/// Upstream payload families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpstreamShape {
    /// Already a serialized `MetricSnapshot`.
    Canonical,
    /// Real-probe endpoint: `{latency, packetLoss, download, upload, timestamp}`.
    LiveProbe,
    /// Third-party API using snake_case names.
    ThirdPartyApi,
    /// Capture-tool statistics, usually nested under `stats`.
    CaptureTool,
    /// Pick one of the above from the payload's keys.
    Auto,
}

impl UpstreamShape {
    /// Best guess at the family a payload belongs to.
    pub fn detect(raw: &Value) -> UpstreamShape {
        let Some(object) = raw.as_object() else {
            return UpstreamShape::LiveProbe;
        };
        if object.contains_key("latencyMs") || object.contains_key("packetLossPct") {
            UpstreamShape::Canonical
        } else if object.get("stats").is_some_and(Value::is_object)
            || object.contains_key("avgPacketLoss")
            || object.contains_key("avgLatency")
        {
            UpstreamShape::CaptureTool
        } else if object.keys().any(|key| key.contains('_')) {
            UpstreamShape::ThirdPartyApi
        } else {
            UpstreamShape::LiveProbe
        }
    }
}

/// A normalized snapshot and the shape it was read as (never `Auto`).
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub shape: UpstreamShape,
    pub snapshot: MetricSnapshot,
}

/// Stateless converter from raw upstream JSON to canonical snapshots.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsNormalizer;

impl MetricsNormalizer {
    pub fn new() -> Self {
        Self
    }

    pub fn normalize(&self, raw: &Value, shape: UpstreamShape) -> MetricSnapshot {
        self.normalize_at(raw, shape, None, Utc::now())
    }

    /// Like [`normalize`](Self::normalize), filling a missing interface with
    /// `interface_hint`.
    pub fn normalize_for(
        &self,
        raw: &Value,
        shape: UpstreamShape,
        interface_hint: &str,
    ) -> MetricSnapshot {
        self.normalize_at(raw, shape, Some(interface_hint), Utc::now())
    }

    pub fn normalize_at(
        &self,
        raw: &Value,
        shape: UpstreamShape,
        interface_hint: Option<&str>,
        now: DateTime<Utc>,
    ) -> MetricSnapshot {
        self.normalize_detailed(raw, shape, interface_hint, now).snapshot
    }

    /// Normalizes `raw` and reports which shape matched.
    pub fn normalize_detailed(
        &self,
        raw: &Value,
        shape: UpstreamShape,
        interface_hint: Option<&str>,
        now: DateTime<Utc>,
    ) -> Normalized {
        let shape = match shape {
            UpstreamShape::Auto => UpstreamShape::detect(raw),
            other => other,
        };
        let body = match shape {
            UpstreamShape::CaptureTool => raw.get("stats").filter(|s| s.is_object()).unwrap_or(raw),
            _ => raw,
        };

        let interface = first_present(raw, INTERFACE_KEYS)
            .or_else(|| first_present(body, INTERFACE_KEYS))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .or(interface_hint)
            .unwrap_or(DEFAULT_INTERFACE);
        let timestamp = first_present(raw, TIMESTAMP_KEYS)
            .or_else(|| first_present(body, TIMESTAMP_KEYS))
            .and_then(as_timestamp)
            .unwrap_or(now);

        let (source, synthetic) = match shape {
            UpstreamShape::Canonical => {
                let source = raw
                    .get("source")
                    .and_then(Value::as_str)
                    .and_then(|s| s.parse::<MetricSource>().ok())
                    .unwrap_or(MetricSource::Live);
                let synthetic = raw
                    .get("synthetic")
                    .and_then(Value::as_bool)
                    .unwrap_or(source == MetricSource::Synthetic);
                (source, synthetic)
            }
            _ => (MetricSource::Live, false),
        };

        let mut snapshot = MetricSnapshot::empty(interface, source, timestamp);
        snapshot.synthetic = synthetic;
        for kind in MetricKind::ALL {
            let value = first_present(body, metric_keys(kind))
                .and_then(as_number)
                .unwrap_or(0.0);
            snapshot.set_value(kind, value);
        }
        debug!(?shape, interface = %snapshot.interface, "normalized upstream payload");
        Normalized {
            shape,
            snapshot: snapshot.sanitized(),
        }
    }

    /// Rejects payloads whose metric fields are present but out of range:
    /// negative or non-finite values, or packet loss above 100%. Absent and
    /// non-numeric fields are left to the normal zero default.
    pub fn check_ranges(&self, raw: &Value) -> Result<()> {
        let body = raw.get("stats").filter(|s| s.is_object()).unwrap_or(raw);
        for kind in MetricKind::ALL {
            let Some(value) = first_present(body, metric_keys(kind))
                .or_else(|| first_present(raw, metric_keys(kind)))
                .and_then(as_number)
            else {
                continue;
            };
            if !value.is_finite() || value < 0.0 {
                return Err(validation_error(format!(
                    "{kind} must be a finite non-negative number (got {value})"
                )));
            }
            if kind == MetricKind::PacketLoss && value > MetricSnapshot::MAX_PACKET_LOSS_PCT {
                return Err(validation_error(format!(
                    "packet_loss must not exceed 100% (got {value})"
                )));
            }
        }
        Ok(())
    }

    /// Normalizes every element of an array payload, or of the first array
    /// found under `data`, `history`, `points` or `samples`. Elements without
    /// any metric field are dropped.
    pub fn normalize_many(
        &self,
        raw: &Value,
        shape: UpstreamShape,
        interface_hint: &str,
    ) -> Vec<MetricSnapshot> {
        let items = match raw {
            Value::Array(items) => Some(items),
            Value::Object(object) => ["data", "history", "points", "samples"]
                .iter()
                .find_map(|key| object.get(*key).and_then(Value::as_array)),
            _ => None,
        };
        items
            .map(|items| {
                items
                    .iter()
                    .filter(|item| self.is_meaningful(item))
                    .map(|item| self.normalize_for(item, shape, interface_hint))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// True when the payload is an object carrying at least one numeric
    /// metric field. Empty or unrelated payloads count as "no data".
    pub fn is_meaningful(&self, raw: &Value) -> bool {
        if !raw.is_object() {
            return false;
        }
        let body = raw.get("stats").filter(|s| s.is_object()).unwrap_or(raw);
        MetricKind::ALL.into_iter().any(|kind| {
            first_present(body, metric_keys(kind))
                .or_else(|| first_present(raw, metric_keys(kind)))
                .and_then(as_number)
                .is_some()
        })
    }
}
