//! Field synonym tables and lenient value extraction.

use chrono::{DateTime, TimeZone, Utc};
use netpulse_types::metrics::MetricKind;
use serde_json::Value;

pub(crate) const TIMESTAMP_KEYS: &[&str] = &["timestamp", "time", "capturedAt", "captured_at", "ts"];
pub(crate) const INTERFACE_KEYS: &[&str] = &["interface", "iface", "interfaceName", "interface_name"];

/// Keys accepted for a metric, canonical name first. Dotted keys descend into
/// nested objects.
pub(crate) fn metric_keys(kind: MetricKind) -> &'static [&'static str] {
    match kind {
        MetricKind::Latency => &[
            "latencyMs",
            "latency_ms",
            "latency",
            "avgLatency",
            "avg_latency",
            "rttMs",
            "rtt_ms",
            "ping",
        ],
        MetricKind::PacketLoss => &[
            "packetLossPct",
            "packet_loss_pct",
            "packetLoss",
            "packet_loss",
            "avgPacketLoss",
            "avg_packet_loss",
            "loss",
        ],
        MetricKind::DownloadSpeed => &[
            "downloadMbps",
            "download_mbps",
            "download",
            "downloadSpeed",
            "download_speed",
            "throughput.download",
        ],
        MetricKind::UploadSpeed => &[
            "uploadMbps",
            "upload_mbps",
            "upload",
            "uploadSpeed",
            "upload_speed",
            "throughput.upload",
        ],
    }
}

pub(crate) fn lookup<'a>(object: &'a Value, key: &str) -> Option<&'a Value> {
    key.split('.')
        .try_fold(object, |current, part| current.get(part))
        .filter(|value| !value.is_null())
}

pub(crate) fn first_present<'a>(object: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| lookup(object, key))
}

/// Numbers, or strings holding a number with an optional unit suffix
/// (`"23.5ms"`, `"1.2%"`).
pub(crate) fn as_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let trimmed = s.trim();
            let end = trimmed
                .find(|c: char| !(c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E')))
                .unwrap_or(trimmed.len());
            trimmed[..end].parse::<f64>().ok()
        }
        _ => None,
    };
    number.filter(|n| n.is_finite())
}

/// RFC 3339 strings, or unix epoch numbers in seconds or milliseconds.
pub(crate) fn as_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Number(n) => {
            let raw = n.as_i64()?;
            if raw.abs() >= 100_000_000_000 {
                Utc.timestamp_millis_opt(raw).single()
            } else {
                Utc.timestamp_opt(raw, 0).single()
            }
        }
        _ => None,
    }
}
