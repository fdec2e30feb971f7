//! Caller-facing history parameters and their validation.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    config::HistoryConfig, metrics::MetricKind, validation_error, Result, DEFAULT_INTERFACE,
};

/// Span of a synthesized or sliced history: `points` samples spaced
/// `interval_hours` apart, the last one at the current hour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryWindow {
    pub points: u32,
    pub interval_hours: u32,
}

impl HistoryWindow {
    pub fn hours(hours: u32) -> Self {
        Self {
            points: hours,
            interval_hours: 1,
        }
    }

    /// `days` of history with one point every `interval_hours`. Spans past
    /// `u32::MAX` hours saturate.
    pub fn days(days: u32, interval_hours: u32) -> Self {
        let interval_hours = interval_hours.max(1);
        Self {
            points: days.saturating_mul(24) / interval_hours,
            interval_hours,
        }
    }

    pub fn span_hours(&self) -> u32 {
        self.points.saturating_mul(self.interval_hours)
    }

    pub fn interval(&self) -> Duration {
        Duration::hours(i64::from(self.interval_hours))
    }

    /// Earliest instant covered by the window ending at `now`.
    pub fn start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - Duration::hours(i64::from(self.span_hours()))
    }
}

/// Raw history parameters as they arrive from the HTTP layer or CLI.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryRequest {
    pub interface: Option<String>,
    pub hours: Option<u32>,
    pub days: Option<u32>,
    pub metric: Option<String>,
}

/// Validated history parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryQuery {
    pub interface: String,
    pub window: HistoryWindow,
    pub metric: Option<MetricKind>,
}

impl HistoryRequest {
    /// Validates against `config`. When neither `hours` nor `days` is given,
    /// `prefer_days` picks which default applies.
    pub fn validate(&self, config: &HistoryConfig, prefer_days: bool) -> Result<HistoryQuery> {
        let window = match (self.hours, self.days) {
            (Some(_), Some(_)) => {
                return Err(validation_error("specify either hours or days, not both"))
            }
            (Some(0), None) => return Err(validation_error("hours must be a positive integer")),
            (None, Some(0)) => return Err(validation_error("days must be a positive integer")),
            (None, Some(days)) if days > config.max_hours / 24 => {
                return Err(validation_error(format!(
                    "requested window of {days} days exceeds the maximum of {}h",
                    config.max_hours
                )))
            }
            (Some(hours), None) => HistoryWindow::hours(hours),
            (None, Some(days)) => HistoryWindow::days(days, config.day_interval_hours),
            (None, None) if prefer_days => {
                HistoryWindow::days(config.default_days, config.day_interval_hours)
            }
            (None, None) => HistoryWindow::hours(config.default_hours),
        };
        if window.span_hours() > config.max_hours {
            return Err(validation_error(format!(
                "requested window of {}h exceeds the maximum of {}h",
                window.span_hours(),
                config.max_hours
            )));
        }

        let metric = self
            .metric
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .map(str::parse::<MetricKind>)
            .transpose()?;

        Ok(HistoryQuery {
            interface: normalize_interface(self.interface.as_deref()),
            window,
            metric,
        })
    }
}

/// Trims an interface name and substitutes the default for blank input.
pub fn normalize_interface(raw: Option<&str>) -> String {
    match raw.map(str::trim) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => DEFAULT_INTERFACE.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_per_endpoint() {
        let config = HistoryConfig::default();
        let query = HistoryRequest::default().validate(&config, false).unwrap();
        assert_eq!(query.window, HistoryWindow::hours(24));
        assert_eq!(query.interface, DEFAULT_INTERFACE);

        let query = HistoryRequest::default().validate(&config, true).unwrap();
        assert_eq!(query.window.points, 30 * 8);
        assert_eq!(query.window.interval_hours, 3);
    }

    #[test]
    fn rejects_bad_windows_and_metrics() {
        let config = HistoryConfig::default();
        let both = HistoryRequest {
            hours: Some(1),
            days: Some(1),
            ..Default::default()
        };
        assert!(both.validate(&config, false).unwrap_err().is_validation());

        let zero = HistoryRequest {
            hours: Some(0),
            ..Default::default()
        };
        assert!(zero.validate(&config, false).is_err());

        let huge = HistoryRequest {
            days: Some(365),
            ..Default::default()
        };
        assert!(huge.validate(&config, false).is_err());

        let unknown = HistoryRequest {
            metric: Some("jitter".into()),
            ..Default::default()
        };
        assert!(unknown.validate(&config, false).unwrap_err().is_validation());
    }

    #[test]
    fn oversized_day_counts_are_rejected_not_wrapped() {
        let config = HistoryConfig::default();
        for days in [91, 178_956_971, u32::MAX] {
            let request = HistoryRequest {
                days: Some(days),
                ..Default::default()
            };
            let err = request.validate(&config, true).unwrap_err();
            assert!(err.is_validation(), "days={days}");
        }
        let widest = HistoryRequest {
            days: Some(90),
            ..Default::default()
        };
        assert_eq!(widest.validate(&config, true).unwrap().window.span_hours(), 2160);
        assert_eq!(HistoryWindow::days(u32::MAX, 3).span_hours(), u32::MAX / 3 * 3);
    }

    #[test]
    fn parses_metric_and_trims_interface() {
        let request = HistoryRequest {
            interface: Some("  wlan0 ".into()),
            hours: Some(6),
            metric: Some("upload_speed".into()),
            ..Default::default()
        };
        let query = request.validate(&HistoryConfig::default(), false).unwrap();
        assert_eq!(query.interface, "wlan0");
        assert_eq!(query.metric, Some(MetricKind::UploadSpeed));
        assert_eq!(query.window.span_hours(), 6);
    }
}
