use std::collections::BTreeMap;

use chrono::{DateTime, Duration, DurationRound, Timelike, Utc};
use netpulse_types::{
    metrics::{
        InterfaceHistory, MetricKind, MetricSeries, MetricSnapshot, MetricSource, SeriesOrder,
        TimeSeriesPoint,
    },
    query::HistoryWindow,
};
use tracing::debug;

use crate::generator::{interface_seed, PatternGenerator};

/// Drives a [`PatternGenerator`] across a time window.
#[derive(Clone, Default)]
pub struct HistorySynthesizer {
    generator: PatternGenerator,
}

impl HistorySynthesizer {
    pub fn new(generator: PatternGenerator) -> Self {
        Self { generator }
    }

    pub fn generator(&self) -> &PatternGenerator {
        &self.generator
    }

    /// One series for `kind`, the newest point at the hour containing `now`.
    pub fn synthesize_metric(
        &self,
        kind: MetricKind,
        seed: u64,
        window: HistoryWindow,
        order: SeriesOrder,
        now: DateTime<Utc>,
    ) -> MetricSeries {
        let mut series: MetricSeries = window_timestamps(window, now)
            .map(|timestamp| {
                let value = self.generator.generate_kind(kind, timestamp.hour(), seed);
                TimeSeriesPoint::new(timestamp, value)
            })
            .collect();
        if order == SeriesOrder::NewestFirst {
            series.sort(order);
        }
        series
    }

    /// Unseeded series for a bare metric name; unknown names follow the
    /// latency profile.
    pub fn synthesize_named(
        &self,
        metric_name: &str,
        window: HistoryWindow,
        now: DateTime<Utc>,
    ) -> MetricSeries {
        window_timestamps(window, now)
            .map(|timestamp| {
                TimeSeriesPoint::new(
                    timestamp,
                    self.generator.generate(metric_name, timestamp.hour(), 0),
                )
            })
            .collect()
    }

    /// Every metric for `interface`, seeded by its name.
    pub fn synthesize_interface(
        &self,
        interface: &str,
        window: HistoryWindow,
        now: DateTime<Utc>,
    ) -> InterfaceHistory {
        let seed = interface_seed(interface);
        debug!(interface, seed, points = window.points, "synthesizing interface history");
        let series: BTreeMap<MetricKind, MetricSeries> = MetricKind::ALL
            .into_iter()
            .map(|kind| {
                let series =
                    self.synthesize_metric(kind, seed, window, SeriesOrder::Ascending, now);
                (kind, series)
            })
            .collect();
        InterfaceHistory {
            interface: interface.to_string(),
            source: MetricSource::Synthetic,
            series,
        }
    }

    /// Synthetic reading for the current hour.
    pub fn snapshot(&self, interface: &str, now: DateTime<Utc>) -> MetricSnapshot {
        let seed = interface_seed(interface);
        let mut snapshot = MetricSnapshot::empty(interface, MetricSource::Synthetic, now);
        for kind in MetricKind::ALL {
            snapshot.set_value(kind, self.generator.generate_kind(kind, now.hour(), seed));
        }
        snapshot
    }

    /// Hourly synthetic readings, newest first, as a recent-activity feed.
    pub fn recent_activity(
        &self,
        interface: &str,
        count: u32,
        now: DateTime<Utc>,
    ) -> Vec<MetricSnapshot> {
        let mut entries: Vec<MetricSnapshot> = window_timestamps(HistoryWindow::hours(count), now)
            .map(|timestamp| self.snapshot(interface, timestamp))
            .collect();
        entries.reverse();
        entries
    }
}

fn window_timestamps(
    window: HistoryWindow,
    now: DateTime<Utc>,
) -> impl Iterator<Item = DateTime<Utc>> {
    let anchor = now.duration_trunc(Duration::hours(1)).unwrap_or(now);
    let interval = window.interval();
    let points = i32::try_from(window.points).unwrap_or(i32::MAX);
    (0..points).map(move |i| anchor - interval * (points - 1 - i))
}
