use std::{f64::consts::PI, sync::Arc};

use netpulse_types::metrics::MetricKind;

use crate::{
    noise::{NoiseSource, RandomNoise, ZeroNoise},
    profile::{PatternConfig, WaveShape},
};

/// Stable seed for an interface name: the sum of its character codes.
pub fn interface_seed(name: &str) -> u64 {
    name.chars().map(|c| u64::from(u32::from(c))).sum()
}

/// Produces time-of-day correlated values for a metric.
///
/// For a fixed `(metric, hour, seed)` the curve is deterministic; only the
/// injected noise source varies between calls.
#[derive(Clone)]
pub struct PatternGenerator {
    noise: Arc<dyn NoiseSource>,
}

impl PatternGenerator {
    pub fn new(noise: Arc<dyn NoiseSource>) -> Self {
        Self { noise }
    }

    pub fn random() -> Self {
        Self::new(Arc::new(RandomNoise::new()))
    }

    pub fn deterministic() -> Self {
        Self::new(Arc::new(ZeroNoise))
    }

    /// Value for `metric_name` at `hour_of_day`. Unknown metric names use the
    /// latency profile.
    pub fn generate(&self, metric_name: &str, hour_of_day: u32, seed: u64) -> f64 {
        self.generate_with(PatternConfig::for_name(metric_name), hour_of_day, seed)
    }

    pub fn generate_kind(&self, kind: MetricKind, hour_of_day: u32, seed: u64) -> f64 {
        self.generate_with(PatternConfig::for_kind(kind), hour_of_day, seed)
    }

    pub fn generate_with(&self, config: &PatternConfig, hour_of_day: u32, seed: u64) -> f64 {
        let baseline = config.baseline + (seed % 10) as f64 / 10.0 * config.seed_spread;
        let amplitude = config.amplitude * (1.0 + (seed % 5) as f64 / 10.0);
        let peak_hour = (config.peak_hour + (seed % 3) as u32) % 24;

        let hour_diff = (hour_of_day % 24 + 24 - peak_hour) % 24;
        let normalized = f64::from(hour_diff) / 12.0;
        let pattern = match config.shape {
            WaveShape::Sine => (normalized * PI).sin(),
            WaveShape::Cosine => (normalized * PI).cos(),
        };
        let noise = self.noise.sample() * config.noise_level;

        let value = baseline + pattern * amplitude + noise;
        let value = if value.is_finite() { value.max(0.0) } else { 0.0 };
        match config.upper_bound {
            Some(bound) => value.min(bound),
            None => value,
        }
    }
}

impl Default for PatternGenerator {
    fn default() -> Self {
        Self::random()
    }
}
