use netpulse_types::metrics::MetricKind;

/// Realistic upper bound for generated packet loss.
pub const PACKET_LOSS_CEILING_PCT: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaveShape {
    Sine,
    /// For metrics that sit lowest during busy hours, such as throughput.
    Cosine,
}

/// Static parameters of one metric's daily curve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PatternConfig {
    pub baseline: f64,
    pub amplitude: f64,
    pub noise_level: f64,
    pub peak_hour: u32,
    pub shape: WaveShape,
    /// Scale of the per-interface baseline offset derived from the seed.
    pub seed_spread: f64,
    pub upper_bound: Option<f64>,
}

static LATENCY: PatternConfig = PatternConfig {
    baseline: 25.0,
    amplitude: 10.0,
    noise_level: 3.0,
    peak_hour: 20,
    shape: WaveShape::Sine,
    seed_spread: 8.0,
    upper_bound: None,
};

static PACKET_LOSS: PatternConfig = PatternConfig {
    baseline: 0.8,
    amplitude: 0.5,
    noise_level: 0.3,
    peak_hour: 20,
    shape: WaveShape::Sine,
    seed_spread: 0.4,
    upper_bound: Some(PACKET_LOSS_CEILING_PCT),
};

static DOWNLOAD_SPEED: PatternConfig = PatternConfig {
    baseline: 90.0,
    amplitude: 25.0,
    noise_level: 8.0,
    peak_hour: 20,
    shape: WaveShape::Cosine,
    seed_spread: 20.0,
    upper_bound: None,
};

static UPLOAD_SPEED: PatternConfig = PatternConfig {
    baseline: 20.0,
    amplitude: 6.0,
    noise_level: 2.0,
    peak_hour: 20,
    shape: WaveShape::Cosine,
    seed_spread: 5.0,
    upper_bound: None,
};

impl PatternConfig {
    pub fn for_kind(kind: MetricKind) -> &'static PatternConfig {
        match kind {
            MetricKind::Latency => &LATENCY,
            MetricKind::PacketLoss => &PACKET_LOSS,
            MetricKind::DownloadSpeed => &DOWNLOAD_SPEED,
            MetricKind::UploadSpeed => &UPLOAD_SPEED,
        }
    }

    /// Looks a profile up by metric name. Unknown names get the latency
    /// profile.
    pub fn for_name(name: &str) -> &'static PatternConfig {
        name.parse::<MetricKind>()
            .map(Self::for_kind)
            .unwrap_or(&LATENCY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_names_use_latency_profile() {
        assert_eq!(PatternConfig::for_name("jitter"), &LATENCY);
        assert_eq!(PatternConfig::for_name("packet_loss"), &PACKET_LOSS);
    }

    #[test]
    fn throughput_profiles_use_cosine() {
        assert_eq!(PatternConfig::for_kind(MetricKind::DownloadSpeed).shape, WaveShape::Cosine);
        assert_eq!(PatternConfig::for_kind(MetricKind::UploadSpeed).shape, WaveShape::Cosine);
        assert_eq!(PatternConfig::for_kind(MetricKind::Latency).shape, WaveShape::Sine);
    }
}
