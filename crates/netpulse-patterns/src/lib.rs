//! Synthetic network telemetry: per-metric daily patterns and the history
//! built from them.

mod generator;
mod history;
mod noise;
mod profile;

pub use generator::{interface_seed, PatternGenerator};
pub use history::HistorySynthesizer;
pub use noise::{FixedNoise, NoiseSource, RandomNoise, ZeroNoise};
pub use profile::{PatternConfig, WaveShape, PACKET_LOSS_CEILING_PCT};
