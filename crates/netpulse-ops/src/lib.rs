//! Operational helpers: logging, data directory, metrics log persistence.

mod metrics_log;

use std::path::PathBuf;

use netpulse_types::{config::OpsConfig, NetpulseError, Result};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

pub use metrics_log::{MetricsLog, MetricsStore};

pub fn init_tracing(config: &OpsConfig) -> Result<()> {
    let filter = EnvFilter::try_new(config.log_level.clone())
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|err| NetpulseError::Ops(format!("failed to create log filter: {err}")))?;

    fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|err| NetpulseError::Ops(format!("tracing init error: {err}")))?;
    Ok(())
}

pub fn ensure_data_dir(path: &str) -> Result<PathBuf> {
    let dir = PathBuf::from(path);
    std::fs::create_dir_all(&dir)
        .map_err(|err| NetpulseError::Ops(format!("failed to create data dir: {err}")))?;
    info!("Data directory ready at {:?}", dir);
    Ok(dir)
}

/// Generate an error aligned with store semantics.
pub fn store_error(message: impl Into<String>) -> NetpulseError {
    NetpulseError::Store(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_nested_data_dir() {
        let root = tempfile::tempdir().expect("tempdir");
        let nested = root.path().join("a/b");
        let dir = ensure_data_dir(nested.to_str().unwrap()).expect("create");
        assert!(dir.is_dir());
    }
}
