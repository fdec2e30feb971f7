use thiserror::Error;

pub type Result<T, E = NetpulseError> = std::result::Result<T, E>;

/// Unified error type covering common failure scenarios across subsystems.
#[derive(Debug, Error)]
pub enum NetpulseError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("live source error: {0}")]
    Probe(String),
    #[error("metrics store error: {0}")]
    Store(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("operational error: {0}")]
    Ops(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl NetpulseError {
    /// Caller mistakes, as opposed to environmental failures.
    pub fn is_validation(&self) -> bool {
        matches!(self, NetpulseError::Validation(_))
    }
}

/// Shorthand for building a validation failure.
pub fn validation_error(message: impl Into<String>) -> NetpulseError {
    NetpulseError::Validation(message.into())
}
