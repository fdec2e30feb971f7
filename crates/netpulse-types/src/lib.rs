//! Shared domain types for the Netpulse project.

pub mod config;
pub mod events;
pub mod metrics;
pub mod query;

mod errors;

pub use errors::{validation_error, NetpulseError, Result};

/// Interface name used when a caller or upstream omits one.
pub const DEFAULT_INTERFACE: &str = "default";
