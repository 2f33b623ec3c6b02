//! Errors raised while configuring the monitor.

use thiserror::Error;
use tw_reservoir::ReservoirError;

/// Monitor result type.
pub type Result<T> = std::result::Result<T, MonitorError>;

/// Configuration and construction errors.
///
/// Recording and snapshotting never fail; everything here surfaces while the
/// monitor is being set up.
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Invalid environment override {var}={value}: {message}")]
    InvalidOverride {
        var: String,
        value: String,
        message: String,
    },

    #[error("Reservoir configuration rejected: {0}")]
    Reservoir(#[from] ReservoirError),
}

impl MonitorError {
    pub(crate) fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        MonitorError::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Error code for structured error reporting.
    pub fn code(&self) -> u32 {
        match self {
            MonitorError::Parse(_) => 20,
            MonitorError::InvalidValue { .. } => 21,
            MonitorError::InvalidOverride { .. } => 22,
            MonitorError::Reservoir(inner) => inner.code(),
        }
    }
}
