//! Configuration errors for reservoir construction.
//!
//! Reservoirs never fail once built: out-of-window timestamps, empty windows
//! and full collision buffers are defined outcomes. The only failures are
//! rejected configurations, reported here at construction time.

use thiserror::Error;

/// Errors raised while building a reservoir or trimmer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReservoirError {
    #[error("invalid window size: {window} (must be positive)")]
    InvalidWindow { window: i64 },

    #[error("invalid chunk size: {chunk_size} (must be positive)")]
    InvalidChunkSize { chunk_size: i64 },

    #[error("invalid collision buffer capacity: {capacity} (must be at least 1)")]
    InvalidCollisionBuffer { capacity: usize },

    #[error("invalid hierarchy levels: {levels} (supported: 1..={max})")]
    InvalidLevels { levels: u32, max: u32 },

    #[error("invalid chunk budget: {max_chunks} chunks per window (must be at least 1)")]
    InvalidChunkBudget { max_chunks: u64 },

    #[error("aggregated window {window}ns is shorter than the raw window {raw_window}ns")]
    WindowShorterThanRaw { window: i64, raw_window: i64 },

    #[error("raw reservoir does not hand its expired samples to this trimmer")]
    TrimmerMismatch,
}

impl ReservoirError {
    /// Stable error code for structured reporting.
    pub fn code(&self) -> u32 {
        match self {
            ReservoirError::InvalidWindow { .. } => 10,
            ReservoirError::InvalidChunkSize { .. } => 11,
            ReservoirError::InvalidCollisionBuffer { .. } => 12,
            ReservoirError::InvalidLevels { .. } => 13,
            ReservoirError::InvalidChunkBudget { .. } => 14,
            ReservoirError::WindowShorterThanRaw { .. } => 15,
            ReservoirError::TrimmerMismatch => 16,
        }
    }
}

/// Result type alias for reservoir construction.
pub type Result<T> = std::result::Result<T, ReservoirError>;
