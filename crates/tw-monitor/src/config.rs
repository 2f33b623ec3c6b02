//! Monitor configuration.
//!
//! Supports configuration via:
//! - TOML text (`MonitorConfig::from_toml_str`); reading the file is up to
//!   the caller
//! - Environment overrides (`TW_RAW_WINDOW_MS`, `TW_CHUNK_MS`)
//!
//! ```toml
//! levels = 10
//! collision_buffer = 256
//!
//! [raw_window]
//! size = 1
//! unit = "seconds"
//!
//! [[windows]]
//! size = 15
//! unit = "minutes"
//! ```

use crate::error::{MonitorError, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;
use tw_reservoir::{
    AggregatingTrimmerConfig, SlidingWindowConfig, TimeUnit, DEFAULT_COLLISION_BUFFER,
    DEFAULT_MAX_CHUNKS_PER_WINDOW, MAX_LEVEL,
};

/// Overrides the raw window, in milliseconds.
pub const ENV_RAW_WINDOW_MS: &str = "TW_RAW_WINDOW_MS";
/// Overrides the level-0 chunk size, in milliseconds.
pub const ENV_CHUNK_MS: &str = "TW_CHUNK_MS";

// ---------------------------------------------------------------------------
// Durations
// ---------------------------------------------------------------------------

/// A duration written as a size and a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSpec {
    pub size: i64,
    pub unit: TimeUnit,
}

impl WindowSpec {
    pub const fn new(size: i64, unit: TimeUnit) -> Self {
        Self { size, unit }
    }

    pub fn nanos(&self) -> i64 {
        self.unit.to_nanos(self.size)
    }
}

impl std::fmt::Display for WindowSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.size, self.unit)
    }
}

// ---------------------------------------------------------------------------
// Monitor configuration
// ---------------------------------------------------------------------------

/// Shape of the reservoirs behind every execution statistic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Number of chunk resolutions kept by the trimmer.
    pub levels: u32,
    /// Upper bound on chunks one reported window may span.
    pub max_chunks_per_window: u64,
    /// Values kept per exact timestamp in the raw reservoir.
    pub collision_buffer: usize,
    /// Exact (per-sample) window.
    pub raw_window: WindowSpec,
    /// Width of a level-0 chunk.
    pub chunk: WindowSpec,
    /// Reported windows. None may be shorter than `raw_window`.
    pub windows: Vec<WindowSpec>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            levels: 10,
            max_chunks_per_window: DEFAULT_MAX_CHUNKS_PER_WINDOW,
            collision_buffer: DEFAULT_COLLISION_BUFFER,
            raw_window: WindowSpec::new(1, TimeUnit::Seconds),
            chunk: WindowSpec::new(10, TimeUnit::Milliseconds),
            windows: vec![
                WindowSpec::new(1, TimeUnit::Seconds),
                WindowSpec::new(15, TimeUnit::Seconds),
                WindowSpec::new(1, TimeUnit::Minutes),
                WindowSpec::new(15, TimeUnit::Minutes),
                WindowSpec::new(1, TimeUnit::Hours),
            ],
        }
    }
}

impl MonitorConfig {
    /// Parse and validate a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: MonitorConfig = toml::from_str(text)?;
        config.validate()?;
        debug!(
            raw_window = %config.raw_window,
            chunk = %config.chunk,
            levels = config.levels,
            windows = config.windows.len(),
            "monitor config parsed"
        );
        Ok(config)
    }

    /// Apply `TW_RAW_WINDOW_MS` / `TW_CHUNK_MS` from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|var| std::env::var(var).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_RAW_WINDOW_MS) {
            self.raw_window = parse_millis(ENV_RAW_WINDOW_MS, &value)?;
            debug!(var = ENV_RAW_WINDOW_MS, value = %value, "config override applied");
        }
        if let Some(value) = lookup(ENV_CHUNK_MS) {
            self.chunk = parse_millis(ENV_CHUNK_MS, &value)?;
            debug!(var = ENV_CHUNK_MS, value = %value, "config override applied");
        }
        Ok(())
    }

    /// Reject configurations the reservoirs cannot honor.
    pub fn validate(&self) -> Result<()> {
        if self.raw_window.size <= 0 {
            return Err(MonitorError::invalid(
                "raw_window",
                format!("must be positive, got {}", self.raw_window),
            ));
        }
        if self.chunk.size <= 0 {
            return Err(MonitorError::invalid(
                "chunk",
                format!("must be positive, got {}", self.chunk),
            ));
        }
        if self.levels == 0 || self.levels > MAX_LEVEL {
            return Err(MonitorError::invalid(
                "levels",
                format!("must be in 1..={}, got {}", MAX_LEVEL, self.levels),
            ));
        }
        if self.max_chunks_per_window == 0 {
            return Err(MonitorError::invalid("max_chunks_per_window", "must be at least 1"));
        }
        if self.collision_buffer == 0 {
            return Err(MonitorError::invalid("collision_buffer", "must be at least 1"));
        }
        if self.windows.is_empty() {
            return Err(MonitorError::invalid("windows", "at least one window is required"));
        }
        let raw = self.raw_window.nanos();
        for window in &self.windows {
            if window.size <= 0 {
                return Err(MonitorError::invalid(
                    "windows",
                    format!("must be positive, got {}", window),
                ));
            }
            if window.nanos() < raw {
                return Err(MonitorError::invalid(
                    "windows",
                    format!(
                        "{} is shorter than the raw window {}",
                        window, self.raw_window
                    ),
                ));
            }
        }
        Ok(())
    }

    /// Raw reservoir parameters for statistics starting at `start_time` (ns).
    pub fn raw_config(&self, start_time: i64) -> SlidingWindowConfig {
        SlidingWindowConfig::new(self.raw_window.nanos(), start_time, TimeUnit::Nanoseconds)
            .with_collision_buffer(self.collision_buffer)
    }

    /// Trimmer parameters for statistics starting at `start_time` (ns).
    pub fn trimmer_config(&self, start_time: i64) -> AggregatingTrimmerConfig {
        AggregatingTrimmerConfig::new(start_time, self.chunk.nanos(), TimeUnit::Nanoseconds)
            .with_levels(self.levels)
            .with_max_chunks_per_window(self.max_chunks_per_window)
    }

    /// Reported window lengths in nanoseconds, ascending and deduplicated.
    pub fn window_nanos(&self) -> Vec<i64> {
        let mut windows: Vec<i64> = self.windows.iter().map(WindowSpec::nanos).collect();
        windows.sort_unstable();
        windows.dedup();
        windows
    }
}

fn parse_millis(var: &str, value: &str) -> Result<WindowSpec> {
    let invalid = |message: &str| MonitorError::InvalidOverride {
        var: var.to_string(),
        value: value.to_string(),
        message: message.to_string(),
    };
    let millis: i64 = value
        .trim()
        .parse()
        .map_err(|_| invalid("expected an integer number of milliseconds"))?;
    if millis <= 0 {
        return Err(invalid("must be positive"));
    }
    Ok(WindowSpec::new(millis, TimeUnit::Milliseconds))
}
