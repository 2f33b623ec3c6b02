//! Request monitoring on top of time-window reservoirs.
//!
//! - [`ExecutionStatistics`]: execution durations over several trailing
//!   windows (1s through 1h by default) with memory bounded by chunk count
//! - [`ResponseStatistics`]: copy-on-write histogram of response codes
//! - [`ResourceStatistics`]: method and whole-request timings of one resource,
//!   kept per URI and per resource class
//! - [`ExceptionMapperStatistics`]: exception mapper executions and mapping
//!   outcomes
//! - [`Monitor`]: facade combining all of the above, with listeners receiving
//!   immutable [`MonitoringStatistics`]
//! - [`MonitorConfig`]: TOML configuration with environment overrides
//! - [`logging`]: `tracing` subscriber setup for embedding applications
//!
//! # Example
//!
//! ```
//! use tw_monitor::{Monitor, MonitorConfig};
//! use tw_reservoir::TimeUnit;
//!
//! let monitor = Monitor::new(MonitorConfig::default(), 0).unwrap();
//! monitor.record_request(0, 4_000_000, 200);
//! monitor.record_request(500_000_000, 6_000_000, 200);
//!
//! let stats = monitor.statistics(900_000_000);
//! let last_second = stats.requests.window(1, TimeUnit::Seconds).unwrap();
//! assert_eq!(last_second.count(), 2);
//! assert_eq!(last_second.mean(), 5_000_000.0);
//! assert_eq!(stats.responses.count(200), 2);
//! ```

pub mod config;
pub mod error;
pub mod exception;
pub mod execution;
pub mod logging;
pub mod resource;
pub mod response;
pub mod statistics;

pub use config::{MonitorConfig, WindowSpec, ENV_CHUNK_MS, ENV_RAW_WINDOW_MS};
pub use error::{MonitorError, Result};
pub use exception::{ExceptionMapperStatistics, ExceptionMappings};
pub use execution::{ExecutionSnapshot, ExecutionStatistics};
pub use resource::{ResourceSnapshot, ResourceStatistics, Timing};
pub use response::{ResponseCodes, ResponseStatistics};
pub use statistics::{Monitor, MonitoringStatistics, StatisticsListener};
