//! Structured logging for applications embedding the monitor.
//!
//! The library crates only emit `tracing` events; nothing is printed unless
//! the host installs a subscriber. This module installs one on stderr, either
//! human-readable or as JSON lines:
//!
//! ```no_run
//! use tw_monitor::logging::{init_logging, LogConfig};
//!
//! let config = LogConfig::from_env(None, None);
//! init_logging(&config);
//! ```
//!
//! `RUST_LOG`, when set, replaces the filter derived from [`LogConfig::level`].

pub mod config;

pub use config::{LogConfig, LogFormat, LogLevel, ENV_LOG, ENV_LOG_FORMAT};

use std::io::IsTerminal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Targets covered by the level in [`LogConfig`].
const TARGETS: [&str; 2] = ["tw_reservoir", "tw_monitor"];

fn filter_for(config: &LogConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let directives: Vec<String> = TARGETS
            .iter()
            .map(|target| format!("{}={}", target, config.level))
            .collect();
        EnvFilter::new(directives.join(","))
    })
}

/// Install the global subscriber.
///
/// Returns `false` when a subscriber was already installed; the existing one
/// stays in place.
pub fn init_logging(config: &LogConfig) -> bool {
    let filter = filter_for(config);
    let registry = tracing_subscriber::registry().with(filter);

    let installed = match config.format {
        LogFormat::Human => {
            let layer = fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_ansi(std::io::stderr().is_terminal());
            if config.timestamps {
                registry.with(layer).try_init()
            } else {
                registry.with(layer.without_time()).try_init()
            }
        }
        LogFormat::Jsonl => registry
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_current_span(false),
            )
            .try_init(),
    };
    installed.is_ok()
}

/// Install the subscriber resolved from `TW_LOG` / `TW_LOG_FORMAT`.
pub fn init_default_logging() -> bool {
    init_logging(&LogConfig::from_env(None, None))
}
