//! Per-resource execution statistics.
//!
//! Every resource execution carries two timings: the resource method itself
//! and the whole request that reached it (matching, filters, writing the
//! response). They are kept apart so that slow framework work is not
//! mistaken for a slow handler.

use crate::config::MonitorConfig;
use crate::error::Result;
use crate::execution::{ExecutionSnapshot, ExecutionStatistics};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, error};

/// Start and duration (ns) of one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    pub start_time: i64,
    pub duration: i64,
}

impl Timing {
    pub fn new(start_time: i64, duration: i64) -> Self {
        Self {
            start_time,
            duration,
        }
    }
}

/// Method and request execution statistics of one resource.
#[derive(Debug)]
pub struct ResourceStatistics {
    method_executions: ExecutionStatistics,
    request_executions: ExecutionStatistics,
}

impl ResourceStatistics {
    pub fn new(config: &MonitorConfig, start_time: i64) -> Result<Self> {
        Ok(Self {
            method_executions: ExecutionStatistics::new(config, start_time)?,
            request_executions: ExecutionStatistics::new(config, start_time)?,
        })
    }

    pub fn add_execution(&self, method: Timing, request: Timing) {
        self.method_executions
            .add_execution(method.start_time, method.duration);
        self.request_executions
            .add_execution(request.start_time, request.duration);
    }

    /// Time spent in the resource method.
    pub fn method_executions(&self) -> &ExecutionStatistics {
        &self.method_executions
    }

    /// Time spent on whole requests served by the resource.
    pub fn request_executions(&self) -> &ExecutionStatistics {
        &self.request_executions
    }

    pub fn snapshot(&self, now: i64) -> ResourceSnapshot {
        ResourceSnapshot {
            method_executions: self.method_executions.snapshot(now),
            request_executions: self.request_executions.snapshot(now),
        }
    }
}

/// Immutable statistics of one resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    pub method_executions: ExecutionSnapshot,
    pub request_executions: ExecutionSnapshot,
}

/// Resource statistics keyed by name (URI or resource class), created on
/// first use.
#[derive(Debug)]
pub(crate) struct ResourceRegistry {
    config: MonitorConfig,
    start_time: i64,
    entries: RwLock<BTreeMap<String, Arc<ResourceStatistics>>>,
}

impl ResourceRegistry {
    pub(crate) fn new(config: MonitorConfig, start_time: i64) -> Self {
        Self {
            config,
            start_time,
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    pub(crate) fn get(&self, key: &str) -> Option<Arc<ResourceStatistics>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub(crate) fn get_or_create(&self, key: &str) -> Option<Arc<ResourceStatistics>> {
        if let Some(stats) = self.get(key) {
            return Some(stats);
        }
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(stats) = entries.get(key) {
            return Some(Arc::clone(stats));
        }
        match ResourceStatistics::new(&self.config, self.start_time) {
            Ok(stats) => {
                debug!(key, "resource statistics created");
                let stats = Arc::new(stats);
                entries.insert(key.to_string(), Arc::clone(&stats));
                Some(stats)
            }
            // Unreachable with a config that already built the request statistics.
            Err(err) => {
                error!(key, error = %err, "failed to create resource statistics");
                None
            }
        }
    }

    pub(crate) fn keys(&self) -> Vec<String> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Snapshots at `now`, taken outside the registry lock.
    pub(crate) fn snapshot(&self, now: i64) -> BTreeMap<String, ResourceSnapshot> {
        let entries: Vec<(String, Arc<ResourceStatistics>)> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(key, stats)| (key.clone(), Arc::clone(stats)))
            .collect();
        entries
            .into_iter()
            .map(|(key, stats)| (key, stats.snapshot(now)))
            .collect()
    }
}
