//! Monitoring facade: request, per-resource, response and exception mapping
//! statistics.
//!
//! The host feeds completed requests into a [`Monitor`] and periodically
//! calls [`Monitor::publish`], which freezes everything into one immutable
//! [`MonitoringStatistics`] and hands it to the registered listeners.

use crate::config::MonitorConfig;
use crate::error::Result;
use crate::exception::{ExceptionMapperStatistics, ExceptionMappings};
use crate::execution::{ExecutionSnapshot, ExecutionStatistics};
use crate::resource::{ResourceRegistry, ResourceSnapshot, ResourceStatistics, Timing};
use crate::response::{ResponseCodes, ResponseStatistics};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, error};

/// Point-in-time statistics of everything the monitor has seen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoringStatistics {
    pub captured_at: DateTime<Utc>,
    /// Instant (ns) the snapshots were taken at.
    pub now: i64,
    pub requests: ExecutionSnapshot,
    /// Per-URI statistics.
    pub resources: BTreeMap<String, ResourceSnapshot>,
    /// Per-resource-class statistics.
    pub resource_classes: BTreeMap<String, ResourceSnapshot>,
    pub responses: ResponseCodes,
    pub exception_mappings: ExceptionMappings,
}

/// Receives every published [`MonitoringStatistics`].
///
/// A listener that panics is dropped and never called again.
pub trait StatisticsListener: Send + Sync {
    fn on_statistics(&self, statistics: &MonitoringStatistics);
}

impl<F> StatisticsListener for F
where
    F: Fn(&MonitoringStatistics) + Send + Sync,
{
    fn on_statistics(&self, statistics: &MonitoringStatistics) {
        self(statistics)
    }
}

/// Aggregates request timings, status codes and exception mappings.
pub struct Monitor {
    config: MonitorConfig,
    start_time: i64,
    requests: ExecutionStatistics,
    uris: ResourceRegistry,
    classes: ResourceRegistry,
    responses: ResponseStatistics,
    exception_mappings: ExceptionMapperStatistics,
    listeners: Mutex<Vec<Arc<dyn StatisticsListener>>>,
}

impl Monitor {
    /// Build a monitor observing from `start_time` (ns).
    pub fn new(config: MonitorConfig, start_time: i64) -> Result<Self> {
        let requests = ExecutionStatistics::new(&config, start_time)?;
        debug!(
            start_ns = start_time,
            levels = config.levels,
            windows = config.windows.len(),
            "monitor created"
        );
        Ok(Self {
            uris: ResourceRegistry::new(config.clone(), start_time),
            classes: ResourceRegistry::new(config.clone(), start_time),
            config,
            start_time,
            requests,
            responses: ResponseStatistics::new(),
            exception_mappings: ExceptionMapperStatistics::new(),
            listeners: Mutex::new(Vec::new()),
        })
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Record a completed request (times in ns).
    pub fn record_request(&self, start_time: i64, duration: i64, status: u16) {
        self.requests.add_execution(start_time, duration);
        self.responses.add_response_code(status);
    }

    /// Record one execution of the resource at `uri`, implemented by
    /// `resource_class`: the resource method's own timing and the timing of
    /// the whole request.
    pub fn record_resource(
        &self,
        uri: &str,
        resource_class: &str,
        method: Timing,
        request: Timing,
    ) {
        for stats in [
            self.uris.get_or_create(uri),
            self.classes.get_or_create(resource_class),
        ]
        .into_iter()
        .flatten()
        {
            stats.add_execution(method, request);
        }
    }

    /// Record one exception mapping attempt; `mapper` is the mapper that ran.
    pub fn record_exception_mapping(&self, mapper: Option<&str>, successful: bool) {
        self.exception_mappings.add_mapping(mapper, successful);
    }

    /// Statistics of the resource at `uri`, if it has been recorded.
    pub fn resource(&self, uri: &str) -> Option<Arc<ResourceStatistics>> {
        self.uris.get(uri)
    }

    /// Statistics of one resource class, if it has been recorded.
    pub fn resource_class(&self, name: &str) -> Option<Arc<ResourceStatistics>> {
        self.classes.get(name)
    }

    /// URIs with recorded executions, sorted.
    pub fn resource_uris(&self) -> Vec<String> {
        self.uris.keys()
    }

    /// Resource classes with recorded executions, sorted.
    pub fn resource_class_names(&self) -> Vec<String> {
        self.classes.keys()
    }

    pub fn requests(&self) -> &ExecutionStatistics {
        &self.requests
    }

    pub fn responses(&self) -> &ResponseStatistics {
        &self.responses
    }

    pub fn exception_mappings(&self) -> &ExceptionMapperStatistics {
        &self.exception_mappings
    }

    /// Freeze all statistics at `now` (ns).
    pub fn statistics(&self, now: i64) -> MonitoringStatistics {
        MonitoringStatistics {
            captured_at: Utc::now(),
            now,
            requests: self.requests.snapshot(now),
            resources: self.uris.snapshot(now),
            resource_classes: self.classes.snapshot(now),
            responses: ResponseCodes::clone(&self.responses.snapshot()),
            exception_mappings: ExceptionMappings::clone(&self.exception_mappings.snapshot()),
        }
    }

    pub fn add_listener(&self, listener: Arc<dyn StatisticsListener>) {
        self.lock_listeners().push(listener);
    }

    pub fn listener_count(&self) -> usize {
        self.lock_listeners().len()
    }

    fn lock_listeners(&self) -> std::sync::MutexGuard<'_, Vec<Arc<dyn StatisticsListener>>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Build statistics at `now` (ns) and deliver them to every listener.
    ///
    /// Listeners run outside the listener lock, so they may register further
    /// listeners; those first hear from the next publication.
    pub fn publish(&self, now: i64) -> Arc<MonitoringStatistics> {
        let statistics = Arc::new(self.statistics(now));
        let listeners: Vec<Arc<dyn StatisticsListener>> = self.lock_listeners().clone();

        let mut failed = Vec::new();
        for (index, listener) in listeners.iter().enumerate() {
            let delivered =
                panic::catch_unwind(AssertUnwindSafe(|| listener.on_statistics(&statistics)));
            if delivered.is_err() {
                error!(listener = index, "statistics listener panicked, removing it");
                failed.push(Arc::clone(listener));
            }
        }
        if !failed.is_empty() {
            self.lock_listeners()
                .retain(|listener| !failed.iter().any(|bad| Arc::ptr_eq(bad, listener)));
        }
        debug!(
            now_ns = now,
            listeners = listeners.len() - failed.len(),
            resources = statistics.resources.len(),
            "statistics published"
        );
        statistics
    }
}

impl std::fmt::Debug for Monitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Monitor")
            .field("start_time", &self.start_time)
            .field("requests", &self.requests)
            .field("resources", &self.resource_uris())
            .field("resource_classes", &self.resource_class_names())
            .field("listeners", &self.listener_count())
            .finish_non_exhaustive()
    }
}
