//! Exception mapping statistics.
//!
//! Published the same way as the response histogram: writers swap in a new
//! immutable [`ExceptionMappings`], readers load it without locking.

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::trace;

/// One published version of the exception mapping counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionMappings {
    /// Executions per exception mapper.
    pub mappers: BTreeMap<String, u64>,
    /// Exceptions mapped to a response.
    pub successful: u64,
    /// Exceptions no mapper could turn into a response.
    pub unsuccessful: u64,
}

impl ExceptionMappings {
    pub fn executions(&self, mapper: &str) -> u64 {
        self.mappers.get(mapper).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.successful + self.unsuccessful
    }
}

/// Lock-free-read exception mapping counters.
#[derive(Debug, Default)]
pub struct ExceptionMapperStatistics {
    published: ArcSwap<ExceptionMappings>,
}

impl ExceptionMapperStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one mapping attempt. `mapper` is the mapper that ran, if any.
    pub fn add_mapping(&self, mapper: Option<&str>, successful: bool) {
        self.published.rcu(|current| {
            let mut next = ExceptionMappings::clone(current);
            if let Some(mapper) = mapper {
                *next.mappers.entry(mapper.to_string()).or_insert(0) += 1;
            }
            if successful {
                next.successful += 1;
            } else {
                next.unsuccessful += 1;
            }
            next
        });
        trace!(mapper, successful, "exception mapping recorded");
    }

    pub fn snapshot(&self) -> Arc<ExceptionMappings> {
        self.published.load_full()
    }
}
