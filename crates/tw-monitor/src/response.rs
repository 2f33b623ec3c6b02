//! Response status histogram.
//!
//! Writers clone the current histogram, bump one counter and publish the new
//! version; readers load the published `Arc` without taking a lock. Each
//! published [`ResponseCodes`] is immutable, so a reader holding one keeps a
//! consistent view no matter how many responses arrive afterwards.

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::trace;

/// One published version of the histogram.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseCodes {
    /// Responses per status code.
    pub counts: BTreeMap<u16, u64>,
    /// Status of the most recent response.
    pub last: Option<u16>,
    pub total: u64,
}

impl ResponseCodes {
    pub fn count(&self, code: u16) -> u64 {
        self.counts.get(&code).copied().unwrap_or(0)
    }

    /// Responses whose status falls in the class of `class` (e.g. 5 for 5xx).
    pub fn class_count(&self, class: u16) -> u64 {
        let low = class.saturating_mul(100);
        let high = low.saturating_add(99);
        self.counts.range(low..=high).map(|(_, n)| *n).sum()
    }
}

/// Lock-free-read histogram of response status codes.
#[derive(Debug, Default)]
pub struct ResponseStatistics {
    published: ArcSwap<ResponseCodes>,
}

impl ResponseStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_response_code(&self, code: u16) {
        self.published.rcu(|current| {
            let mut next = ResponseCodes::clone(current);
            *next.counts.entry(code).or_insert(0) += 1;
            next.last = Some(code);
            next.total += 1;
            next
        });
        trace!(code, "response recorded");
    }

    /// The currently published histogram.
    pub fn snapshot(&self) -> Arc<ResponseCodes> {
        self.published.load_full()
    }

    pub fn last_response_code(&self) -> Option<u16> {
        self.published.load().last
    }

    pub fn total(&self) -> u64 {
        self.published.load().total
    }
}
