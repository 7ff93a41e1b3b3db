// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bounded in-memory tracing.
//!
//! The collector keeps a short history of recent input/output records for
//! debugging. Producers push without blocking; any number of consumers (the
//! on-disk trace writer, a debug endpoint) drain the shared history at
//! their own pace through [`RingReader`] cursors.

pub mod ring;
pub mod shared;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use ring::RingList;
pub use shared::{MultiReaderRing, RingReader};

/// Records kept when no capacity is configured
pub const DEFAULT_TRACER_CAPACITY: usize = 10;

/// One traced record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceRecord {
    /// ISO-8601 UTC time the record was traced
    pub timestamp: String,
    pub data: Value,
}

/// Ring-bounded history of recent records with multi-reader fan-out
#[derive(Debug, Clone)]
pub struct Tracer {
    history: MultiReaderRing<TraceRecord>,
}

impl Tracer {
    /// # Panics
    ///
    /// Panics when `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        Self {
            history: MultiReaderRing::bounded(capacity),
        }
    }

    /// Timestamp `data` and push it; returns the record evicted when the
    /// history is full
    pub fn record(&self, data: Value) -> Option<TraceRecord> {
        self.history.push(TraceRecord {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            data,
        })
    }

    /// A cursor over the history; see [`MultiReaderRing::reader`]
    pub fn reader(&self) -> RingReader<TraceRecord> {
        self.history.reader()
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Drop the recorded history; existing readers stay valid
    pub fn clear(&self) {
        self.history.erase(true);
    }
}

impl Default for Tracer {
    fn default() -> Self {
        Self::new(DEFAULT_TRACER_CAPACITY)
    }
}
