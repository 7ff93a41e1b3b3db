// SPDX-License-Identifier: MIT OR Apache-2.0

//! # StatFlux
//!
//! StatFlux collects telemetry (stats, events, logs) from network devices
//! via their REST management API, normalizes the heterogeneous nested
//! responses into a canonical flat schema, and forwards the result to
//! pluggable downstream consumers.
//!
//! ## Architecture
//!
//! ```text
//! raw stats tree ──> Normalizer ──> flat document ──> ConsumerRegistry ──> consumers
//!                      │  (property-driven rule chains)
//! raw event line ──────┘
//!
//! records ──> Tracer (MultiReaderRing) ──> debug endpoint / on-disk writer
//! ```
//!
//! - [`core::normalize`]: the property-driven transformation engine:
//!   pattern-based key renaming, tag injection, array-to-map conversion,
//!   timestamp formatting, custom function execution, entry flattening.
//! - [`core::properties`]: the static stat table loaded once at startup.
//! - [`core::trace`]: bounded circular lists; the multi-reader variant
//!   lets independent consumers drain a shared history without copies.
//! - [`core::pipeline`]: named consumer dispatch.
//!
//! ## Example
//!
//! ```
//! use serde_json::json;
//! use statflux_rust::{DataNormalizationOptions, Normalizer};
//!
//! let raw = json!({
//!     "kind": "tm:sys:version:versionstats",
//!     "entries": {
//!         "https://localhost/mgmt/tm/sys/version/0": {
//!             "nestedStats": { "entries": { "Version": { "description": "14.1.0" } } }
//!         }
//!     }
//! });
//! let options: DataNormalizationOptions =
//!     serde_json::from_value(json!({ "key": "sys/version/0::Version" })).unwrap();
//! let version = Normalizer::new().data(&raw, &options).unwrap();
//! assert_eq!(version, json!("14.1.0"));
//! ```

pub mod core;

pub use crate::core::error::{TelemetryError, TelemetryResult};
pub use crate::core::normalize::{
    DataNormalizationOptions, EventNormalizationOptions, FunctionRegistry, Normalizer,
};
pub use crate::core::pipeline::{Consumer, ConsumerContext, ConsumerRegistry, PayloadKind};
pub use crate::core::properties::Properties;
pub use crate::core::trace::{MultiReaderRing, RingList, RingReader, Tracer};
