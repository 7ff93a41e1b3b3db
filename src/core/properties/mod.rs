// SPDX-License-Identifier: MIT OR Apache-2.0

//! Static Property Tables
//!
//! The collector is property-driven: a JSON table loaded once at startup
//! describes, per output stat, where its value lives in the raw tree and
//! which normalization rule chain shapes it. Definitions are immutable once
//! loaded and shared read-only across collection cycles.
//!
//! ```json
//! {
//!   "hostname": { "key": "sys/global-settings::hostname" },
//!   "tmstats": { "structure": { "folder": true } },
//!   "cpuInfo": {
//!     "key": "sys/cpu-info",
//!     "structure": { "parentKey": "tmstats" },
//!     "normalization": [ { "renameKeys": { "patterns": { "cpu": "cpuInfo" } } } ]
//!   }
//! }
//! ```

use once_cell::sync::Lazy;
use serde::Deserialize;
use serde_json::Value;

use crate::core::error::{TelemetryError, TelemetryResult};
use crate::core::normalize::event::ClassifyRule;
use crate::core::normalize::rules::NormalizationStep;

/// How to derive one named output property from the raw tree
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StatDefinition {
    /// `::`-separated path into the raw tree; absent means the whole node
    pub key: Option<String>,
    pub structure: Option<StructureSpec>,
    /// Ordered rule chain applied to the resolved value
    pub normalization: Vec<NormalizationStep>,
    /// Deferred stat derived from boundary-provided output (e.g. a shell
    /// command run by the collector); resolved outside the core
    pub then: Option<Box<StatDefinition>>,
}

/// Output grouping for a stat
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StructureSpec {
    /// Nest this stat's value under the named folder stat
    pub parent_key: Option<String>,
    /// Marks a container-only entry other stats nest under
    pub folder: bool,
}

/// The loaded, insertion-ordered stat table
#[derive(Debug, Clone, Default)]
pub struct Properties {
    stats: Vec<(String, StatDefinition)>,
}

impl Properties {
    /// Load a table from its JSON form. Fails fast on a malformed
    /// definition; a bad table is a configuration defect, not a runtime
    /// data error.
    pub fn from_value(table: &Value) -> TelemetryResult<Self> {
        let obj = table.as_object().ok_or_else(|| {
            TelemetryError::configuration("stat property table must be a JSON object")
        })?;
        let mut stats = Vec::with_capacity(obj.len());
        for (name, definition) in obj {
            let definition: StatDefinition = serde_json::from_value(definition.clone())
                .map_err(|e| TelemetryError::configuration_with_key(e.to_string(), name.clone()))?;
            stats.push((name.clone(), definition));
        }
        Ok(Self { stats })
    }

    pub fn stats(&self) -> &[(String, StatDefinition)] {
        &self.stats
    }

    pub fn get(&self, name: &str) -> Option<&StatDefinition> {
        self.stats
            .iter()
            .find(|(stat_name, _)| stat_name == name)
            .map(|(_, definition)| definition)
    }

    pub fn len(&self) -> usize {
        self.stats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }
}

/// Built-in event classification table. Ordered: the first rule whose
/// discriminating fields are all present wins.
static DEFAULT_EVENT_CLASSIFIERS: Lazy<Vec<ClassifyRule>> = Lazy::new(|| {
    let table = serde_json::json!([
        { "keys": ["acl_policy_name", "acl_rule_name"], "category": "firewallEvent" },
        { "keys": ["policy_name", "violations"], "category": "wafEvent" },
        { "keys": ["access_profile", "session_id"], "category": "accessEvent" },
        { "keys": ["Entity", "AggrInterval"], "category": "analyticsEvent" }
    ]);
    serde_json::from_value(table).expect("built-in classifier table is well-formed")
});

pub fn default_event_classifiers() -> &'static [ClassifyRule] {
    &DEFAULT_EVENT_CLASSIFIERS
}
