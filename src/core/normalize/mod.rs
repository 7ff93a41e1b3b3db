// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Normalization Engine
//!
//! Converts deeply nested, inconsistently shaped device API responses into
//! the canonical flat schema consumed by the data pipeline.
//!
//! Data normalization runs in three phases:
//!
//! 1. **Reduce**: structural wrappers the REST API wraps every value in
//!    (`nestedStats`, metadata-only `entries` parents, single-key
//!    `{value}` / `{description}` leaves) are collapsed, metadata keys
//!    (`kind`, `selfLink`, `generation`) are dropped, and `%25` in key
//!    names becomes a literal `%` (the API double-encodes `%` in
//!    self-links; this is the single documented decode).
//! 2. **Resolve**: the stat's `::`-separated key path is walked; a path
//!    component matches a child key exactly or by substring, which is how
//!    short paths address full self-link URL keys. A missing path degrades
//!    to an empty object: one bad stat never blanks the report.
//! 3. **Rules**: an optional global `renameKeysByPattern` pre-pass (device
//!    version variants normalize to stable names first), then the stat's
//!    ordered rule chain (see [`rules`]).
//!
//! Event normalization is the parallel path for line-oriented input (see
//! [`event`]).

pub mod event;
pub mod functions;
pub mod pattern;
pub mod rules;
pub mod tags;

use serde::Deserialize;
use serde_json::{Map as JsonMap, Value};

use crate::core::error::TelemetryResult;
use crate::core::properties::Properties;

pub use event::{ClassifyRule, EventNormalizationOptions};
pub use functions::{CustomFunction, FunctionRegistry};
pub use rules::{NormalizationStep, RenameKeysSpec, StepContext};
pub use tags::AddKeysByTagSpec;

/// Raw-tree keys dropped during the reduce pass
const METADATA_KEYS: [&str; 3] = ["kind", "selfLink", "generation"];

/// Options for one [`Normalizer::data`] call
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DataNormalizationOptions {
    /// `::`-separated path to resolve before the rule chain runs
    pub key: Option<String>,
    /// Name of the stat being produced; used by `formatTimestamps` when
    /// the resolved value is a raw scalar
    pub property_key: Option<String>,
    /// Global rename pre-pass, applied before the rule chain
    pub rename_keys_by_pattern: Option<RenameKeysSpec>,
    pub normalization: Vec<NormalizationStep>,
}

/// The core orchestrator: owns the custom-function registry and applies
/// property-driven normalization to raw trees and raw events
#[derive(Debug, Clone)]
pub struct Normalizer {
    functions: FunctionRegistry,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Normalizer {
    /// Create a normalizer with the built-in custom functions registered
    pub fn new() -> Self {
        Self {
            functions: FunctionRegistry::with_defaults(),
        }
    }

    /// Create a normalizer over a caller-supplied function table
    pub fn with_functions(functions: FunctionRegistry) -> Self {
        Self { functions }
    }

    pub fn functions_mut(&mut self) -> &mut FunctionRegistry {
        &mut self.functions
    }

    /// Normalize one value out of a raw stats tree.
    ///
    /// Only `runFunctions` failures propagate; structural problems degrade
    /// to empty values.
    pub fn data(&self, raw: &Value, options: &DataNormalizationOptions) -> TelemetryResult<Value> {
        self.normalize_value(
            raw,
            options.key.as_deref(),
            options.property_key.as_deref(),
            options.rename_keys_by_pattern.as_ref(),
            &options.normalization,
        )
    }

    /// Normalize one raw event (JSON or syslog-style line)
    pub fn event(&self, raw: &Value, options: &EventNormalizationOptions) -> Value {
        event::event(raw, options)
    }

    /// Normalize every stat in a loaded property table against one raw
    /// tree, nesting values under their `structure.parentKey` where
    /// configured. A stat whose rule chain fails is dropped and logged;
    /// the remaining stats still make it into the report.
    pub fn collect(
        &self,
        raw: &Value,
        properties: &Properties,
        rename_keys_by_pattern: Option<&RenameKeysSpec>,
    ) -> Value {
        let mut doc = JsonMap::new();
        for (name, definition) in properties.stats() {
            if definition.structure.as_ref().map(|s| s.folder).unwrap_or(false) {
                doc.insert(name.clone(), Value::Object(JsonMap::new()));
                continue;
            }
            let normalized = self.normalize_value(
                raw,
                definition.key.as_deref(),
                Some(name.as_str()),
                rename_keys_by_pattern,
                &definition.normalization,
            );
            match normalized {
                Ok(value) => {
                    let parent = definition
                        .structure
                        .as_ref()
                        .and_then(|s| s.parent_key.as_deref());
                    match parent {
                        Some(parent) => {
                            let slot = doc
                                .entry(parent.to_string())
                                .or_insert_with(|| Value::Object(JsonMap::new()));
                            if let Some(slot) = slot.as_object_mut() {
                                slot.insert(name.clone(), value);
                            }
                        }
                        None => {
                            doc.insert(name.clone(), value);
                        }
                    }
                }
                Err(e) => {
                    log::error!("dropping stat '{name}': {e}");
                }
            }
        }
        Value::Object(doc)
    }

    fn normalize_value(
        &self,
        raw: &Value,
        key: Option<&str>,
        property_key: Option<&str>,
        rename_keys_by_pattern: Option<&RenameKeysSpec>,
        steps: &[NormalizationStep],
    ) -> TelemetryResult<Value> {
        let mut value = reduce(raw);
        if let Some(key) = key {
            value = resolve_key(&value, key);
        }
        if let Some(spec) = rename_keys_by_pattern {
            value = rules::rename_keys(value, spec);
        }
        let ctx = StepContext {
            functions: &self.functions,
            property_key,
        };
        rules::apply_steps(value, steps, &ctx)
    }
}

/// Collapse the REST response scaffolding around actual values
pub fn reduce(raw: &Value) -> Value {
    match raw {
        Value::Object(obj) => {
            if obj.len() == 1 {
                if let Some(inner) = obj.get("nestedStats") {
                    return reduce(inner);
                }
            }

            let mut out = JsonMap::new();
            for (key, child) in obj {
                if METADATA_KEYS.contains(&key.as_str()) {
                    continue;
                }
                out.insert(decode_key(key), reduce(child));
            }

            // A wrapper whose only payload was its entries map collapses
            // to the map itself
            if out.len() == 1 && matches!(out.get("entries"), Some(Value::Object(_))) {
                return out.remove("entries").expect("checked above");
            }
            // Single-key value/description leaves collapse to the scalar
            if out.len() == 1 {
                if let Some(inner) = out.get("value").or_else(|| out.get("description")) {
                    return inner.clone();
                }
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(reduce).collect()),
        scalar => scalar.clone(),
    }
}

/// Walk a `::`-separated path; components match child keys exactly or by
/// substring (self-link URL keys). Missing components degrade to `{}`.
pub fn resolve_key(value: &Value, key: &str) -> Value {
    let mut node = value;
    for part in key.split("::") {
        match find_child(node, part) {
            Some(child) => node = child,
            None => {
                log::debug!("key '{key}': component '{part}' not found");
                return Value::Object(JsonMap::new());
            }
        }
    }
    node.clone()
}

fn find_child<'a>(node: &'a Value, part: &str) -> Option<&'a Value> {
    let obj = node.as_object()?;
    if let Some(direct) = obj.get(part) {
        return Some(direct);
    }
    obj.iter()
        .find(|(key, _)| key.contains(part))
        .map(|(_, child)| child)
}

fn decode_key(key: &str) -> String {
    key.replace("%25", "%")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn version_stats() -> Value {
        json!({
            "kind": "tm:sys:version:versionstats",
            "selfLink": "https://localhost/mgmt/tm/sys/version?ver=14.1.0",
            "entries": {
                "https://localhost/mgmt/tm/sys/version/0": {
                    "nestedStats": {
                        "entries": {
                            "Version": { "description": "Version" },
                            "Build": { "description": "0.0.1" }
                        }
                    }
                }
            }
        })
    }

    #[test]
    fn test_reduce_collapses_rest_scaffolding() {
        let reduced = reduce(&version_stats());
        assert_eq!(
            reduced,
            json!({
                "https://localhost/mgmt/tm/sys/version/0": {
                    "Version": "Version",
                    "Build": "0.0.1"
                }
            })
        );
    }

    #[test]
    fn test_data_resolves_key_to_scalar() {
        let normalizer = Normalizer::new();
        let options: DataNormalizationOptions =
            serde_json::from_value(json!({ "key": "sys/version/0::Version" })).unwrap();
        let out = normalizer.data(&version_stats(), &options).unwrap();
        assert_eq!(out, json!("Version"));
    }

    #[test]
    fn test_missing_path_degrades_to_empty_object() {
        let normalizer = Normalizer::new();
        let options: DataNormalizationOptions =
            serde_json::from_value(json!({ "key": "sys/version/0::NoSuchField" })).unwrap();
        let out = normalizer.data(&version_stats(), &options).unwrap();
        assert_eq!(out, json!({}));
    }

    #[test]
    fn test_percent_decode_in_key_names() {
        let raw = json!({ "util%25": { "value": 80 } });
        assert_eq!(reduce(&raw), json!({ "util%": 80 }));
    }

    #[test]
    fn test_global_rename_runs_before_rule_chain() {
        let normalizer = Normalizer::new();
        let raw = json!({ "oneMinLoadAvg": { "value": 3 } });
        let options: DataNormalizationOptions = serde_json::from_value(json!({
            "renameKeysByPattern": {
                "patterns": { "loadAverage1Min": "oneMinLoadAvg" }
            },
            "normalization": [
                { "filterKeys": { "include": ["loadAverage1Min"] } }
            ]
        }))
        .unwrap();
        let out = normalizer.data(&raw, &options).unwrap();
        assert_eq!(out, json!({ "loadAverage1Min": 3 }));
    }

    #[test]
    fn test_collect_drops_failing_stat_and_keeps_rest() {
        let normalizer = Normalizer::new();
        let table = json!({
            "hostname": { "key": "global-settings::hostname" },
            "broken": {
                "normalization": [
                    { "runFunctions": [{ "name": "getAverage", "args": { "key": "none" } }] }
                ]
            }
        });
        let properties = Properties::from_value(&table).unwrap();
        let raw = json!({
            "global-settings": { "hostname": { "description": "bigip1.example.com" } }
        });
        let doc = normalizer.collect(&raw, &properties, None);
        assert_eq!(doc["hostname"], "bigip1.example.com");
        assert!(doc.get("broken").is_none());
    }

    #[test]
    fn test_collect_nests_under_parent_key() {
        let normalizer = Normalizer::new();
        let table = json!({
            "tmstats": { "structure": { "folder": true } },
            "cpuInfoStat": {
                "key": "cpu-info",
                "structure": { "parentKey": "tmstats" }
            }
        });
        let properties = Properties::from_value(&table).unwrap();
        let raw = json!({ "cpu-info": { "value": 4 } });
        let doc = normalizer.collect(&raw, &properties, None);
        assert_eq!(doc["tmstats"]["cpuInfoStat"], 4);
    }
}
