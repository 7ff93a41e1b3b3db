// SPDX-License-Identifier: MIT OR Apache-2.0

//! Normalization Rule Steps
//!
//! A stat's `normalization` property is an ordered list of rule steps; each
//! step is pure (value in, value out) and receives the output of the
//! previous step. The vocabulary is fixed:
//!
//! | Step | Effect |
//! |------|--------|
//! | `filterKeys` | keep/drop top-level keys |
//! | `renameKeys` | pattern-based key renaming, first match wins |
//! | `convertArrayToMap` | array of objects -> object keyed by a property |
//! | `includeFirstEntry` | flatten a single matching entry into its parent |
//! | `addKeysByTag` | inject tenant/application/static tags |
//! | `formatTimestamps` | rewrite date values to ISO-8601 UTC |
//! | `runFunctions` | execute named functions from the registry |
//!
//! Malformed input to the structural steps never aborts a collection cycle;
//! the step degrades to a no-op and the value passes through. Only
//! `runFunctions` failures propagate, wrapped with the function name.

use serde::Deserialize;
use serde_json::{Map as JsonMap, Value};

use crate::core::error::TelemetryResult;

use super::functions::FunctionRegistry;
use super::pattern::{self, MatchOptions};
use super::tags::{self, AddKeysByTagSpec};

/// One step of a normalization rule chain, in its property-table JSON form
/// (`{"renameKeys": {...}}`, `{"runFunctions": [...]}`, ...)
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NormalizationStep {
    FilterKeys(FilterKeysSpec),
    RenameKeys(RenameKeysSpec),
    ConvertArrayToMap(ConvertArrayToMapSpec),
    IncludeFirstEntry(IncludeFirstEntrySpec),
    AddKeysByTag(AddKeysByTagSpec),
    FormatTimestamps(Vec<String>),
    RunFunctions(Vec<FunctionCall>),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FilterKeysSpec {
    /// Keys to keep; everything else is dropped silently
    pub include: Option<Vec<String>>,
    /// Keys to drop; applied after `include` when both are given
    pub exclude: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RenameKeysSpec {
    /// Insertion-ordered map of new-name -> pattern spec
    pub patterns: JsonMap<String, Value>,
    pub options: RenameOptions,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RenameOptions {
    pub exact_match: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertArrayToMapSpec {
    /// Property of each array item whose value becomes the map key
    pub key_name: String,
    #[serde(default)]
    pub key_name_prefix: Option<String>,
    /// When set, an item without `keyName` leaves the whole array untouched
    #[serde(default)]
    pub skip_when_key_missing: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncludeFirstEntrySpec {
    pub pattern: String,
    #[serde(default)]
    pub exclude_pattern: Option<String>,
    #[serde(default)]
    pub run_functions: Vec<FunctionCall>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub args: Option<Value>,
}

/// Ambient state a rule chain executes against
#[derive(Debug, Clone, Copy)]
pub struct StepContext<'a> {
    pub functions: &'a FunctionRegistry,
    /// Name of the stat being normalized; lets `formatTimestamps` target a
    /// raw scalar node directly
    pub property_key: Option<&'a str>,
}

/// Apply the steps in listed order, each receiving the previous output
pub fn apply_steps(
    value: Value,
    steps: &[NormalizationStep],
    ctx: &StepContext,
) -> TelemetryResult<Value> {
    let mut current = value;
    for step in steps {
        current = apply_step(current, step, ctx)?;
    }
    Ok(current)
}

fn apply_step(value: Value, step: &NormalizationStep, ctx: &StepContext) -> TelemetryResult<Value> {
    match step {
        NormalizationStep::FilterKeys(spec) => Ok(filter_keys(value, spec)),
        NormalizationStep::RenameKeys(spec) => Ok(rename_keys(value, spec)),
        NormalizationStep::ConvertArrayToMap(spec) => Ok(convert_array_to_map(value, spec)),
        NormalizationStep::IncludeFirstEntry(spec) => include_first_entry(value, spec, ctx),
        NormalizationStep::AddKeysByTag(spec) => {
            let mut value = value;
            tags::add_tags(&mut value, spec);
            Ok(value)
        }
        NormalizationStep::FormatTimestamps(keys) => {
            Ok(format_timestamps(value, keys, ctx.property_key))
        }
        NormalizationStep::RunFunctions(calls) => run_functions(value, calls, ctx),
    }
}

/// `filterKeys`: shallow include/exclude over an object's keys
pub fn filter_keys(value: Value, spec: &FilterKeysSpec) -> Value {
    let obj = match value {
        Value::Object(obj) => obj,
        other => return other,
    };
    let mut out = JsonMap::new();
    for (key, child) in obj {
        if let Some(include) = &spec.include {
            if !include.iter().any(|k| k == &key) {
                continue;
            }
        }
        if let Some(exclude) = &spec.exclude {
            if exclude.iter().any(|k| k == &key) {
                continue;
            }
        }
        out.insert(key, child);
    }
    Value::Object(out)
}

/// `renameKeys`: recursive pattern-based key renaming; the first matching
/// pattern in insertion order wins and later patterns are not tried
pub fn rename_keys(value: Value, spec: &RenameKeysSpec) -> Value {
    let opts = MatchOptions {
        exact_match: spec.options.exact_match,
    };
    match value {
        Value::Object(obj) => {
            let mut out = JsonMap::new();
            for (key, child) in obj {
                let renamed = match pattern::match_key(&key, &spec.patterns, &opts) {
                    Some(m) => m.renamed().to_string(),
                    None => key,
                };
                out.insert(renamed, rename_keys(child, spec));
            }
            Value::Object(out)
        }
        Value::Array(items) => {
            Value::Array(items.into_iter().map(|item| rename_keys(item, spec)).collect())
        }
        other => other,
    }
}

/// `convertArrayToMap`: array of objects to an object keyed by
/// `keyNamePrefix + item[keyName]`
pub fn convert_array_to_map(value: Value, spec: &ConvertArrayToMapSpec) -> Value {
    let items = match value {
        Value::Array(items) => items,
        other => return other,
    };
    if items.is_empty() {
        return if spec.skip_when_key_missing {
            Value::Array(items)
        } else {
            Value::Object(JsonMap::new())
        };
    }
    // No partial conversion: one missing key leaves the array untouched
    if spec.skip_when_key_missing
        && items.iter().any(|item| item.get(&spec.key_name).is_none())
    {
        return Value::Array(items);
    }

    let prefix = spec.key_name_prefix.as_deref().unwrap_or("");
    let mut out = JsonMap::new();
    for item in items {
        let key = match item.get(&spec.key_name) {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => {
                log::debug!("convertArrayToMap: item without '{}' dropped", spec.key_name);
                continue;
            }
        };
        out.insert(format!("{prefix}{key}"), item);
    }
    Value::Object(out)
}

/// `includeFirstEntry`: flatten a single pattern-matched entry into its
/// parent. Zero or multiple matches leave the structure as-is: ambiguous
/// cases are not flattened.
pub fn include_first_entry(
    value: Value,
    spec: &IncludeFirstEntrySpec,
    ctx: &StepContext,
) -> TelemetryResult<Value> {
    let mut obj = match value {
        Value::Object(obj) => obj,
        other => return Ok(other),
    };

    // The entries may still sit under an explicit `entries` wrapper, or the
    // reduce pass may already have lifted them to the node itself.
    let scans_wrapper = matches!(obj.get("entries"), Some(Value::Object(_)));
    let scan_target = if scans_wrapper {
        obj.get("entries").and_then(Value::as_object).expect("checked above")
    } else {
        &obj
    };

    let matches: Vec<String> = scan_target
        .keys()
        .filter(|key| pattern::is_match(&spec.pattern, key))
        .filter(|key| {
            spec.exclude_pattern
                .as_deref()
                .map(|ex| !pattern::is_match(ex, key))
                .unwrap_or(true)
        })
        .cloned()
        .collect();
    if matches.len() != 1 {
        return Ok(Value::Object(obj));
    }
    let matched_key = &matches[0];

    // Only object entries can be flattened into the parent; anything else
    // leaves the structure as-is
    let lookup = if scans_wrapper {
        obj.get("entries").and_then(|entries| entries.get(matched_key))
    } else {
        obj.get(matched_key)
    };
    if !lookup.map(Value::is_object).unwrap_or(false) {
        return Ok(Value::Object(obj));
    }

    let entry = if scans_wrapper {
        match obj.remove("entries") {
            // Anything else under the wrapper is superseded by the flatten
            Some(Value::Object(mut entries)) => entries.remove(matched_key),
            _ => None,
        }
    } else {
        obj.remove(matched_key)
    };
    if let Some(Value::Object(fields)) = entry {
        for (key, child) in fields {
            obj.insert(key, child);
        }
    }

    run_functions(Value::Object(obj), &spec.run_functions, ctx)
}

/// `formatTimestamps`: rewrite the listed keys' values to ISO-8601 UTC.
/// Accepts RFC 3339 / RFC 2822 strings, `"January 01, 2019 01:00:00 UTC"`
/// style human dates, and epoch seconds (string or number). Anything else
/// is left untouched.
pub fn format_timestamps(value: Value, keys: &[String], property_key: Option<&str>) -> Value {
    match value {
        Value::Object(obj) => {
            let mut out = JsonMap::new();
            for (key, child) in obj {
                let listed = keys.iter().any(|k| k == &key);
                let child = match child {
                    Value::Object(_) | Value::Array(_) => {
                        format_timestamps(child, keys, property_key)
                    }
                    scalar if listed => match reformat_timestamp(&scalar) {
                        Some(iso) => Value::String(iso),
                        None => scalar,
                    },
                    scalar => scalar,
                };
                out.insert(key, child);
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| format_timestamps(item, keys, property_key))
                .collect(),
        ),
        // A stat that resolved to a raw scalar is formatted directly when
        // its own name is listed.
        scalar => {
            let applies = property_key
                .map(|pk| keys.iter().any(|k| k == pk))
                .unwrap_or(false);
            match applies.then(|| reformat_timestamp(&scalar)).flatten() {
                Some(iso) => Value::String(iso),
                None => scalar,
            }
        }
    }
}

fn reformat_timestamp(value: &Value) -> Option<String> {
    use chrono::{DateTime, NaiveDateTime, SecondsFormat, TimeZone, Utc};

    let to_iso =
        |dt: DateTime<Utc>| -> String { dt.to_rfc3339_opts(SecondsFormat::Millis, true) };

    match value {
        Value::String(s) => {
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(to_iso(dt.with_timezone(&Utc)));
            }
            if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
                return Some(to_iso(dt.with_timezone(&Utc)));
            }
            if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%B %d, %Y %H:%M:%S UTC") {
                return Some(to_iso(Utc.from_utc_datetime(&naive)));
            }
            // Epoch-seconds fallback, attempted last
            if let Ok(secs) = s.parse::<i64>() {
                return Utc.timestamp_opt(secs, 0).single().map(to_iso);
            }
            None
        }
        Value::Number(n) => {
            if let Some(secs) = n.as_i64() {
                return Utc.timestamp_opt(secs, 0).single().map(to_iso);
            }
            let millis = (n.as_f64()? * 1000.0) as i64;
            Utc.timestamp_millis_opt(millis).single().map(to_iso)
        }
        _ => None,
    }
}

/// `runFunctions`: execute named functions from the registry in listed
/// order; the only step whose failure propagates to the caller
pub fn run_functions(
    value: Value,
    calls: &[FunctionCall],
    ctx: &StepContext,
) -> TelemetryResult<Value> {
    let mut current = value;
    for call in calls {
        current = ctx.functions.run(&call.name, current, call.args.as_ref())?;
    }
    Ok(current)
}
