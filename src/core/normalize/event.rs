// SPDX-License-Identifier: MIT OR Apache-2.0

//! Event Normalization
//!
//! Line-oriented input from device log sources arrives either as JSON or as
//! a syslog-style `key="value",key2="value2"` string.
//!
//! - JSON input is trusted as already structured: it is never
//!   key=value-parsed and never timestamp-reformatted, regardless of
//!   options. Its category is kept when the payload carries a recognized
//!   `telemetryEventCategory`, which also makes normalization idempotent.
//! - Plain strings are split on unescaped/unquoted commas, each segment on
//!   its first `=`; the category is classified by the first rule whose
//!   discriminating fields are all present.
//!
//! Every normalized event carries `telemetryEventCategory` and
//! `originalRawData` (the untouched input).

use serde::Deserialize;
use serde_json::{Map as JsonMap, Value};

use crate::core::properties;

use super::rules::{self, RenameKeysSpec};
use super::tags::{self, AddKeysByTagSpec};

/// Category given to events no classifier recognizes
pub const DEFAULT_EVENT_CATEGORY: &str = "event";
/// Output (and reserved inbound) category field
pub const CATEGORY_KEY: &str = "telemetryEventCategory";
/// Output field carrying the untouched input
pub const ORIGINAL_RAW_DATA_KEY: &str = "originalRawData";

/// One classification rule: when every listed field is present on the
/// parsed event, the event belongs to `category`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifyRule {
    pub keys: Vec<String>,
    pub category: String,
}

/// Options for [`event`]
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EventNormalizationOptions {
    pub rename_keys_by_pattern: Option<RenameKeysSpec>,
    pub format_timestamps: Option<Vec<String>>,
    pub add_keys_by_tag: Option<AddKeysByTagSpec>,
    /// Classification table; the built-in table applies when unset
    pub classifiers: Option<Vec<ClassifyRule>>,
}

/// Normalize one raw event
pub fn event(raw: &Value, options: &EventNormalizationOptions) -> Value {
    let classifiers = options
        .classifiers
        .as_deref()
        .unwrap_or_else(|| properties::default_event_classifiers());

    if let Some(obj) = as_json_object(raw) {
        return normalize_json_event(obj, raw, options, classifiers);
    }

    let raw_string = match raw {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    normalize_string_event(&raw_string, options, classifiers)
}

/// The input as a JSON object: either directly, or a string whose content
/// parses to one
fn as_json_object(raw: &Value) -> Option<JsonMap<String, Value>> {
    match raw {
        Value::Object(obj) => Some(obj.clone()),
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(Value::Object(obj)) => Some(obj),
            _ => None,
        },
        _ => None,
    }
}

fn normalize_json_event(
    mut data: JsonMap<String, Value>,
    raw: &Value,
    options: &EventNormalizationOptions,
    classifiers: &[ClassifyRule],
) -> Value {
    let recognized = data
        .get(CATEGORY_KEY)
        .and_then(Value::as_str)
        .map(|category| is_known_category(category, classifiers))
        .unwrap_or(false);
    if !recognized {
        data.insert(
            CATEGORY_KEY.to_string(),
            Value::String(DEFAULT_EVENT_CATEGORY.to_string()),
        );
    }
    if !data.contains_key(ORIGINAL_RAW_DATA_KEY) {
        let raw_string = match raw {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        data.insert(ORIGINAL_RAW_DATA_KEY.to_string(), Value::String(raw_string));
    }

    let mut value = Value::Object(data);
    if let Some(spec) = &options.add_keys_by_tag {
        tags::add_tags(&mut value, spec);
    }
    value
}

fn normalize_string_event(
    raw: &str,
    options: &EventNormalizationOptions,
    classifiers: &[ClassifyRule],
) -> Value {
    let pairs = parse_key_value_pairs(raw);
    let data = if pairs.is_empty() {
        let mut map = JsonMap::new();
        map.insert("data".to_string(), Value::String(raw.to_string()));
        map
    } else {
        pairs
    };

    let category = classifiers
        .iter()
        .find(|rule| rule.keys.iter().all(|key| data.contains_key(key)))
        .map(|rule| rule.category.clone())
        .unwrap_or_else(|| DEFAULT_EVENT_CATEGORY.to_string());

    let mut value = Value::Object(data);
    if let Some(spec) = &options.rename_keys_by_pattern {
        value = rules::rename_keys(value, spec);
    }
    if let Some(keys) = &options.format_timestamps {
        value = rules::format_timestamps(value, keys, None);
    }
    if let Some(spec) = &options.add_keys_by_tag {
        tags::add_tags(&mut value, spec);
    }

    if let Value::Object(obj) = &mut value {
        obj.insert(CATEGORY_KEY.to_string(), Value::String(category));
        obj.insert(
            ORIGINAL_RAW_DATA_KEY.to_string(),
            Value::String(raw.to_string()),
        );
    }
    value
}

fn is_known_category(category: &str, classifiers: &[ClassifyRule]) -> bool {
    category == DEFAULT_EVENT_CATEGORY
        || classifiers.iter().any(|rule| rule.category == category)
}

/// Split a syslog-style line into key-value pairs.
///
/// Segments are separated by commas outside double quotes; a segment
/// contributes a pair only when it carries a `=` and the part before it is
/// a plain word (no whitespace); free-text segments are not mistaken for
/// pairs. Surrounding quotes are stripped from values.
fn parse_key_value_pairs(raw: &str) -> JsonMap<String, Value> {
    let mut pairs = JsonMap::new();
    for segment in split_unquoted_commas(raw) {
        let Some(eq) = segment.find('=') else {
            continue;
        };
        let key = segment[..eq].trim();
        if key.is_empty() || key.chars().any(char::is_whitespace) {
            continue;
        }
        let value = unquote(segment[eq + 1..].trim());
        pairs.insert(key.to_string(), Value::String(value));
    }
    pairs
}

fn split_unquoted_commas(raw: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;
    let mut escaped = false;
    for (idx, ch) in raw.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' => escaped = true,
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                segments.push(&raw[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    segments.push(&raw[start..]);
    segments
}

fn unquote(value: &str) -> String {
    let stripped = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value);
    stripped.replace("\\\"", "\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plain_syslog_line_stays_raw() {
        let raw = json!("<100> some syslog event: host=x.x.x.x");
        let out = event(&raw, &EventNormalizationOptions::default());
        assert_eq!(
            out,
            json!({
                "data": "<100> some syslog event: host=x.x.x.x",
                "telemetryEventCategory": "event",
                "originalRawData": "<100> some syslog event: host=x.x.x.x"
            })
        );
    }

    #[test]
    fn test_key_value_line_is_parsed() {
        let raw = json!(r#"acl_policy_name="/Common/policy",acl_rule_name="rule1",ip="10.0.0.1""#);
        let out = event(&raw, &EventNormalizationOptions::default());
        assert_eq!(out["acl_policy_name"], "/Common/policy");
        assert_eq!(out["acl_rule_name"], "rule1");
        assert_eq!(out["telemetryEventCategory"], "firewallEvent");
        assert_eq!(
            out["originalRawData"],
            r#"acl_policy_name="/Common/policy",acl_rule_name="rule1",ip="10.0.0.1""#
        );
    }

    #[test]
    fn test_quoted_commas_are_preserved() {
        let raw = json!(r#"msg="hello, world",code="7""#);
        let out = event(&raw, &EventNormalizationOptions::default());
        assert_eq!(out["msg"], "hello, world");
        assert_eq!(out["code"], "7");
    }

    #[test]
    fn test_json_event_is_passthrough() {
        let raw = json!(r#"{"ip":"10.0.0.1","when":"1546304400"}"#);
        let opts: EventNormalizationOptions =
            serde_json::from_value(json!({ "formatTimestamps": ["when"] })).unwrap();
        let out = event(&raw, &opts);
        // JSON is trusted: no timestamp reformatting
        assert_eq!(out["when"], "1546304400");
        assert_eq!(out["telemetryEventCategory"], "event");
        assert_eq!(out["originalRawData"], r#"{"ip":"10.0.0.1","when":"1546304400"}"#);
    }

    #[test]
    fn test_json_event_recognized_category_is_kept() {
        let raw = json!({ "telemetryEventCategory": "firewallEvent", "x": 1 });
        let out = event(&raw, &EventNormalizationOptions::default());
        assert_eq!(out["telemetryEventCategory"], "firewallEvent");
    }

    #[test]
    fn test_json_event_unrecognized_category_defaults() {
        let raw = json!({ "telemetryEventCategory": "madeUp", "x": 1 });
        let out = event(&raw, &EventNormalizationOptions::default());
        assert_eq!(out["telemetryEventCategory"], "event");
    }

    #[test]
    fn test_idempotence_with_empty_options() {
        let raw = json!(r#"acl_policy_name="/Common/policy",acl_rule_name="r1""#);
        let first = event(&raw, &EventNormalizationOptions::default());
        let second = event(&first, &EventNormalizationOptions::default());
        assert_eq!(first, second);
    }

    #[test]
    fn test_rename_and_timestamps_apply_to_string_events() {
        let raw = json!(r#"date_time="1546304400",hostname="bigip1""#);
        let opts: EventNormalizationOptions = serde_json::from_value(json!({
            "renameKeysByPattern": { "patterns": { "host": "hostname" } },
            "formatTimestamps": ["date_time"]
        }))
        .unwrap();
        let out = event(&raw, &opts);
        assert_eq!(out["host"], "bigip1");
        assert_eq!(out["date_time"], "2019-01-01T01:00:00.000Z");
    }

    #[test]
    fn test_classification_first_match_wins() {
        let classifiers: Vec<ClassifyRule> = serde_json::from_value(json!([
            { "keys": ["a"], "category": "first" },
            { "keys": ["a", "b"], "category": "second" }
        ]))
        .unwrap();
        let opts = EventNormalizationOptions {
            classifiers: Some(classifiers),
            ..Default::default()
        };
        let out = event(&json!(r#"a="1",b="2""#), &opts);
        assert_eq!(out["telemetryEventCategory"], "first");
    }
}
