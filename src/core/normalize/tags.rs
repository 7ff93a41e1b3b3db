// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tag Injection (`addKeysByTag`)
//!
//! Injects additional key-value pairs into normalized records. A tag value
//! is either a literal (copied into each record) or one of two markers that
//! derive multi-tenancy information from a path-like string on the record
//! itself:
//!
//! - `` `T` ``: tenant, the first segment of `/Tenant/...`
//! - `` `A` ``: application, the second segment when it carries the `.app`
//!   suffix (`/Tenant/Application.app/object`)
//!
//! A path with no application partition (`/Tenant/object`) yields a tenant
//! tag only; no application key is emitted.
//!
//! Literal tag values are deep-copied per record: two records tagged from
//! the same definition never share a nested value, so mutating one record's
//! tag cannot leak into another record or back into the definition table.

use serde::Deserialize;
use serde_json::{Map as JsonMap, Value};

use super::pattern;

/// Marker resolved to the tenant segment of a path-like value
pub const TENANT_MARKER: &str = "`T`";
/// Marker resolved to the application segment of a path-like value
pub const APPLICATION_MARKER: &str = "`A`";

/// Configuration for one `addKeysByTag` rule step
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AddKeysByTagSpec {
    /// Output key -> literal value or classification marker
    pub tags: JsonMap<String, Value>,
    /// Override the path grammar used to resolve markers
    pub definitions: Option<TagPatternDefinitions>,
    pub opts: TagOptions,
}

/// Options controlling where and how tags are injected
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TagOptions {
    /// Property names whose values are the classification candidates
    pub classify_by_keys: Option<Vec<String>>,
    /// Property names skipped when scanning for classification candidates
    pub skip: Option<Vec<String>>,
    /// Additional static tags merged in alongside the classified ones
    pub tags: Option<JsonMap<String, Value>>,
    /// Nested map of key regexes selecting which data nodes receive tags;
    /// a `true` leaf marks an injection point
    pub locations: Option<Value>,
}

/// Capture-group patterns extracting tenant and application from a path
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagPatternDefinitions {
    pub tenant: GroupPattern,
    pub application: GroupPattern,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupPattern {
    pub pattern: String,
    pub group: usize,
}

impl Default for TagPatternDefinitions {
    fn default() -> Self {
        Self {
            tenant: GroupPattern {
                pattern: r"^/([^/]+)".to_string(),
                group: 1,
            },
            application: GroupPattern {
                pattern: r"^/[^/]+/([^/]+\.app)(?:/|$)".to_string(),
                group: 1,
            },
        }
    }
}

impl GroupPattern {
    fn extract(&self, value: &str) -> Option<String> {
        let re = pattern::compile(&self.pattern)?;
        let caps = re.captures(value)?;
        Some(caps.get(self.group)?.as_str().to_string())
    }
}

/// Inject tags into `node` according to `spec`.
///
/// Without `opts.locations` the tags land once at the top level of `node`;
/// with locations, only data nodes reachable via the listed key patterns
/// receive them. Non-object nodes are left untouched.
pub fn add_tags(node: &mut Value, spec: &AddKeysByTagSpec) {
    let definitions = spec.definitions.clone().unwrap_or_default();
    match spec.opts.locations.as_ref().and_then(Value::as_object) {
        Some(locations) => apply_at_locations(node, locations, spec, &definitions),
        None => inject(node, None, spec, &definitions),
    }
}

fn apply_at_locations(
    node: &mut Value,
    locations: &JsonMap<String, Value>,
    spec: &AddKeysByTagSpec,
    definitions: &TagPatternDefinitions,
) {
    let Some(obj) = node.as_object_mut() else {
        return;
    };
    for (location_pattern, nested) in locations {
        let matching: Vec<String> = obj
            .keys()
            .filter(|key| pattern::is_match(location_pattern, key))
            .cloned()
            .collect();
        for key in matching {
            let Some(child) = obj.get_mut(&key) else {
                continue;
            };
            match nested {
                Value::Object(next) => apply_at_locations(child, next, spec, definitions),
                _ => inject(child, Some(&key), spec, definitions),
            }
        }
    }
}

fn inject(
    target: &mut Value,
    item_key: Option<&str>,
    spec: &AddKeysByTagSpec,
    definitions: &TagPatternDefinitions,
) {
    if !target.is_object() {
        return;
    }

    let empty = JsonMap::new();
    let extra = spec.opts.tags.as_ref().unwrap_or(&empty);
    for (name, value) in spec.tags.iter().chain(extra.iter()) {
        let resolved = match value.as_str() {
            Some(TENANT_MARKER) => classify(target, item_key, spec, &definitions.tenant),
            Some(APPLICATION_MARKER) => classify(target, item_key, spec, &definitions.application),
            // Deep copy keeps each record's tag value independent of the
            // shared definition table.
            _ => Some(value.clone()),
        };
        if let Some(resolved) = resolved {
            target
                .as_object_mut()
                .expect("checked object above")
                .insert(name.clone(), resolved);
        }
    }
}

/// Find the first classification candidate on `target` that the pattern
/// accepts: explicit `classifyByKeys` values first, then the record's own
/// key, then a scan over string properties (honoring `skip`).
fn classify(
    target: &Value,
    item_key: Option<&str>,
    spec: &AddKeysByTagSpec,
    group_pattern: &GroupPattern,
) -> Option<Value> {
    let obj = target.as_object()?;

    if let Some(keys) = &spec.opts.classify_by_keys {
        for key in keys {
            if let Some(candidate) = obj.get(key).and_then(Value::as_str) {
                if let Some(found) = group_pattern.extract(candidate) {
                    return Some(Value::String(found));
                }
            }
        }
    }

    if let Some(key) = item_key {
        if let Some(found) = group_pattern.extract(key) {
            return Some(Value::String(found));
        }
    }

    let skip = spec.opts.skip.as_deref().unwrap_or(&[]);
    for (prop, value) in obj {
        if skip.iter().any(|s| s == prop) {
            continue;
        }
        if let Some(candidate) = value.as_str() {
            if let Some(found) = group_pattern.extract(candidate) {
                return Some(Value::String(found));
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec_from(value: Value) -> AddKeysByTagSpec {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_tenant_and_application_from_path() {
        let spec = spec_from(json!({
            "tags": { "tenant": "`T`", "application": "`A`" }
        }));
        let mut node = json!({ "name": "/Common/app.app/serviceMain" });
        add_tags(&mut node, &spec);
        assert_eq!(node["tenant"], "Common");
        assert_eq!(node["application"], "app.app");
    }

    #[test]
    fn test_no_application_partition_emits_tenant_only() {
        let spec = spec_from(json!({
            "tags": { "tenant": "`T`", "application": "`A`" }
        }));
        let mut node = json!({ "name": "/Common/pool1" });
        add_tags(&mut node, &spec);
        assert_eq!(node["tenant"], "Common");
        assert!(node.get("application").is_none());
    }

    #[test]
    fn test_literal_tags_are_independent_copies() {
        let spec = spec_from(json!({
            "tags": { "facility": { "datacenter": "west" } }
        }));
        let mut first = json!({});
        let mut second = json!({});
        add_tags(&mut first, &spec);
        add_tags(&mut second, &spec);

        first["facility"]["datacenter"] = json!("east");
        assert_eq!(second["facility"]["datacenter"], "west");
    }

    #[test]
    fn test_locations_scope_injection() {
        let spec = spec_from(json!({
            "tags": { "tenant": "`T`" },
            "opts": { "locations": { "pools": { ".*": true } } }
        }));
        let mut node = json!({
            "pools": {
                "/Common/pool1": { "activeMemberCnt": 2 },
                "/Common/pool2": { "activeMemberCnt": 0 }
            },
            "untouched": { "name": "/Common/ignored" }
        });
        add_tags(&mut node, &spec);
        assert_eq!(node["pools"]["/Common/pool1"]["tenant"], "Common");
        assert_eq!(node["pools"]["/Common/pool2"]["tenant"], "Common");
        assert!(node["untouched"].get("tenant").is_none());
    }

    #[test]
    fn test_classify_by_keys_takes_precedence() {
        let spec = spec_from(json!({
            "tags": { "tenant": "`T`" },
            "opts": { "classifyByKeys": ["virtualName"] }
        }));
        let mut node = json!({
            "name": "/Wrong/value",
            "virtualName": "/Tenant1/vs1"
        });
        add_tags(&mut node, &spec);
        assert_eq!(node["tenant"], "Tenant1");
    }

    #[test]
    fn test_skip_excludes_scan_candidates() {
        let spec = spec_from(json!({
            "tags": { "tenant": "`T`" },
            "opts": { "skip": ["selfLink"] }
        }));
        let mut node = json!({
            "selfLink": "/Skipped/value",
            "destination": "/Common/10.0.0.1:80"
        });
        add_tags(&mut node, &spec);
        assert_eq!(node["tenant"], "Common");
    }

    #[test]
    fn test_extra_static_tags_merged() {
        let spec = spec_from(json!({
            "tags": { "tenant": "`T`" },
            "opts": { "tags": { "source": "poller" } }
        }));
        let mut node = json!({ "name": "/Common/pool1" });
        add_tags(&mut node, &spec);
        assert_eq!(node["source"], "poller");
        assert_eq!(node["tenant"], "Common");
    }

    #[test]
    fn test_unresolvable_marker_emits_nothing() {
        let spec = spec_from(json!({
            "tags": { "tenant": "`T`" }
        }));
        let mut node = json!({ "name": "plain-name" });
        add_tags(&mut node, &spec);
        assert!(node.get("tenant").is_none());
    }
}
