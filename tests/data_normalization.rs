// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end data normalization: raw REST response trees through
//! property-driven rule chains.

use serde_json::{json, Value};
use statflux_rust::{DataNormalizationOptions, Normalizer, Properties};

fn options(value: Value) -> DataNormalizationOptions {
    let _ = env_logger::builder().is_test(true).try_init();
    serde_json::from_value(value).unwrap()
}

#[test]
fn test_version_stat_resolves_to_scalar() {
    let raw = json!({
        "kind": "tm:sys:version:versionstats",
        "selfLink": "https://localhost/mgmt/tm/sys/version?ver=14.1.0",
        "entries": {
            "https://localhost/mgmt/tm/sys/version/0": {
                "nestedStats": {
                    "entries": {
                        "Version": { "description": "Version" }
                    }
                }
            }
        }
    });
    let normalizer = Normalizer::new();
    let out = normalizer
        .data(&raw, &options(json!({ "key": "sys/version/0::Version" })))
        .unwrap();
    assert_eq!(out, json!("Version"));
}

#[test]
fn test_pool_stats_pipeline() {
    // items array -> map keyed by pool name, tenant tags injected, URL-ish
    // keys renamed via capture group
    let raw = json!({
        "kind": "tm:ltm:pool:poolcollectionstate",
        "items": [
            {
                "name": "/Common/app.app/pool1",
                "activeMemberCnt": { "value": 2 },
                "curSessions": { "value": 7 }
            },
            {
                "name": "/Common/pool2",
                "activeMemberCnt": { "value": 0 },
                "curSessions": { "value": 0 }
            }
        ]
    });
    let opts = options(json!({
        "key": "items",
        "normalization": [
            { "convertArrayToMap": { "keyName": "name" } },
            { "addKeysByTag": {
                "tags": { "tenant": "`T`", "application": "`A`" },
                "opts": { "locations": { ".*": true } }
            } }
        ]
    }));
    let out = Normalizer::new().data(&raw, &opts).unwrap();

    assert_eq!(out["/Common/app.app/pool1"]["activeMemberCnt"], 2);
    assert_eq!(out["/Common/app.app/pool1"]["tenant"], "Common");
    assert_eq!(out["/Common/app.app/pool1"]["application"], "app.app");
    assert_eq!(out["/Common/pool2"]["tenant"], "Common");
    assert!(out["/Common/pool2"].get("application").is_none());
}

#[test]
fn test_convert_array_to_map_round_trip_properties() {
    let normalizer = Normalizer::new();

    let convert = options(json!({
        "key": "list",
        "normalization": [ { "convertArrayToMap": { "keyName": "name" } } ]
    }));
    let out = normalizer
        .data(&json!({ "list": [{ "name": "foo" }] }), &convert)
        .unwrap();
    assert_eq!(out, json!({ "foo": { "name": "foo" } }));

    // Empty input: {} without the skip option, [] with it
    let out = normalizer.data(&json!({ "list": [] }), &convert).unwrap();
    assert_eq!(out, json!({}));

    let convert_skip = options(json!({
        "key": "list",
        "normalization": [
            { "convertArrayToMap": { "keyName": "name", "skipWhenKeyMissing": true } }
        ]
    }));
    let out = normalizer.data(&json!({ "list": [] }), &convert_skip).unwrap();
    assert_eq!(out, json!([]));
}

#[test]
fn test_tag_isolation_between_records() {
    let normalizer = Normalizer::new();
    let opts = options(json!({
        "normalization": [
            { "addKeysByTag": { "tags": { "meta": { "region": "west" } } } }
        ]
    }));

    let mut first = normalizer.data(&json!({ "a": 1 }), &opts).unwrap();
    let second = normalizer.data(&json!({ "b": 2 }), &opts).unwrap();

    first["meta"]["region"] = json!("east");
    assert_eq!(second["meta"]["region"], "west");

    // The definition itself is untouched: a third record still gets the
    // original value
    let third = normalizer.data(&json!({ "c": 3 }), &opts).unwrap();
    assert_eq!(third["meta"]["region"], "west");
}

#[test]
fn test_include_first_entry_with_derived_percentage() {
    let raw = json!({
        "entries": {
            "https://localhost/mgmt/tm/sys/host-info/0/stats": {
                "nestedStats": {
                    "entries": {
                        "memoryTotal": { "value": 4096 },
                        "memoryUsed": { "value": 1024 }
                    }
                }
            }
        }
    });
    let opts = options(json!({
        "normalization": [
            { "includeFirstEntry": { "pattern": "/stats" } },
            { "runFunctions": [
                { "name": "getPercentFromKeys",
                  "args": { "totalKey": "memoryTotal", "partialKey": "memoryUsed" } }
            ] }
        ]
    }));
    let out = Normalizer::new().data(&raw, &opts).unwrap();
    assert_eq!(out, json!(25));
}

#[test]
fn test_run_functions_failure_is_wrapped_and_fatal_to_stat() {
    let opts = options(json!({
        "normalization": [
            { "runFunctions": [{ "name": "getFirstKey" }] }
        ]
    }));
    let err = Normalizer::new().data(&json!({}), &opts).unwrap_err();
    let message = err.to_string();
    assert!(message.starts_with("runCustomFunction 'getFirstKey' failed:"));
}

#[test]
fn test_collect_full_table() {
    let table = json!({
        "hostname": { "key": "global-settings::hostname" },
        "version": { "key": "version::sys/version/0::Version" },
        "tmstats": { "structure": { "folder": true } },
        "memoryUsagePct": {
            "key": "host-info",
            "structure": { "parentKey": "tmstats" },
            "normalization": [
                { "includeFirstEntry": { "pattern": "/stats" } },
                { "runFunctions": [
                    { "name": "getPercentFromKeys",
                      "args": { "totalKey": "memoryTotal", "partialKey": "memoryUsed" } }
                ] }
            ]
        }
    });
    let raw = json!({
        "global-settings": { "hostname": { "description": "bigip1.example.com" } },
        "version": {
            "entries": {
                "https://localhost/mgmt/tm/sys/version/0": {
                    "nestedStats": { "entries": { "Version": { "description": "14.1.0" } } }
                }
            }
        },
        "host-info": {
            "entries": {
                "https://localhost/mgmt/tm/sys/host-info/0/stats": {
                    "nestedStats": {
                        "entries": {
                            "memoryTotal": { "value": 8192 },
                            "memoryUsed": { "value": 2048 }
                        }
                    }
                }
            }
        }
    });

    let properties = Properties::from_value(&table).unwrap();
    let doc = Normalizer::new().collect(&raw, &properties, None);

    assert_eq!(doc["hostname"], "bigip1.example.com");
    assert_eq!(doc["version"], "14.1.0");
    assert_eq!(doc["tmstats"]["memoryUsagePct"], 25);
}

#[test]
fn test_missing_branch_degrades_to_empty_object() {
    let opts = options(json!({ "key": "no/such::path" }));
    let out = Normalizer::new().data(&json!({ "a": 1 }), &opts).unwrap();
    assert_eq!(out, json!({}));
}
