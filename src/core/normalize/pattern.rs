// SPDX-License-Identifier: MIT OR Apache-2.0

//! Key Pattern Matching
//!
//! Matches a data key against a named set of patterns. Used by the
//! `renameKeys` rule step and by tag classification.
//!
//! A pattern set is an insertion-ordered map of `name -> spec`, where each
//! spec is either:
//!
//! - a plain string: the key must contain it (or equal it with
//!   `exact_match`), and the matching key is renamed to `name`, or
//! - `{ "pattern": "<regex>", "group": <n> }`: the key must match the regex;
//!   when `group` is given the capture group's contents become the
//!   replacement instead of `name`.
//!
//! The first matching pattern in insertion order wins; an empty pattern set
//! matches nothing. Invalid regexes never abort a collection cycle; they
//! are logged and treated as non-matches.

use regex::Regex;
use serde_json::{Map as JsonMap, Value};

/// Options accepted by [`match_key`]
#[derive(Debug, Clone, Copy, Default)]
pub struct MatchOptions {
    /// Require the whole key to match instead of a substring
    pub exact_match: bool,
}

/// A successful pattern match
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyMatch {
    /// Name of the pattern that matched (insertion-order first)
    pub name: String,
    /// Capture-group contents, when the pattern specified a `group`
    pub replacement: Option<String>,
}

impl KeyMatch {
    /// The key name this match renames to
    pub fn renamed(&self) -> &str {
        self.replacement.as_deref().unwrap_or(&self.name)
    }
}

/// One parsed pattern spec
#[derive(Debug, Clone)]
pub enum PatternDef {
    Literal(String),
    Regex { pattern: String, group: Option<usize> },
}

impl PatternDef {
    /// Parse a spec from its JSON form; unrecognized shapes yield `None`
    pub fn from_value(value: &Value) -> Option<PatternDef> {
        match value {
            Value::String(s) => Some(PatternDef::Literal(s.clone())),
            Value::Object(obj) => {
                let pattern = obj.get("pattern")?.as_str()?.to_string();
                let group = obj.get("group").and_then(Value::as_u64).map(|g| g as usize);
                Some(PatternDef::Regex { pattern, group })
            }
            _ => None,
        }
    }

    fn matches(&self, key: &str, opts: &MatchOptions) -> Option<Option<String>> {
        match self {
            PatternDef::Literal(lit) => {
                let matched = if opts.exact_match {
                    key == lit
                } else {
                    key.contains(lit.as_str())
                };
                if matched {
                    Some(None)
                } else {
                    None
                }
            }
            PatternDef::Regex { pattern, group } => {
                let re = compile(pattern)?;
                let caps = re.captures(key)?;
                if opts.exact_match {
                    let whole = caps.get(0)?;
                    if whole.start() != 0 || whole.end() != key.len() {
                        return None;
                    }
                }
                match group {
                    Some(g) => {
                        let captured = caps.get(*g)?;
                        Some(Some(captured.as_str().to_string()))
                    }
                    None => Some(None),
                }
            }
        }
    }
}

/// Match `key` against a named pattern set. Returns the first match in
/// insertion order, or `None` when nothing matches.
pub fn match_key(key: &str, patterns: &JsonMap<String, Value>, opts: &MatchOptions) -> Option<KeyMatch> {
    for (name, spec) in patterns {
        let Some(def) = PatternDef::from_value(spec) else {
            log::debug!("skipping malformed pattern spec for '{name}'");
            continue;
        };
        if let Some(replacement) = def.matches(key, opts) {
            return Some(KeyMatch {
                name: name.clone(),
                replacement,
            });
        }
    }
    None
}

/// Compile a regex, logging and returning `None` on failure
pub fn compile(pattern: &str) -> Option<Regex> {
    match Regex::new(pattern) {
        Ok(re) => Some(re),
        Err(e) => {
            log::debug!("invalid pattern '{pattern}': {e}");
            None
        }
    }
}

/// True when `value` matches `pattern` anywhere
pub fn is_match(pattern: &str, value: &str) -> bool {
    compile(pattern).map(|re| re.is_match(value)).unwrap_or(false)
}
