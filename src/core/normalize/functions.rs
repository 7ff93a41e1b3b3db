// SPDX-License-Identifier: MIT OR Apache-2.0

//! Custom Function Registry
//!
//! `runFunctions` rule steps call named functions against the value being
//! normalized. Functions are registered by name and resolved at execution
//! time, so property tables can reference new derived metrics without any
//! engine change.
//!
//! # Registration
//!
//! The built-in functions are registered by [`FunctionRegistry::with_defaults`].
//! Custom functions implement [`CustomFunction`] and are added via
//! [`FunctionRegistry::register`]:
//!
//! ```ignore
//! #[derive(Debug, Clone)]
//! struct DiskRatio;
//!
//! impl CustomFunction for DiskRatio {
//!     fn name(&self) -> &'static str { "diskRatio" }
//!     fn execute(&self, data: Value, _args: Option<&Value>) -> TelemetryResult<Value> {
//!         // derive and return the new value
//!         Ok(data)
//!     }
//!     fn clone_box(&self) -> Box<dyn CustomFunction> { Box::new(self.clone()) }
//! }
//!
//! registry.register(Box::new(DiskRatio));
//! ```
//!
//! A failure inside a function is wrapped with the function name so the
//! origin site of a failure in a long chain stays identifiable.

use std::collections::HashMap;
use std::fmt::Debug;

use serde_json::{Number, Value};

use crate::core::error::{TelemetryError, TelemetryResult};

/// A named function executable from a `runFunctions` rule step
pub trait CustomFunction: Debug + Send + Sync {
    fn name(&self) -> &'static str;

    /// Run against the current value; `args` carries the step's static
    /// arguments from the property table
    fn execute(&self, data: Value, args: Option<&Value>) -> TelemetryResult<Value>;

    fn clone_box(&self) -> Box<dyn CustomFunction>;
}

impl Clone for Box<dyn CustomFunction> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Name-indexed table of custom functions
#[derive(Debug, Clone, Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, Box<dyn CustomFunction>>,
}

impl FunctionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the built-in functions registered
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(GetFirstKeyFunction));
        registry.register(Box::new(GetAverageFunction));
        registry.register(Box::new(GetPercentFromKeysFunction));
        registry
    }

    /// Register a function under its own name; replaces any previous
    /// function with the same name
    pub fn register(&mut self, function: Box<dyn CustomFunction>) {
        self.functions.insert(function.name().to_string(), function);
    }

    pub fn resolve(&self, name: &str) -> Option<&dyn CustomFunction> {
        self.functions.get(name).map(|f| f.as_ref())
    }

    /// Execute `name` against `data`, wrapping any failure with the
    /// function name
    pub fn run(&self, name: &str, data: Value, args: Option<&Value>) -> TelemetryResult<Value> {
        let function = self
            .functions
            .get(name)
            .ok_or_else(|| TelemetryError::FunctionNotFound {
                name: name.to_string(),
            })?;
        function
            .execute(data, args)
            .map_err(|e| TelemetryError::function_failed(name, e.to_string()))
    }
}

// ============================================================================
// Built-in Functions
// ============================================================================

fn arg_str<'a>(args: Option<&'a Value>, key: &str) -> Option<&'a str> {
    args?.get(key)?.as_str()
}

/// `getFirstKey`: returns the first (insertion-order) key of an object.
///
/// Arguments:
/// - `splitOnValue`: split the key on this separator and keep the last piece
/// - `keyNamePrefix`: prepend this prefix to the result
#[derive(Debug, Clone)]
pub struct GetFirstKeyFunction;

impl CustomFunction for GetFirstKeyFunction {
    fn name(&self) -> &'static str {
        "getFirstKey"
    }

    fn execute(&self, data: Value, args: Option<&Value>) -> TelemetryResult<Value> {
        let obj = data
            .as_object()
            .ok_or_else(|| TelemetryError::invalid_parameter("data is not an object"))?;
        let mut key = obj
            .keys()
            .next()
            .cloned()
            .ok_or_else(|| TelemetryError::invalid_parameter("data has no keys"))?;

        if let Some(sep) = arg_str(args, "splitOnValue") {
            if let Some(last) = key.rsplit(sep).next() {
                key = last.to_string();
            }
        }
        if let Some(prefix) = arg_str(args, "keyNamePrefix") {
            key = format!("{prefix}{key}");
        }
        Ok(Value::String(key))
    }

    fn clone_box(&self) -> Box<dyn CustomFunction> {
        Box::new(self.clone())
    }
}

/// `getAverage`: averages the numeric property `key` across an object of
/// objects (e.g. a per-processor map), rounded to two decimals.
#[derive(Debug, Clone)]
pub struct GetAverageFunction;

impl CustomFunction for GetAverageFunction {
    fn name(&self) -> &'static str {
        "getAverage"
    }

    fn execute(&self, data: Value, args: Option<&Value>) -> TelemetryResult<Value> {
        let key = arg_str(args, "key")
            .ok_or_else(|| TelemetryError::invalid_parameter("missing 'key' argument"))?;
        let obj = data
            .as_object()
            .ok_or_else(|| TelemetryError::invalid_parameter("data is not an object"))?;

        let values: Vec<f64> = obj
            .values()
            .filter_map(|entry| entry.get(key))
            .filter_map(Value::as_f64)
            .collect();
        if values.is_empty() {
            return Err(TelemetryError::invalid_parameter(format!(
                "no numeric values found for '{key}'"
            )));
        }

        let average = values.iter().sum::<f64>() / values.len() as f64;
        let rounded = (average * 100.0).round() / 100.0;
        Number::from_f64(rounded)
            .map(Value::Number)
            .ok_or_else(|| TelemetryError::invalid_parameter("average is not a finite number"))
    }

    fn clone_box(&self) -> Box<dyn CustomFunction> {
        Box::new(self.clone())
    }
}

/// `getPercentFromKeys`: computes `round(partial / total * 100)` from two
/// numeric properties of the value.
///
/// Arguments: `totalKey`, `partialKey`.
#[derive(Debug, Clone)]
pub struct GetPercentFromKeysFunction;

impl CustomFunction for GetPercentFromKeysFunction {
    fn name(&self) -> &'static str {
        "getPercentFromKeys"
    }

    fn execute(&self, data: Value, args: Option<&Value>) -> TelemetryResult<Value> {
        let total_key = arg_str(args, "totalKey")
            .ok_or_else(|| TelemetryError::invalid_parameter("missing 'totalKey' argument"))?;
        let partial_key = arg_str(args, "partialKey")
            .ok_or_else(|| TelemetryError::invalid_parameter("missing 'partialKey' argument"))?;

        let numeric = |key: &str| -> TelemetryResult<f64> {
            data.get(key).and_then(Value::as_f64).ok_or_else(|| {
                TelemetryError::invalid_parameter(format!("'{key}' is missing or not numeric"))
            })
        };
        let total = numeric(total_key)?;
        let partial = numeric(partial_key)?;
        if total == 0.0 {
            return Err(TelemetryError::invalid_parameter(format!(
                "'{total_key}' is zero"
            )));
        }

        Ok(Value::Number(Number::from(
            (partial / total * 100.0).round() as i64,
        )))
    }

    fn clone_box(&self) -> Box<dyn CustomFunction> {
        Box::new(self.clone())
    }
}
