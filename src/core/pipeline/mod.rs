// SPDX-License-Identifier: MIT OR Apache-2.0

//! Consumer Dispatch
//!
//! Normalized documents leave the core through named consumers. The
//! concrete integrations (HTTP endpoints, cloud logging services, message
//! brokers) live outside this crate; they plug in by implementing
//! [`Consumer`] and registering under a name. [`LogConsumer`] is the
//! built-in reference implementation.

pub mod log_consumer;

use std::collections::HashMap;
use std::fmt::Debug;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::error::{TelemetryError, TelemetryResult};

pub use log_consumer::LogConsumer;

/// What kind of document is being forwarded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PayloadKind {
    /// A full poll-cycle document assembled from the stat table
    SystemInfo,
    /// A single normalized event
    Event,
}

/// One forwarded document plus the consumer-specific declaration config
#[derive(Debug, Clone)]
pub struct ConsumerContext {
    pub payload: Value,
    pub kind: PayloadKind,
    pub config: Option<Value>,
}

impl ConsumerContext {
    pub fn new(payload: Value, kind: PayloadKind) -> Self {
        Self {
            payload,
            kind,
            config: None,
        }
    }

    pub fn with_config(mut self, config: Value) -> Self {
        self.config = Some(config);
        self
    }
}

/// A downstream destination for normalized documents
pub trait Consumer: Debug + Send + Sync {
    fn name(&self) -> &str;

    fn start(&self) {}
    fn stop(&self) {}

    /// Deliver one document. Errors are reported to the dispatcher; they
    /// never affect delivery to other consumers.
    fn process(&self, context: &ConsumerContext) -> TelemetryResult<()>;

    fn clone_box(&self) -> Box<dyn Consumer>;
}

impl Clone for Box<dyn Consumer> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Name-indexed table of registered consumers
#[derive(Debug, Clone, Default)]
pub struct ConsumerRegistry {
    consumers: HashMap<String, Box<dyn Consumer>>,
}

impl ConsumerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a consumer under its own name; replaces any previous
    /// consumer with the same name
    pub fn register(&mut self, consumer: Box<dyn Consumer>) {
        self.consumers.insert(consumer.name().to_string(), consumer);
    }

    pub fn resolve(&self, name: &str) -> Option<&dyn Consumer> {
        self.consumers.get(name).map(|c| c.as_ref())
    }

    pub fn names(&self) -> Vec<&str> {
        self.consumers.keys().map(String::as_str).collect()
    }

    /// Deliver to one named consumer
    pub fn forward(&self, name: &str, context: &ConsumerContext) -> TelemetryResult<()> {
        let consumer = self
            .consumers
            .get(name)
            .ok_or_else(|| TelemetryError::ConsumerNotFound {
                name: name.to_string(),
            })?;
        consumer.process(context)
    }

    /// Deliver to every registered consumer; a failing consumer is logged
    /// and the rest still receive the document
    pub fn forward_all(&self, context: &ConsumerContext) {
        for (name, consumer) in &self.consumers {
            if let Err(e) = consumer.process(context) {
                log::error!("consumer '{name}' failed: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_forward_delivers_payload() {
        let mut registry = ConsumerRegistry::new();
        let consumer = LogConsumer::new();
        let received = consumer.payloads();
        registry.register(Box::new(consumer));

        let context = ConsumerContext::new(json!({ "hostname": "bigip1" }), PayloadKind::SystemInfo);
        registry.forward("default", &context).unwrap();

        let payloads = received.lock().unwrap();
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0], json!({ "hostname": "bigip1" }));
    }

    #[test]
    fn test_forward_unknown_consumer() {
        let registry = ConsumerRegistry::new();
        let context = ConsumerContext::new(json!({}), PayloadKind::Event);
        let err = registry.forward("nowhere", &context).unwrap_err();
        assert!(matches!(err, TelemetryError::ConsumerNotFound { .. }));
    }

    #[test]
    fn test_forward_all_survives_a_failing_consumer() {
        #[derive(Debug, Clone)]
        struct FailingConsumer;
        impl Consumer for FailingConsumer {
            fn name(&self) -> &str {
                "failing"
            }
            fn process(&self, _context: &ConsumerContext) -> TelemetryResult<()> {
                Err(TelemetryError::other("unreachable endpoint"))
            }
            fn clone_box(&self) -> Box<dyn Consumer> {
                Box::new(self.clone())
            }
        }

        let mut registry = ConsumerRegistry::new();
        registry.register(Box::new(FailingConsumer));
        let healthy = LogConsumer::new();
        let received = healthy.payloads();
        registry.register(Box::new(healthy));

        registry.forward_all(&ConsumerContext::new(json!(1), PayloadKind::Event));
        assert_eq!(received.lock().unwrap().len(), 1);
    }
}
