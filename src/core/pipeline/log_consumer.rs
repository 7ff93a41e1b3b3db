// SPDX-License-Identifier: MIT OR Apache-2.0

use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::core::error::TelemetryResult;

use super::{Consumer, ConsumerContext};

/// LogConsumer - debug consumer that logs forwarded documents
///
/// Writes each document to the log system and retains it in memory for
/// inspection. Used primarily for development and testing.
#[derive(Debug, Clone)]
pub struct LogConsumer {
    payloads: Arc<Mutex<Vec<Value>>>,
    consumer_name: String,
    prefix: String,
}

impl Default for LogConsumer {
    fn default() -> Self {
        Self::new()
    }
}

impl LogConsumer {
    pub fn new() -> Self {
        Self {
            payloads: Arc::new(Mutex::new(Vec::new())),
            consumer_name: "default".to_string(),
            prefix: "[FORWARD]".to_string(),
        }
    }

    /// Create a log consumer registered under a custom name
    pub fn with_name(consumer_name: impl Into<String>) -> Self {
        Self {
            consumer_name: consumer_name.into(),
            ..Self::new()
        }
    }

    /// Handle to every document this consumer has received
    pub fn payloads(&self) -> Arc<Mutex<Vec<Value>>> {
        Arc::clone(&self.payloads)
    }
}

impl Consumer for LogConsumer {
    fn name(&self) -> &str {
        &self.consumer_name
    }

    fn process(&self, context: &ConsumerContext) -> TelemetryResult<()> {
        log::info!("{} {:?} {}", self.prefix, context.kind, context.payload);
        self.payloads.lock().unwrap().push(context.payload.clone());
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn Consumer> {
        Box::new(self.clone())
    }
}
