// SPDX-License-Identifier: MIT OR Apache-2.0

//! StatFlux Core Error Types
//!
//! Error handling for normalization, forwarding and configuration loading.

use thiserror::Error;

/// Result type for StatFlux operations
pub type TelemetryResult<T> = Result<T, TelemetryError>;

/// StatFlux error types
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        config_key: Option<String>,
    },

    #[error("Invalid parameter '{parameter:?}': {message}")]
    InvalidParameter {
        message: String,
        parameter: Option<String>,
    },

    #[error("runCustomFunction '{name}' failed: {message}")]
    FunctionFailed { name: String, message: String },

    #[error("Custom function '{name}' not found")]
    FunctionNotFound { name: String },

    #[error("Consumer '{name}' not found")]
    ConsumerNotFound { name: String },

    #[error("Normalization failed: {message}")]
    NormalizationFailed { message: String },

    #[error("{0}")]
    Other(String),
}

// Custom error creation helpers
impl TelemetryError {
    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
            config_key: None,
        }
    }

    /// Create a configuration error with a specific key
    pub fn configuration_with_key(
        message: impl Into<String>,
        config_key: impl Into<String>,
    ) -> Self {
        Self::Configuration {
            message: message.into(),
            config_key: Some(config_key.into()),
        }
    }

    /// Create an invalid parameter error
    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            message: message.into(),
            parameter: None,
        }
    }

    /// Create an invalid parameter error naming the offending parameter
    pub fn invalid_parameter_with_name(
        message: impl Into<String>,
        parameter: impl Into<String>,
    ) -> Self {
        Self::InvalidParameter {
            message: message.into(),
            parameter: Some(parameter.into()),
        }
    }

    /// Wrap a custom function failure so the origin site in a long rule
    /// chain stays identifiable
    pub fn function_failed(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::FunctionFailed {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create a normalization error
    pub fn normalization(message: impl Into<String>) -> Self {
        Self::NormalizationFailed {
            message: message.into(),
        }
    }

    /// Create a generic error from a string
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_function_failed_message_names_function() {
        let err = TelemetryError::function_failed("getAverage", "no numeric values");
        assert_eq!(
            err.to_string(),
            "runCustomFunction 'getAverage' failed: no numeric values"
        );
    }

    #[test]
    fn test_configuration_error() {
        let error = TelemetryError::configuration("test error");
        assert!(matches!(error, TelemetryError::Configuration { .. }));
    }

    #[test]
    fn test_configuration_with_key() {
        let error = TelemetryError::configuration_with_key("missing table", "stats");
        match error {
            TelemetryError::Configuration { config_key, .. } => {
                assert_eq!(config_key.as_deref(), Some("stats"));
            }
            other => panic!("unexpected error variant: {other:?}"),
        }
    }
}
