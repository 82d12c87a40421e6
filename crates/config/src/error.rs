//! Configuration error types

use std::io;
use thiserror::Error;

/// Result type for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur when loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file
    #[error("failed to read config file '{path}': {source}")]
    IoError {
        /// Path to the file
        path: String,
        /// Underlying IO error
        #[source]
        source: io::Error,
    },

    /// Failed to parse TOML
    #[error("failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Validation error - a size or count must be positive
    #[error("{section} has invalid {field}: must be greater than zero")]
    Zero {
        /// Section name (e.g., "inbound")
        section: &'static str,
        /// Field name
        field: &'static str,
    },

    /// Validation error - invalid value
    #[error("{section} has invalid {field}: {message}")]
    InvalidValue {
        /// Section name
        section: &'static str,
        /// Field name
        field: &'static str,
        /// Error message
        message: String,
    },

    /// Validation error - channel layout cannot be routed
    #[error("outbound.channels is inconsistent: {message}")]
    ChannelLayout {
        /// What is wrong with the layout
        message: String,
    },
}

impl ConfigError {
    /// Create a Zero error
    pub fn zero(section: &'static str, field: &'static str) -> Self {
        Self::Zero { section, field }
    }

    /// Create an InvalidValue error
    pub fn invalid_value(
        section: &'static str,
        field: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            section,
            field,
            message: message.into(),
        }
    }

    /// Create a ChannelLayout error
    pub fn channel_layout(message: impl Into<String>) -> Self {
        Self::ChannelLayout {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_error() {
        let err = ConfigError::zero("inbound", "sink_batch_size");
        assert!(err.to_string().contains("inbound"));
        assert!(err.to_string().contains("sink_batch_size"));
        assert!(err.to_string().contains("greater than zero"));
    }

    #[test]
    fn test_invalid_value_error() {
        let err = ConfigError::invalid_value(
            "inbound",
            "sink_batch_cap",
            "must be >= sink_batch_size",
        );
        assert!(err.to_string().contains("sink_batch_cap"));
        assert!(err.to_string().contains(">= sink_batch_size"));
    }

    #[test]
    fn test_channel_layout_error() {
        let err = ConfigError::channel_layout("mask 31 selects channels beyond count 16");
        assert!(err.to_string().contains("outbound.channels"));
        assert!(err.to_string().contains("mask 31"));
    }

    #[test]
    fn test_io_error_keeps_path() {
        let err = ConfigError::IoError {
            path: "missing.toml".into(),
            source: io::Error::new(io::ErrorKind::NotFound, "not found"),
        };
        assert!(err.to_string().contains("missing.toml"));
    }
}
