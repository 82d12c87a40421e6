//! Pipeline error types
//!
//! Collaborator failures are wrapped with the stage that produced them so
//! loop-boundary logging can say what failed without downcasting.

use thiserror::Error;

use crate::ChannelId;

/// Boxed error returned by collaborator implementations
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failure reported by a source, sink, row store or sender
#[derive(Debug, Error)]
#[error("{message}")]
pub struct CollaboratorError {
    message: String,
    #[source]
    source: Option<BoxError>,
}

impl CollaboratorError {
    /// Create an error from a message
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Create an error wrapping an underlying cause
    pub fn with_source(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Message without the underlying cause
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Pipeline errors
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Configuration rejected at construction time
    #[error("invalid pipeline configuration: {0}")]
    Config(#[from] ferry_config::ConfigError),

    /// Message source receive failed
    #[error("receive failed: {0}")]
    Receive(#[source] CollaboratorError),

    /// Message source acknowledge failed
    #[error("acknowledge failed: {0}")]
    Acknowledge(#[source] CollaboratorError),

    /// Sink rejected a batch
    #[error("apply of {items} items failed: {source}")]
    Apply {
        items: usize,
        #[source]
        source: CollaboratorError,
    },

    /// Row store page fetch failed
    #[error("fetch of page {page} failed: {source}")]
    Fetch {
        page: usize,
        #[source]
        source: CollaboratorError,
    },

    /// Row store commit failed
    #[error("commit of {items} items failed: {source}")]
    Commit {
        items: usize,
        #[source]
        source: CollaboratorError,
    },

    /// Sender failed for a whole sub-batch
    #[error("send of {items} items to {channel} failed: {source}")]
    Send {
        channel: ChannelId,
        items: usize,
        #[source]
        source: CollaboratorError,
    },

    /// A background task panicked or was aborted
    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_collaborator_error_source() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset by peer");
        let err = CollaboratorError::with_source("broker unreachable", io);
        assert_eq!(err.to_string(), "broker unreachable");
        assert_eq!(err.message(), "broker unreachable");
        assert!(err.source().unwrap().to_string().contains("reset by peer"));

        assert!(CollaboratorError::new("plain").source().is_none());
    }

    #[test]
    fn test_error_display() {
        let err = PipelineError::Apply {
            items: 40,
            source: CollaboratorError::new("deadlock detected"),
        };
        assert!(err.to_string().contains("apply of 40 items"));
        assert!(err.to_string().contains("deadlock detected"));

        let err = PipelineError::Send {
            channel: ChannelId(3),
            items: 128,
            source: CollaboratorError::new("timeout"),
        };
        assert!(err.to_string().contains("channel:3"));
        assert!(err.to_string().contains("128"));

        let err = PipelineError::Fetch {
            page: 2,
            source: CollaboratorError::new("connection lost"),
        };
        assert!(err.to_string().contains("page 2"));
    }

    #[test]
    fn test_config_error_converts() {
        let err: PipelineError = ferry_config::ConfigError::zero("outbound", "parallelism").into();
        assert!(matches!(err, PipelineError::Config(_)));
        assert!(err.to_string().contains("parallelism"));
    }
}
