//! Ferry Configuration
//!
//! TOML-based configuration loading with sensible defaults.
//! An empty file is a valid configuration.
//!
//! # Parsing
//!
//! ```
//! use ferry_config::Config;
//! use std::str::FromStr;
//!
//! let config = Config::from_str("[outbound]\nparallelism = 2").unwrap();
//! assert_eq!(config.outbound.parallelism, 2);
//! ```
//!
//! # Example Config
//!
//! ```toml
//! [log]
//! level = "info"
//!
//! [metrics]
//! interval = "30s"
//!
//! [inbound]
//! sink_batch_size = 512
//! sink_batch_cap = 1024
//! buffer_capacity = 8192
//!
//! [outbound]
//! parallelism = 4
//! max_fetch = 4096
//!
//! [outbound.channels]
//! count = 16
//! start = 0
//! end = 16
//! mask = 15
//! ```

mod error;
mod global;
mod inbound;
mod logging;
mod metrics;
mod outbound;
mod validation;

use std::fs;
use std::path::Path;
use std::str::FromStr;

pub use error::{ConfigError, Result};
pub use global::GlobalConfig;
pub use inbound::{DEFAULT_DEDUP_CAPACITY, InboundConfig};
pub use logging::{LogConfig, LogFormat, LogLevel};
pub use metrics::{MetricsConfig, MetricsFormat};
pub use outbound::{ChannelsConfig, OutboundConfig};
pub use validation::{validate_inbound, validate_outbound};

use serde::Deserialize;

/// Main configuration structure
///
/// All sections are optional with sensible defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Process-wide settings
    pub global: GlobalConfig,

    /// Logging configuration
    pub log: LogConfig,

    /// Metrics reporting configuration
    pub metrics: MetricsConfig,

    /// Consume-and-apply pipeline
    pub inbound: InboundConfig,

    /// Fetch-and-publish pipeline
    pub outbound: OutboundConfig,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read, contains invalid TOML,
    /// or fails validation.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::IoError {
            path: path.display().to_string(),
            source: e,
        })?;

        Self::from_str(&contents)
    }

    fn parse(s: &str) -> Result<Self> {
        let config: Config = toml::from_str(s).map_err(ConfigError::ParseError)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        validation::validate_config(self)
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
