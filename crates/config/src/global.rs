//! Global configuration settings
//!
//! Process-wide settings shared by both pipelines.

use serde::Deserialize;

/// Global configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    /// Number of tokio worker threads
    /// Default: number of CPU cores
    pub worker_threads: usize,

    /// Run the inbound (consume-and-apply) pipeline
    /// Default: true
    pub inbound_enabled: bool,

    /// Run the outbound (fetch-and-publish) pipeline
    /// Default: true
    pub outbound_enabled: bool,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            worker_threads: num_cpus(),
            inbound_enabled: true,
            outbound_enabled: true,
        }
    }
}

/// Get the number of available CPUs, defaulting to 4 if detection fails
fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GlobalConfig::default();
        assert!(config.worker_threads > 0);
        assert!(config.inbound_enabled);
        assert!(config.outbound_enabled);
    }

    #[test]
    fn test_deserialize_partial() {
        let config: GlobalConfig = toml::from_str("outbound_enabled = false").unwrap();
        assert!(config.inbound_enabled);
        assert!(!config.outbound_enabled);
        assert!(config.worker_threads > 0);
    }
}
