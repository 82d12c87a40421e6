//! Metrics reporting configuration
//!
//! Defaults: enabled, every 60s, human format, both pipelines included.

use serde::Deserialize;
use std::time::Duration;

/// Metrics output format
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MetricsFormat {
    /// Human-readable output (default)
    #[default]
    Human,
    /// JSON structured output
    Json,
}

/// Metrics configuration
///
/// # Example
///
/// ```toml
/// [metrics]
/// enabled = true
/// interval = "60s"
/// format = "human"
/// include_inbound = true
/// include_outbound = true
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Enable periodic metrics reporting
    pub enabled: bool,

    /// Reporting interval
    #[serde(with = "humantime_serde")]
    pub interval: Duration,

    /// Output format (human, json)
    pub format: MetricsFormat,

    /// Report inbound (consume-and-apply) counters
    pub include_inbound: bool,

    /// Report outbound (fetch-and-publish) counters
    pub include_outbound: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(60),
            format: MetricsFormat::Human,
            include_inbound: true,
            include_outbound: true,
        }
    }
}
