//! Periodic metrics reporter
//!
//! Collects snapshots from every registered pipeline at the configured
//! interval and logs them through `tracing`. On cancellation it emits one
//! final totals report.

use crate::{
    CollectedInbound, CollectedMetrics, CollectedOutbound, HumanFormatter, InboundMetricsProvider,
    JsonFormatter, OutboundMetricsProvider, format::MetricsFormatter,
};
use ferry_config::{MetricsConfig, MetricsFormat};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Builder for constructing a MetricsReporter
#[derive(Default)]
pub struct MetricsReporterBuilder {
    config: Option<MetricsConfig>,
    inbound: Vec<Arc<dyn InboundMetricsProvider>>,
    outbound: Vec<Arc<dyn OutboundMetricsProvider>>,
}

impl MetricsReporterBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the metrics configuration
    #[must_use]
    pub fn config(mut self, config: MetricsConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Register an inbound pipeline
    #[must_use]
    pub fn inbound(mut self, provider: Arc<dyn InboundMetricsProvider>) -> Self {
        self.inbound.push(provider);
        self
    }

    /// Register an outbound pipeline
    #[must_use]
    pub fn outbound(mut self, provider: Arc<dyn OutboundMetricsProvider>) -> Self {
        self.outbound.push(provider);
        self
    }

    /// Build the MetricsReporter
    pub fn build(self) -> MetricsReporter {
        let config = self.config.unwrap_or_default();
        let formatter: Box<dyn MetricsFormatter> = match config.format {
            MetricsFormat::Human => Box::new(HumanFormatter::new()),
            MetricsFormat::Json => Box::new(JsonFormatter::new()),
        };

        MetricsReporter {
            config,
            formatter,
            inbound: self.inbound,
            outbound: self.outbound,
            previous: None,
        }
    }
}

/// Periodic metrics reporter
pub struct MetricsReporter {
    config: MetricsConfig,
    formatter: Box<dyn MetricsFormatter>,
    inbound: Vec<Arc<dyn InboundMetricsProvider>>,
    outbound: Vec<Arc<dyn OutboundMetricsProvider>>,
    previous: Option<CollectedMetrics>,
}

impl MetricsReporter {
    /// Create a new builder
    pub fn builder() -> MetricsReporterBuilder {
        MetricsReporterBuilder::new()
    }

    /// Run the reporter until cancellation
    ///
    /// Spawn this as a tokio task.
    pub async fn run(mut self, cancel: CancellationToken) {
        if !self.config.enabled {
            info!("metrics reporting disabled");
            return;
        }

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        info!(
            interval_secs = self.config.interval.as_secs(),
            format = ?self.config.format,
            "metrics reporter started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    self.report_totals();
                    info!("metrics reporter shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    self.report();
                }
            }
        }
    }

    /// Collect and report rates once
    fn report(&mut self) {
        let metrics = self.collect();
        let rates = self.previous.as_ref().and_then(|prev| metrics.rates(prev));

        let output = self.formatter.format_report(&metrics, rates.as_ref());
        for line in output.lines() {
            info!("{}", line);
        }

        self.previous = Some(metrics);
    }

    /// Report cumulative totals
    pub fn report_totals(&self) {
        let output = self.formatter.format_totals(&self.collect());
        for line in output.lines() {
            info!("{}", line);
        }
    }

    /// Collect metrics from all registered providers
    pub fn collect(&self) -> CollectedMetrics {
        let mut metrics = CollectedMetrics {
            timestamp: Some(Instant::now()),
            ..Default::default()
        };

        if self.config.include_inbound {
            metrics.inbound = self
                .inbound
                .iter()
                .map(|p| CollectedInbound {
                    id: p.pipeline_id().to_string(),
                    snapshot: p.snapshot(),
                })
                .collect();
        }

        if self.config.include_outbound {
            metrics.outbound = self
                .outbound
                .iter()
                .map(|p| CollectedOutbound {
                    id: p.pipeline_id().to_string(),
                    snapshot: p.snapshot(),
                })
                .collect();
        }

        metrics
    }
}
