//! Ferry - Metrics
//!
//! Internal metrics collection and reporting for the ferry pipelines.
//!
//! # Overview
//!
//! - Snapshot types for inbound and outbound pipelines
//! - Provider traits pipelines implement through a metrics handle
//! - A periodic reporter with human or JSON output
//!
//! # Metrics Handle Pattern
//!
//! Pipelines keep their counters in an `Arc` and hand out a cloneable
//! handle implementing the provider trait. The handle stays valid after
//! the pipeline has been started and moved into its tasks.
//!
//! ```text
//! Pipeline (owns Arc<Metrics>)
//!     │
//!     ├──► metrics_handle() → Handle (clones Arc, implements Provider)
//!     │
//!     └──► start() [spawns loops, Arc keeps metrics alive]
//! ```
//!
//! # Example
//!
//! ```ignore
//! use ferry_metrics::MetricsReporter;
//! use std::sync::Arc;
//!
//! let handle = pipeline.start()?;
//! let reporter = MetricsReporter::builder()
//!     .config(config.metrics.clone())
//!     .inbound(Arc::new(handle.metrics_handle()))
//!     .build();
//! tokio::spawn(reporter.run(cancel.clone()));
//! ```

mod collected;
pub mod format;
mod reporter;
mod traits;

pub use collected::{
    CollectedInbound, CollectedMetrics, CollectedOutbound, InboundRates, MetricsRates,
    OutboundRates,
};
pub use format::{HumanFormatter, JsonFormatter, MetricsFormatter};
pub use reporter::{MetricsReporter, MetricsReporterBuilder};
pub use traits::{
    InboundMetricsProvider, InboundSnapshot, OutboundMetricsProvider, OutboundSnapshot,
};
