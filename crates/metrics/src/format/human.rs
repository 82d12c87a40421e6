//! Human-readable metrics formatter
//!
//! # Example Output
//!
//! ```text
//! [metrics] inbound: orders (in 1.2K/s, applied 1.1K/s, dup 40, buffered 512)
//! [metrics] outbound: orders-out (fetch 900/s, sent 880/s, committed 880/s, in-flight 128)
//! ```

use super::{MetricsFormatter, format_count, format_rate};
use crate::{CollectedMetrics, MetricsRates};
use std::fmt::Write;

/// Human-readable metrics formatter
#[derive(Debug, Clone, Default)]
pub struct HumanFormatter;

impl HumanFormatter {
    /// Create a new human formatter
    pub fn new() -> Self {
        Self
    }

    fn format_inbound(&self, rates: &MetricsRates) -> Option<String> {
        if rates.inbound.is_empty() {
            return None;
        }

        let mut output = String::from("[metrics] inbound:");
        for (i, p) in rates.inbound.iter().enumerate() {
            if i > 0 {
                output.push_str(" |");
            }
            let _ = write!(
                output,
                " {} (in {}, applied {}, dup {}, buffered {}",
                p.id,
                format_rate(p.received_per_sec),
                format_rate(p.applied_per_sec),
                format_count(p.duplicates),
                p.buffered,
            );
            if p.errors > 0 {
                let _ = write!(output, ", {} err", p.errors);
            }
            output.push(')');
        }
        Some(output)
    }

    fn format_outbound(&self, rates: &MetricsRates) -> Option<String> {
        if rates.outbound.is_empty() {
            return None;
        }

        let mut output = String::from("[metrics] outbound:");
        for (i, p) in rates.outbound.iter().enumerate() {
            if i > 0 {
                output.push_str(" |");
            }
            let _ = write!(
                output,
                " {} (fetch {}, sent {}, committed {}, in-flight {}",
                p.id,
                format_rate(p.fetched_per_sec),
                format_rate(p.sent_per_sec),
                format_rate(p.committed_per_sec),
                p.in_flight,
            );
            if p.rejected > 0 {
                let _ = write!(output, ", {} retried", format_count(p.rejected));
            }
            if p.errors > 0 {
                let _ = write!(output, ", {} err", p.errors);
            }
            output.push(')');
        }
        Some(output)
    }
}

impl MetricsFormatter for HumanFormatter {
    fn format_report(&self, _metrics: &CollectedMetrics, rates: Option<&MetricsRates>) -> String {
        let Some(rates) = rates else {
            return "[metrics] collecting baseline...".to_string();
        };

        let lines: Vec<String> = [self.format_inbound(rates), self.format_outbound(rates)]
            .into_iter()
            .flatten()
            .collect();

        if lines.is_empty() {
            "[metrics] no activity".to_string()
        } else {
            lines.join("\n")
        }
    }

    fn format_totals(&self, metrics: &CollectedMetrics) -> String {
        let mut lines = Vec::new();
        for p in &metrics.inbound {
            let s = &p.snapshot;
            lines.push(format!(
                "[totals] inbound {}: received {} | duplicates {} | applied {} in {} batches | acks {} | errors {}",
                p.id,
                s.items_received,
                s.duplicates_skipped,
                s.items_applied,
                s.apply_batches,
                s.acks,
                s.apply_failures + s.source_failures,
            ));
        }
        for p in &metrics.outbound {
            let s = &p.snapshot;
            lines.push(format!(
                "[totals] outbound {}: fetched {} | duplicates {} | sent {} | retried {} | committed {} | errors {}",
                p.id,
                s.items_fetched,
                s.duplicates_skipped,
                s.items_sent,
                s.items_rejected,
                s.items_committed,
                s.send_failures + s.storage_failures,
            ));
        }
        if lines.is_empty() {
            "[totals] no pipelines".to_string()
        } else {
            lines.join("\n")
        }
    }
}
