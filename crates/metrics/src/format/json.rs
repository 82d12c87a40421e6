//! JSON metrics formatter
//!
//! One compact JSON object per report, suitable for log shipping.
//!
//! ```json
//! {"type":"report","inbound":[{"id":"orders","applied_per_sec":1100,...}],"outbound":[...]}
//! ```

use super::MetricsFormatter;
use crate::{CollectedMetrics, InboundSnapshot, MetricsRates, OutboundSnapshot};
use serde::Serialize;

/// JSON metrics formatter
#[derive(Debug, Clone, Default)]
pub struct JsonFormatter;

impl JsonFormatter {
    /// Create a new JSON formatter
    pub fn new() -> Self {
        Self
    }
}

#[derive(Serialize)]
struct ReportJson<'a> {
    #[serde(rename = "type")]
    report_type: &'static str,
    elapsed_ms: u64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    inbound: Vec<InboundJson<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    outbound: Vec<OutboundJson<'a>>,
}

#[derive(Serialize)]
struct InboundJson<'a> {
    id: &'a str,
    received_per_sec: u64,
    applied_per_sec: u64,
    duplicates: u64,
    errors: u64,
    buffered: u64,
}

#[derive(Serialize)]
struct OutboundJson<'a> {
    id: &'a str,
    fetched_per_sec: u64,
    sent_per_sec: u64,
    committed_per_sec: u64,
    rejected: u64,
    errors: u64,
    in_flight: u64,
}

#[derive(Serialize)]
struct TotalsJson<'a> {
    #[serde(rename = "type")]
    report_type: &'static str,
    inbound: Vec<Tagged<'a, InboundSnapshot>>,
    outbound: Vec<Tagged<'a, OutboundSnapshot>>,
}

#[derive(Serialize)]
struct Tagged<'a, S: Serialize> {
    id: &'a str,
    #[serde(flatten)]
    snapshot: &'a S,
}

impl MetricsFormatter for JsonFormatter {
    fn format_report(&self, _metrics: &CollectedMetrics, rates: Option<&MetricsRates>) -> String {
        let Some(rates) = rates else {
            return r#"{"type":"report","status":"collecting_baseline"}"#.to_string();
        };

        let json = ReportJson {
            report_type: "report",
            elapsed_ms: rates.elapsed.as_millis() as u64,
            inbound: rates
                .inbound
                .iter()
                .map(|p| InboundJson {
                    id: &p.id,
                    received_per_sec: p.received_per_sec as u64,
                    applied_per_sec: p.applied_per_sec as u64,
                    duplicates: p.duplicates,
                    errors: p.errors,
                    buffered: p.buffered,
                })
                .collect(),
            outbound: rates
                .outbound
                .iter()
                .map(|p| OutboundJson {
                    id: &p.id,
                    fetched_per_sec: p.fetched_per_sec as u64,
                    sent_per_sec: p.sent_per_sec as u64,
                    committed_per_sec: p.committed_per_sec as u64,
                    rejected: p.rejected,
                    errors: p.errors,
                    in_flight: p.in_flight,
                })
                .collect(),
        };

        serde_json::to_string(&json).unwrap_or_else(|_| "{}".to_string())
    }

    fn format_totals(&self, metrics: &CollectedMetrics) -> String {
        let json = TotalsJson {
            report_type: "totals",
            inbound: metrics
                .inbound
                .iter()
                .map(|p| Tagged {
                    id: &p.id,
                    snapshot: &p.snapshot,
                })
                .collect(),
            outbound: metrics
                .outbound
                .iter()
                .map(|p| Tagged {
                    id: &p.id,
                    snapshot: &p.snapshot,
                })
                .collect(),
        };

        serde_json::to_string(&json).unwrap_or_else(|_| "{}".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CollectedInbound, InboundRates, OutboundRates};
    use std::time::Duration;

    fn make_test_rates() -> MetricsRates {
        MetricsRates {
            elapsed: Duration::from_secs(10),
            inbound: vec![InboundRates {
                id: "orders".into(),
                received_per_sec: 1200.0,
                applied_per_sec: 1100.0,
                duplicates: 40,
                errors: 0,
                buffered: 512,
            }],
            outbound: vec![OutboundRates {
                id: "orders-out".into(),
                fetched_per_sec: 900.0,
                sent_per_sec: 880.0,
                committed_per_sec: 870.0,
                rejected: 12,
                errors: 2,
                in_flight: 128,
            }],
        }
    }

    #[test]
    fn test_format_report_with_rates() {
        let formatter = JsonFormatter::new();
        let output = formatter.format_report(&CollectedMetrics::default(), Some(&make_test_rates()));

        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed["type"], "report");
        assert_eq!(parsed["elapsed_ms"], 10_000);
        assert_eq!(parsed["inbound"][0]["id"], "orders");
        assert_eq!(parsed["inbound"][0]["applied_per_sec"], 1100);
        assert_eq!(parsed["outbound"][0]["committed_per_sec"], 870);
        assert_eq!(parsed["outbound"][0]["in_flight"], 128);
    }

    #[test]
    fn test_format_report_no_rates() {
        let formatter = JsonFormatter::new();
        let output = formatter.format_report(&CollectedMetrics::default(), None);
        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed["status"], "collecting_baseline");
    }

    #[test]
    fn test_format_totals_flattens_snapshot() {
        let formatter = JsonFormatter::new();
        let metrics = CollectedMetrics {
            timestamp: None,
            inbound: vec![CollectedInbound {
                id: "in".into(),
                snapshot: InboundSnapshot {
                    items_applied: 50,
                    acks: 3,
                    ..Default::default()
                },
            }],
            outbound: vec![],
        };

        let output = formatter.format_totals(&metrics);
        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed["type"], "totals");
        assert_eq!(parsed["inbound"][0]["id"], "in");
        assert_eq!(parsed["inbound"][0]["items_applied"], 50);
        assert_eq!(parsed["inbound"][0]["acks"], 3);
        assert!(parsed["outbound"].as_array().unwrap().is_empty());
    }
}
