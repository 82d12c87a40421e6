//! Simulate command - run both pipelines against in-memory collaborators
//!
//! The inbound side consumes JSON-encoded change records from a partitioned
//! log and applies them to a keyed store. The outbound side publishes pending
//! outbox rows onto per-channel topics and marks them processed. A share of
//! the records is published twice to exercise deduplication.
//!
//! # Usage
//!
//! ```bash
//! ferry simulate --records 100000 --duplicates 25 --partitions 8
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use ferry_adapters::{
    LogPosition, MemoryApplyStore, MemoryLog, MemoryLogSource, MemoryRowTable, MemoryTopicSender,
};
use ferry_config::Config;
use ferry_metrics::{
    InboundMetricsProvider, InboundSnapshot, MetricsReporter, OutboundMetricsProvider,
    OutboundSnapshot,
};
use ferry_pipeline::{
    ChannelSelector, InboundHandle, InboundPipeline, OutboundHandle, OutboundPipeline, key_hash,
};
use serde::{Deserialize, Serialize};
use tokio::signal;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Path to configuration file (defaults apply when omitted)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Distinct change records to generate
    #[arg(short = 'n', long, default_value_t = 10_000)]
    pub records: u64,

    /// Percentage of records published a second time
    #[arg(short, long, default_value_t = 10, value_parser = clap::value_parser!(u8).range(0..=100))]
    pub duplicates: u8,

    /// Partitions of the inbound log
    #[arg(short, long, default_value_t = 4)]
    pub partitions: u32,

    /// Give up when the pipelines have not caught up after this many seconds
    #[arg(short, long, default_value_t = 120)]
    pub timeout_secs: u64,
}

/// Change record carried by both pipelines
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub id: u64,
    pub key: String,
    pub version: u32,
    pub payload: String,
}

/// Pending outbox row; several rows may carry the same record
#[derive(Debug, Clone)]
pub struct OutboxRow {
    pub row: u64,
    pub record: ChangeRecord,
}

/// Generated workload
#[derive(Debug, Clone, Copy)]
pub struct Workload {
    pub records: u64,
    pub duplicates: u8,
    pub partitions: u32,
    pub timeout: Duration,
}

impl Workload {
    /// Records published twice
    pub fn duplicate_count(&self) -> u64 {
        (0..self.records).filter(|&id| self.is_duplicated(id)).count() as u64
    }

    fn is_duplicated(&self, id: u64) -> bool {
        id % 100 < u64::from(self.duplicates)
    }

    fn record(id: u64) -> ChangeRecord {
        ChangeRecord {
            id,
            key: format!("key-{}", id % 97),
            version: (id / 97) as u32,
            payload: format!("change {id}"),
        }
    }
}

impl From<&SimulateArgs> for Workload {
    fn from(args: &SimulateArgs) -> Self {
        Self {
            records: args.records,
            duplicates: args.duplicates,
            partitions: args.partitions.max(1),
            timeout: Duration::from_secs(args.timeout_secs),
        }
    }
}

/// Final counts of a simulation run
#[derive(Debug, Clone, Default)]
pub struct SimulationReport {
    pub completed: bool,
    pub published_twice: u64,
    pub stored: usize,
    pub published: usize,
    pub rows_pending: usize,
    pub inbound: Option<InboundSnapshot>,
    pub outbound: Option<OutboundSnapshot>,
}

pub async fn run(args: SimulateArgs, config: Config) -> Result<()> {
    let workload = Workload::from(&args);
    let interrupt = CancellationToken::new();

    tokio::spawn({
        let interrupt = interrupt.clone();
        async move {
            if signal::ctrl_c().await.is_ok() {
                warn!("interrupted, stopping pipelines");
                interrupt.cancel();
            }
        }
    });

    let report = simulate(&config, workload, interrupt).await?;
    print_report(&workload, &report);

    if !report.completed {
        anyhow::bail!(
            "simulation did not complete: {} of {} records stored, {} published",
            report.stored,
            workload.records,
            report.published
        );
    }
    Ok(())
}

struct Inbound {
    log_source: Arc<MemoryLogSource<String, ChangeRecord>>,
    store: Arc<MemoryApplyStore<ChangeRecord, u64>>,
    handle: InboundHandle<ChangeRecord, u64, LogPosition>,
}

struct Outbound {
    table: Arc<MemoryRowTable<OutboxRow, u64>>,
    sender: Arc<MemoryTopicSender<OutboxRow>>,
    handle: OutboundHandle<OutboxRow, u64>,
}

/// Run the enabled pipelines until they catch up, time out or are interrupted
pub async fn simulate(
    config: &Config,
    workload: Workload,
    interrupt: CancellationToken,
) -> Result<SimulationReport> {
    let reporter_cancel = CancellationToken::new();
    let mut reporter = MetricsReporter::builder().config(config.metrics.clone());

    let inbound = if config.global.inbound_enabled {
        let inbound = start_inbound(config, &workload)?;
        reporter = reporter.inbound(Arc::new(inbound.handle.metrics_handle()));
        Some(inbound)
    } else {
        None
    };

    let outbound = if config.global.outbound_enabled {
        let outbound = start_outbound(config, &workload)?;
        reporter = reporter.outbound(Arc::new(outbound.handle.metrics_handle()));
        Some(outbound)
    } else {
        None
    };

    let reporter = tokio::spawn(reporter.build().run(reporter_cancel.clone()));

    info!(
        records = workload.records,
        published_twice = workload.duplicate_count(),
        inbound = inbound.is_some(),
        outbound = outbound.is_some(),
        "simulation started"
    );

    let records = usize::try_from(workload.records).context("record count out of range")?;
    let caught_up = || {
        let inbound_done = inbound
            .as_ref()
            .is_none_or(|i| i.store.len() == records && i.log_source.lag() == 0);
        let outbound_done = outbound
            .as_ref()
            .is_none_or(|o| o.sender.published() == records);
        inbound_done && outbound_done
    };

    let deadline = Instant::now() + workload.timeout;
    let completed = loop {
        if caught_up() {
            break true;
        }
        tokio::select! {
            _ = interrupt.cancelled() => break false,
            _ = tokio::time::sleep_until(deadline) => {
                warn!(timeout = ?workload.timeout, "simulation timed out");
                break caught_up();
            }
            _ = tokio::time::sleep(POLL_INTERVAL) => {}
        }
    };

    let mut report = SimulationReport {
        completed,
        published_twice: workload.duplicate_count(),
        ..Default::default()
    };

    if let Some(inbound) = inbound {
        let metrics = inbound.handle.metrics_handle();
        inbound
            .handle
            .stop()
            .await
            .context("inbound pipeline did not stop cleanly")?;
        report.stored = inbound.store.len();
        report.inbound = Some(metrics.snapshot());
    }

    if let Some(outbound) = outbound {
        let metrics = outbound.handle.metrics_handle();
        outbound
            .handle
            .stop()
            .await
            .context("outbound pipeline did not stop cleanly")?;
        report.published = outbound.sender.published();
        report.rows_pending = outbound.table.pending();
        report.outbound = Some(metrics.snapshot());
    }

    reporter_cancel.cancel();
    reporter.await.context("metrics reporter panicked")?;

    info!(completed = report.completed, "simulation finished");
    Ok(report)
}

fn start_inbound(config: &Config, workload: &Workload) -> Result<Inbound> {
    let log = Arc::new(MemoryLog::new(workload.partitions));
    let publish = |record: &ChangeRecord| -> Result<()> {
        let partition = (key_hash(&record.key) % u64::from(workload.partitions)) as u32;
        let encoded = serde_json::to_string(record).context("failed to encode change record")?;
        log.append(partition, encoded);
        Ok(())
    };

    for id in 0..workload.records {
        let record = Workload::record(id);
        publish(&record)?;
        // Upstream retry shortly after the original
        if workload.is_duplicated(id) {
            publish(&record)?;
        }
    }

    let log_source = Arc::new(MemoryLogSource::with_decoder(
        log,
        Arc::new(|raw: &String| {
            serde_json::from_str::<ChangeRecord>(raw).map_err(|e| e.to_string())
        }),
    ));
    let store = Arc::new(MemoryApplyStore::new(Arc::new(|r: &ChangeRecord| r.id)));

    let handle = InboundPipeline::new(
        Arc::clone(&log_source) as _,
        Arc::clone(&store) as _,
        Arc::new(|r: &ChangeRecord| r.id),
        config.inbound.clone(),
    )?
    .with_id("simulated-inbound")
    .start();

    Ok(Inbound {
        log_source,
        store,
        handle,
    })
}

fn start_outbound(config: &Config, workload: &Workload) -> Result<Outbound> {
    let table = Arc::new(MemoryRowTable::new(Arc::new(|r: &OutboxRow| r.row), 1_000));
    let mut row = 0;
    for id in 0..workload.records {
        let record = Workload::record(id);
        if workload.is_duplicated(id) {
            table.insert(OutboxRow {
                row,
                record: record.clone(),
            });
            row += 1;
        }
        table.insert(OutboxRow { row, record });
        row += 1;
    }

    let sender = Arc::new(MemoryTopicSender::new());
    let channel_of = ChannelSelector::from_config(&config.outbound.channels)
        .keyed(|r: &OutboxRow| r.record.key.clone());

    let handle = OutboundPipeline::new(
        Arc::clone(&table) as _,
        Arc::clone(&sender) as _,
        Arc::new(|r: &OutboxRow| r.record.id),
        channel_of,
        config.outbound.clone(),
    )?
    .with_id("simulated-outbound")
    .start();

    Ok(Outbound {
        table,
        sender,
        handle,
    })
}

fn print_report(workload: &Workload, report: &SimulationReport) {
    println!();
    println!("records:          {}", workload.records);
    println!("published twice:  {}", report.published_twice);

    if let Some(inbound) = &report.inbound {
        println!();
        println!("inbound");
        println!("  received:       {}", inbound.items_received);
        println!("  duplicates:     {}", inbound.duplicates_skipped);
        println!("  applied:        {}", inbound.items_applied);
        println!("  stored:         {}", report.stored);
        println!("  apply failures: {}", inbound.apply_failures);
        println!("  acks:           {}", inbound.acks);
    }

    if let Some(outbound) = &report.outbound {
        println!();
        println!("outbound");
        println!("  fetched:        {}", outbound.items_fetched);
        println!("  duplicates:     {}", outbound.duplicates_skipped);
        println!("  sent:           {}", outbound.items_sent);
        println!("  rejected:       {}", outbound.items_rejected);
        println!("  committed:      {}", outbound.items_committed);
        println!("  rows pending:   {}", report.rows_pending);
    }

    println!();
    println!(
        "result:           {}",
        if report.completed { "complete" } else { "incomplete" }
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn fast_config() -> Config {
        Config::from_str(
            r#"
[metrics]
enabled = false

[inbound]
sink_batch_size = 64
sink_batch_cap = 128
buffer_capacity = 512
receive_timeout = "10ms"
idle_interval = "5ms"
commit_interval = "10ms"
error_cooldown = "10ms"

[outbound]
parallelism = 2
send_batch_size = 32
commit_batch_size = 16
idle_interval = "5ms"
error_cooldown = "10ms"

[outbound.channels]
count = 8
end = 8
mask = 7
"#,
        )
        .unwrap()
    }

    fn workload(records: u64, duplicates: u8) -> Workload {
        Workload {
            records,
            duplicates,
            partitions: 3,
            timeout: Duration::from_secs(20),
        }
    }

    #[test]
    fn test_duplicate_count() {
        assert_eq!(workload(1_000, 25).duplicate_count(), 250);
        assert_eq!(workload(50, 0).duplicate_count(), 0);
        assert_eq!(workload(50, 100).duplicate_count(), 50);
    }

    #[tokio::test]
    async fn test_simulation_completes_both_pipelines() {
        let report = simulate(&fast_config(), workload(600, 20), CancellationToken::new())
            .await
            .unwrap();

        assert!(report.completed);
        assert_eq!(report.stored, 600);
        assert_eq!(report.published, 600);
        // Rows carrying an already published record stay pending
        assert_eq!(report.rows_pending, 120);

        let inbound = report.inbound.unwrap();
        assert_eq!(inbound.items_received, 720);
        assert_eq!(inbound.duplicates_skipped, 120);
        assert_eq!(report.outbound.unwrap().items_committed, 600);
    }

    #[tokio::test]
    async fn test_simulation_single_pipeline() {
        let mut config = fast_config();
        config.global.inbound_enabled = false;

        let report = simulate(&config, workload(100, 0), CancellationToken::new())
            .await
            .unwrap();
        assert!(report.completed);
        assert!(report.inbound.is_none());
        assert_eq!(report.published, 100);
    }

    #[tokio::test]
    async fn test_interrupted_simulation_is_incomplete() {
        let interrupt = CancellationToken::new();
        interrupt.cancel();

        let report = simulate(&fast_config(), workload(5_000, 0), interrupt)
            .await
            .unwrap();
        assert!(!report.completed);
    }
}
