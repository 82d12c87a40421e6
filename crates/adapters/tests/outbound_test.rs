//! Outbound pipeline against the in-memory row table and topic sender

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use ferry_adapters::{MemoryRowTable, MemoryTopicSender};
use ferry_config::{ChannelsConfig, OutboundConfig};
use ferry_metrics::OutboundMetricsProvider;
use ferry_pipeline::{ChannelFn, ChannelId, ChannelSelector, OutboundPipeline};
use parking_lot::Mutex;

/// A pending row; `row` is the table key, `id` the change identity
#[derive(Debug, Clone, PartialEq, Eq)]
struct Row {
    row: u64,
    id: u64,
    key: String,
    version: u32,
}

fn row(row: u64, id: u64) -> Row {
    Row {
        row,
        id,
        key: format!("customer-{}", id % 7),
        version: 1,
    }
}

fn config() -> OutboundConfig {
    OutboundConfig {
        parallelism: 3,
        max_fetch: 1_000,
        max_processing_chunk: 64,
        send_batch_size: 16,
        commit_batch_size: 8,
        idle_interval: Duration::from_millis(5),
        error_cooldown: Duration::from_millis(20),
        channels: ChannelsConfig {
            count: 4,
            start: 0,
            end: 4,
            mask: 3,
        },
        ..Default::default()
    }
}

fn table(page_size: usize) -> Arc<MemoryRowTable<Row, u64>> {
    Arc::new(MemoryRowTable::new(Arc::new(|r: &Row| r.row), page_size))
}

fn by_id(config: &OutboundConfig) -> ChannelFn<Row> {
    ChannelSelector::from_config(&config.channels).hashed(|r: &Row| r.id)
}

fn pipeline(
    table: &Arc<MemoryRowTable<Row, u64>>,
    sender: &Arc<MemoryTopicSender<Row>>,
    channel_of: ChannelFn<Row>,
    config: OutboundConfig,
) -> OutboundPipeline<Row, u64> {
    OutboundPipeline::new(
        Arc::clone(table) as _,
        Arc::clone(sender) as _,
        Arc::new(|r: &Row| r.id),
        channel_of,
        config,
    )
    .unwrap()
}

async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..600 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

#[tokio::test]
async fn test_two_pages_spread_over_four_channels() {
    // 80 rows in pages of 40; rows 70..80 repeat the ids of rows 0..10
    let table = table(40);
    for r in 0..80 {
        table.insert(row(r, if r < 70 { r } else { r - 70 }));
    }
    let sender = Arc::new(MemoryTopicSender::new());
    let config = config();

    let handle = pipeline(&table, &sender, by_id(&config), config).start();
    let metrics = handle.metrics_handle();
    assert!(wait_until(|| table.processed() == 70).await);
    handle.stop().await.unwrap();

    assert_eq!(sender.published(), 70);
    assert_eq!(sender.channels().len(), 4);
    for channel in sender.channels() {
        assert!(!sender.topic(channel).is_empty());
    }
    // Duplicates are never published, so their rows stay pending
    assert_eq!(table.pending(), 10);
    assert!(metrics.snapshot().duplicates_skipped >= 10);
}

#[tokio::test]
async fn test_partial_delivery_eventually_completes() {
    let table = table(25);
    for r in 0..200 {
        table.insert(row(r, r));
    }

    // Every third id is turned away on its first offer
    let offered = Arc::new(Mutex::new(HashSet::new()));
    let sender = Arc::new(MemoryTopicSender::new().with_reject(Arc::new({
        let offered = Arc::clone(&offered);
        move |r: &Row, _: ChannelId| offered.lock().insert(r.id) && r.id % 3 == 0
    })));
    let config = config();

    let handle = pipeline(&table, &sender, by_id(&config), config).start();
    let metrics = handle.metrics_handle();
    assert!(wait_until(|| table.pending() == 0).await);
    handle.stop().await.unwrap();

    let mut published: Vec<u64> = sender
        .channels()
        .into_iter()
        .flat_map(|channel| sender.topic(channel))
        .map(|r| r.id)
        .collect();
    published.sort_unstable();
    assert_eq!(published, (0..200).collect::<Vec<_>>());

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.items_rejected, 67);
    assert_eq!(snapshot.items_committed, 200);
    assert_eq!(snapshot.commit_shortfall, 0);
}

#[tokio::test]
async fn test_key_routing_is_stable_and_ordered() {
    let table = table(32);
    // Rows in version order, several versions per key
    for r in 0..140u64 {
        table.insert(Row {
            row: r,
            id: r,
            key: format!("customer-{}", r % 7),
            version: (r / 7) as u32,
        });
    }
    let sender = Arc::new(MemoryTopicSender::new());
    let config = config();
    let channel_of = ChannelSelector::from_config(&config.channels).keyed(|r: &Row| r.key.clone());

    let handle = pipeline(&table, &sender, channel_of, config).start();
    assert!(wait_until(|| table.pending() == 0).await);
    handle.stop().await.unwrap();

    let mut channel_of_key: HashMap<String, ChannelId> = HashMap::new();
    for channel in sender.channels() {
        let mut last_version: BTreeMap<String, u32> = BTreeMap::new();
        for r in sender.topic(channel) {
            let owner = *channel_of_key.entry(r.key.clone()).or_insert(channel);
            assert_eq!(owner, channel, "{} published on two channels", r.key);

            if let Some(previous) = last_version.insert(r.key.clone(), r.version) {
                assert!(previous < r.version, "{} out of order on {channel}", r.key);
            }
        }
    }
    assert_eq!(channel_of_key.len(), 7);
}

#[tokio::test]
async fn test_send_failures_cool_down_then_recover() {
    let table = table(50);
    for r in 0..100 {
        table.insert(row(r, r));
    }
    let sender = Arc::new(MemoryTopicSender::new());
    sender.failures().fail_next(3);
    let config = config();

    let handle = pipeline(&table, &sender, by_id(&config), config).start();
    let metrics = handle.metrics_handle();
    assert!(wait_until(|| table.pending() == 0).await);
    handle.stop().await.unwrap();

    assert_eq!(metrics.snapshot().send_failures, 3);
    assert_eq!(sender.published(), 100);
}

#[tokio::test]
async fn test_storage_failures_retried() {
    let table = table(20);
    for r in 0..60 {
        table.insert(row(r, r));
    }
    table.fetch_failures().fail_next(2);
    table.commit_failures().fail_next(2);
    let sender = Arc::new(MemoryTopicSender::new());
    let config = config();

    let handle = pipeline(&table, &sender, by_id(&config), config).start();
    let metrics = handle.metrics_handle();
    assert!(wait_until(|| table.pending() == 0).await);
    handle.stop().await.unwrap();

    assert_eq!(metrics.snapshot().storage_failures, 4);
    assert_eq!(sender.published(), 60);
}

#[tokio::test]
async fn test_restart_resumes_pending_rows() {
    let table = table(16);
    for r in 0..400 {
        table.insert(row(r, r));
    }
    let sender = Arc::new(MemoryTopicSender::new());
    let mut first = config();
    first.max_fetch = 32;
    first.parallelism = 1;

    let handle = pipeline(&table, &sender, by_id(&first), first).start();
    assert!(wait_until(|| sender.published() >= 64).await);
    handle.stop().await.unwrap();

    // Everything delivered before stop was marked processed
    let delivered = sender.published();
    assert_eq!(table.processed(), delivered);

    let config = config();
    let handle = pipeline(&table, &sender, by_id(&config), config).start();
    assert!(wait_until(|| table.pending() == 0).await);
    handle.stop().await.unwrap();

    assert_eq!(sender.published(), 400);
}
