//! Check command - validate a configuration file
//!
//! Loads the file, runs validation and prints the effective settings,
//! defaults included.
//!
//! # Usage
//!
//! ```bash
//! ferry check --config configs/ferry.toml
//! ```

use std::fmt::Write;
use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use ferry_config::Config;

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Path to configuration file
    #[arg(short, long)]
    pub config: PathBuf,
}

pub fn run(args: CheckArgs) -> Result<()> {
    let config = super::load_config(Some(&args.config))?;
    println!("{}: ok", args.config.display());
    print!("{}", describe(&config));
    Ok(())
}

/// Render the effective settings, one `section.key = value` per line
fn describe(config: &Config) -> String {
    let mut out = String::new();
    let inbound = &config.inbound;
    let outbound = &config.outbound;
    let channels = &outbound.channels;

    // Writing into a String cannot fail
    let _ = writeln!(out, "\n[global]");
    let _ = writeln!(out, "worker_threads = {}", config.global.worker_threads);
    let _ = writeln!(out, "inbound_enabled = {}", config.global.inbound_enabled);
    let _ = writeln!(out, "outbound_enabled = {}", config.global.outbound_enabled);

    let _ = writeln!(out, "\n[log]");
    let _ = writeln!(out, "level = {}", config.log.level.as_str());
    let _ = writeln!(out, "format = {:?}", config.log.format);

    let _ = writeln!(out, "\n[metrics]");
    let _ = writeln!(out, "enabled = {}", config.metrics.enabled);
    let _ = writeln!(out, "interval = {:?}", config.metrics.interval);
    let _ = writeln!(out, "format = {:?}", config.metrics.format);

    let _ = writeln!(out, "\n[inbound]");
    let _ = writeln!(out, "sink_batch_size = {}", inbound.sink_batch_size);
    let _ = writeln!(out, "sink_batch_cap = {}", inbound.sink_batch_cap);
    let _ = writeln!(out, "buffer_capacity = {}", inbound.buffer_capacity);
    let _ = writeln!(out, "low_watermark = {}", inbound.low_watermark());
    let _ = writeln!(
        out,
        "receive_max_items = {}",
        inbound.effective_receive_max_items()
    );
    let _ = writeln!(out, "receive_timeout = {:?}", inbound.receive_timeout);
    let _ = writeln!(out, "receive_burst = {}", inbound.receive_burst);
    let _ = writeln!(out, "idle_interval = {:?}", inbound.idle_interval);
    let _ = writeln!(out, "commit_interval = {:?}", inbound.commit_interval);
    let _ = writeln!(out, "error_cooldown = {:?}", inbound.error_cooldown);
    let _ = writeln!(out, "dedup_capacity = {}", inbound.dedup_capacity);

    let _ = writeln!(out, "\n[outbound]");
    let _ = writeln!(out, "parallelism = {}", outbound.parallelism);
    let _ = writeln!(out, "max_fetch = {}", outbound.max_fetch);
    let _ = writeln!(out, "max_processing_chunk = {}", outbound.max_processing_chunk);
    let _ = writeln!(out, "send_batch_size = {}", outbound.send_batch_size);
    let _ = writeln!(out, "commit_batch_size = {}", outbound.commit_batch_size);
    let _ = writeln!(out, "idle_interval = {:?}", outbound.idle_interval);
    let _ = writeln!(out, "error_cooldown = {:?}", outbound.error_cooldown);
    let _ = writeln!(out, "dedup_capacity = {}", outbound.dedup_capacity);

    let _ = writeln!(out, "\n[outbound.channels]");
    let _ = writeln!(out, "count = {}", channels.count);
    let _ = writeln!(out, "expected = {}..{}", channels.start, channels.end);
    let _ = writeln!(out, "mask = {:#x}", channels.mask);

    out
}
