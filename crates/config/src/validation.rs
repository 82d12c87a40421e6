//! Configuration validation
//!
//! Rejects settings that would stall or misroute a pipeline:
//! - zero sizes, counts and worker pools
//! - an apply cap smaller than the commit threshold
//! - zero idle intervals, which turn parking into a busy loop
//! - an outbound dedup window smaller than the fetch window
//! - channel layouts whose mask can select a channel without a lane

use crate::Config;
use crate::error::{ConfigError, Result};
use crate::inbound::InboundConfig;
use crate::outbound::{ChannelsConfig, OutboundConfig};

/// Validate the entire configuration
pub fn validate_config(config: &Config) -> Result<()> {
    if config.global.worker_threads == 0 {
        return Err(ConfigError::zero("global", "worker_threads"));
    }
    validate_inbound(&config.inbound)?;
    validate_outbound(&config.outbound)?;
    Ok(())
}

/// Validate inbound settings
pub fn validate_inbound(inbound: &InboundConfig) -> Result<()> {
    const SECTION: &str = "inbound";

    for (field, value) in [
        ("sink_batch_size", inbound.sink_batch_size),
        ("sink_batch_cap", inbound.sink_batch_cap),
        ("receive_burst", inbound.receive_burst),
        ("dedup_capacity", inbound.dedup_capacity),
    ] {
        if value == 0 {
            return Err(ConfigError::zero(SECTION, field));
        }
    }

    if inbound.receive_max_items == Some(0) {
        return Err(ConfigError::zero(SECTION, "receive_max_items"));
    }

    if inbound.sink_batch_cap < inbound.sink_batch_size {
        return Err(ConfigError::invalid_value(
            SECTION,
            "sink_batch_cap",
            format!(
                "{} is smaller than sink_batch_size {}",
                inbound.sink_batch_cap, inbound.sink_batch_size
            ),
        ));
    }

    // Low watermark is capacity / 2; it must admit at least one receive.
    if inbound.buffer_capacity < 2 {
        return Err(ConfigError::invalid_value(
            SECTION,
            "buffer_capacity",
            "must be at least 2",
        ));
    }

    if inbound.receive_timeout.is_zero() {
        return Err(ConfigError::zero(SECTION, "receive_timeout"));
    }

    if inbound.idle_interval.is_zero() {
        return Err(ConfigError::zero(SECTION, "idle_interval"));
    }

    Ok(())
}

/// Validate outbound settings
pub fn validate_outbound(outbound: &OutboundConfig) -> Result<()> {
    const SECTION: &str = "outbound";

    for (field, value) in [
        ("parallelism", outbound.parallelism),
        ("max_fetch", outbound.max_fetch),
        ("max_processing_chunk", outbound.max_processing_chunk),
        ("send_batch_size", outbound.send_batch_size),
        ("commit_batch_size", outbound.commit_batch_size),
        ("dedup_capacity", outbound.dedup_capacity),
    ] {
        if value == 0 {
            return Err(ConfigError::zero(SECTION, field));
        }
    }

    if outbound.idle_interval.is_zero() {
        return Err(ConfigError::zero(SECTION, "idle_interval"));
    }

    // Rows in flight must stay remembered until committed, or a refetch
    // queues them a second time.
    if outbound.dedup_capacity < outbound.max_fetch {
        return Err(ConfigError::invalid_value(
            SECTION,
            "dedup_capacity",
            format!(
                "{} is smaller than max_fetch {}",
                outbound.dedup_capacity, outbound.max_fetch
            ),
        ));
    }

    validate_channels(&outbound.channels)
}

fn validate_channels(channels: &ChannelsConfig) -> Result<()> {
    if channels.count == 0 {
        return Err(ConfigError::zero("outbound.channels", "count"));
    }

    if channels.start >= channels.end {
        return Err(ConfigError::channel_layout(format!(
            "start {} must be below end {}",
            channels.start, channels.end
        )));
    }

    if channels.end > channels.count {
        return Err(ConfigError::channel_layout(format!(
            "end {} exceeds count {}",
            channels.end, channels.count
        )));
    }

    if channels.mask >= u64::from(channels.count) {
        return Err(ConfigError::channel_layout(format!(
            "mask {} selects channels beyond count {}",
            channels.mask, channels.count
        )));
    }

    Ok(())
}
