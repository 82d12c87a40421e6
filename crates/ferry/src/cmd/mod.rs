//! Command implementations for the ferry CLI

pub mod check;
pub mod simulate;

use std::path::Path;

use anyhow::{Context, Result};
use ferry_config::Config;

/// Load configuration from `path`, or the defaults when no path is given
///
/// A path that was given but does not exist is an error.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => {
            if !path.exists() {
                return Err(anyhow::anyhow!("config file not found: {}", path.display()));
            }
            Config::from_file(path)
                .with_context(|| format!("failed to load configuration from {}", path.display()))
        }
        None => Ok(Config::default()),
    }
}
