//! Command implementations for taskpool-cmd

use anyhow::{Context, Result};
use taskpool::{PoolConfig, SchedulingPolicy};

pub mod run;
pub mod show_config;

/// Loads the pool configuration from `path` (or the defaults) and applies the
/// command-line overrides on top.
pub fn load_config(
    path: Option<&str>,
    workers: Option<usize>,
    policy: Option<SchedulingPolicy>,
) -> Result<PoolConfig> {
    let mut config = match path {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read pool configuration: {path}"))?;
            PoolConfig::from_json(&json)
                .with_context(|| format!("Invalid pool configuration: {path}"))?
        }
        None => PoolConfig::default(),
    };

    if let Some(workers) = workers {
        config = config.with_workers(workers);
    }
    if let Some(policy) = policy {
        config = config.with_policy(policy);
    }
    config.validate()?;
    Ok(config)
}
