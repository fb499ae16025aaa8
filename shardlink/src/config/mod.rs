//! Configuration.

use std::path::Path;
use std::sync::Arc;

use arc_swap::ArcSwap;
use once_cell::sync::Lazy;

pub use shardlink_config::{
    Config, Error, General, LoadBalancingStrategy, LogFormat, Role, TargetConfig,
};

static CONFIG: Lazy<ArcSwap<Config>> = Lazy::new(|| ArcSwap::from_pointee(Config::default()));

/// Held by tests that replace the process-wide config.
#[cfg(test)]
pub(crate) static TEST_LOCK: parking_lot::Mutex<()> = parking_lot::Mutex::new(());

/// Current configuration.
pub fn config() -> Arc<Config> {
    CONFIG.load().clone()
}

/// Load the configuration file from disk.
pub fn load(path: &Path) -> Result<Config, Error> {
    let config = Config::load(path)?;
    Ok(set(config))
}

/// Replace the current configuration.
pub fn set(mut config: Config) -> Config {
    config.check();
    CONFIG.store(Arc::new(config.clone()));
    config
}
