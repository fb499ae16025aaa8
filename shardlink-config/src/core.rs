use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::read_to_string;
use std::path::Path;
use tracing::{info, warn};

use super::error::Error;
use super::general::General;
use super::target::{Role, TargetConfig};

/// Configuration.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// General configuration.
    #[serde(default)]
    pub general: General,

    /// Backends, one entry per (keyspace, shard, role).
    #[serde(default)]
    pub targets: Vec<TargetConfig>,
}

impl Config {
    /// Load configuration from disk or use defaults.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let mut config: Config = if let Ok(config) = read_to_string(path) {
            let config = match toml::from_str(&config) {
                Ok(config) => config,
                Err(err) => return Err(Error::config(&config, err)),
            };
            info!("loaded \"{}\"", path.display());
            config
        } else {
            warn!(
                "\"{}\" doesn't exist, loading defaults instead",
                path.display()
            );
            Config::default()
        };

        config.check();

        Ok(config)
    }

    /// Fix up settings that can't work and warn about suspicious ones.
    pub fn check(&mut self) {
        if self.general.retry_count == 0 {
            warn!("retry_count must be at least 1, using 1");
            self.general.retry_count = 1;
        }

        if self.general.stream_buffer == 0 {
            warn!("stream_buffer must be at least 1, using 1");
            self.general.stream_buffer = 1;
        }

        let mut seen = HashSet::new();
        for target in &self.targets {
            let key = (target.keyspace.as_str(), target.shard.as_str(), target.role);
            if !seen.insert(key) {
                warn!(
                    "target {}.{}.{} is configured more than once, only the first entry is used",
                    target.keyspace, target.shard, target.role
                );
            }

            if target.addresses.is_empty() {
                warn!(
                    "target {}.{}.{} has no addresses",
                    target.keyspace, target.shard, target.role
                );
            }
        }
    }

    /// Find target configuration.
    pub fn target(&self, keyspace: &str, shard: &str, role: Role) -> Option<&TargetConfig> {
        self.targets
            .iter()
            .find(|target| target.matches(keyspace, shard, role))
    }
}
