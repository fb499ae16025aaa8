use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Settings shared by every target connection.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct General {
    /// How many candidate addresses a connect attempt will try before giving up.
    ///
    /// _Default:_ `3`
    #[serde(default = "General::retry_count")]
    pub retry_count: usize,

    /// How long (in milliseconds) an address stays out of rotation after
    /// it was marked down.
    ///
    /// _Default:_ `2000`
    #[serde(default = "General::default_retry_delay")]
    pub retry_delay: u64,

    /// Capacity of the queue streaming results are delivered into.
    ///
    /// _Default:_ `10`
    #[serde(default = "General::stream_buffer")]
    pub stream_buffer: usize,

    /// Order in which healthy addresses are handed out.
    ///
    /// _Default:_ `random`
    #[serde(default)]
    pub load_balancing_strategy: LoadBalancingStrategy,

    /// Log output format.
    ///
    /// _Default:_ `text`
    #[serde(default)]
    pub log_format: LogFormat,
}

impl Default for General {
    fn default() -> Self {
        Self {
            retry_count: Self::retry_count(),
            retry_delay: Self::default_retry_delay(),
            stream_buffer: Self::stream_buffer(),
            load_balancing_strategy: LoadBalancingStrategy::default(),
            log_format: LogFormat::default(),
        }
    }
}

impl General {
    fn env_or_default<T: FromStr>(env_var: &str, default: T) -> T {
        env::var(env_var)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    fn retry_count() -> usize {
        Self::env_or_default("SHARDLINK_RETRY_COUNT", 3)
    }

    fn default_retry_delay() -> u64 {
        Self::env_or_default(
            "SHARDLINK_RETRY_DELAY",
            Duration::from_secs(2).as_millis() as u64,
        )
    }

    fn stream_buffer() -> usize {
        Self::env_or_default("SHARDLINK_STREAM_BUFFER", 10)
    }

    /// Mark-down window as a duration.
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay)
    }
}

/// Which order to hand out healthy addresses in.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Copy)]
#[serde(rename_all = "snake_case")]
pub enum LoadBalancingStrategy {
    /// Pick a healthy address at random (default).
    #[default]
    Random,
    /// Rotate through addresses in a round-robin sequence.
    RoundRobin,
}

impl FromStr for LoadBalancingStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace(['_', '-'], "").as_str() {
            "random" => Ok(Self::Random),
            "roundrobin" => Ok(Self::RoundRobin),
            _ => Err(format!("Invalid load balancing strategy: {}", s)),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Copy)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}
