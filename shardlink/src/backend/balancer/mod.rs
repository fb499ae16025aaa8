//! Backend selection.
//!
//! A [`Selector`] hands out candidate addresses for one target and keeps track
//! of the ones that failed. Every shard connection to the same target shares
//! one selector, so a failure seen by one of them steers the others away from
//! that address too.

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rand::seq::SliceRandom;
use tracing::debug;

use crate::config::{Config, LoadBalancingStrategy};

use super::{Address, Error, Target};

pub mod ban;
pub mod map;

pub use ban::Ban;
pub use map::BalancerMap;

/// Picks backends for a target and tracks their health.
///
/// Implementations are shared between connections and must be safe
/// to call concurrently.
pub trait Selector: Send + Sync + Debug {
    /// Get a healthy candidate address.
    fn get(&self) -> Result<Address, Error>;

    /// Take the address out of rotation for a while.
    fn mark_down(&self, addr: &Address);
}

/// Source of candidate addresses.
pub trait Discovery: Send + Sync + Debug {
    fn addresses(&self, target: &Target) -> Result<Vec<Address>, Error>;
}

impl Discovery for Config {
    fn addresses(&self, target: &Target) -> Result<Vec<Address>, Error> {
        self.target(&target.keyspace, &target.shard, target.role)
            .map(|config| {
                config
                    .addresses
                    .iter()
                    .map(|addr| Address::from(addr.as_str()))
                    .collect()
            })
            .ok_or_else(|| Error::NoBackends(target.clone()))
    }
}

/// Addresses from the process-wide config, looked up on every call.
#[derive(Debug, Default, Clone, Copy)]
pub struct CurrentConfig;

impl Discovery for CurrentConfig {
    fn addresses(&self, target: &Target) -> Result<Vec<Address>, Error> {
        crate::config::config().addresses(target)
    }
}

/// Health-aware selector for one target.
#[derive(Debug)]
pub struct Balancer {
    target: Target,
    discovery: Arc<dyn Discovery>,
    retry_delay: Duration,
    strategy: LoadBalancingStrategy,
    bans: Mutex<HashMap<Address, Ban>>,
    round_robin: AtomicUsize,
}

impl Balancer {
    /// Create new balancer. Addresses marked down stay out of
    /// rotation for `retry_delay`.
    pub fn new(
        target: &Target,
        discovery: Arc<dyn Discovery>,
        retry_delay: Duration,
        strategy: LoadBalancingStrategy,
    ) -> Self {
        Self {
            target: target.clone(),
            discovery,
            retry_delay,
            strategy,
            bans: Mutex::new(HashMap::new()),
            round_robin: AtomicUsize::new(0),
        }
    }

    /// Target this balancer serves.
    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Address is currently marked down.
    pub fn banned(&self, addr: &Address) -> bool {
        self.bans
            .lock()
            .get(addr)
            .map(|ban| ban.banned())
            .unwrap_or(false)
    }

    fn ban(&self, addr: &Address) -> Ban {
        self.bans
            .lock()
            .entry(addr.clone())
            .or_insert_with(|| Ban::new(addr))
            .clone()
    }
}

impl Selector for Balancer {
    fn get(&self) -> Result<Address, Error> {
        let addresses = self.discovery.addresses(&self.target)?;

        if addresses.is_empty() {
            return Err(Error::NoBackends(self.target.clone()));
        }

        let mut candidates: Vec<(Address, Ban)> = {
            let mut bans = self.bans.lock();
            // Forget addresses that left the target.
            bans.retain(|addr, _| addresses.contains(addr));

            addresses
                .into_iter()
                .map(|addr| {
                    let ban = bans
                        .entry(addr.clone())
                        .or_insert_with(|| Ban::new(&addr))
                        .clone();
                    (addr, ban)
                })
                .collect()
        };

        match self.strategy {
            LoadBalancingStrategy::Random => candidates.shuffle(&mut rand::rng()),
            LoadBalancingStrategy::RoundRobin => {
                let first = self.round_robin.fetch_add(1, Ordering::Relaxed) % candidates.len();
                candidates.rotate_left(first);
            }
        }

        let now = Instant::now();
        for (addr, ban) in candidates {
            ban.unban_if_expired(now);
            if !ban.banned() {
                debug!("selected {} [{}]", addr, self.target);
                return Ok(addr);
            }
        }

        Err(Error::NoHealthyBackend(self.target.clone()))
    }

    fn mark_down(&self, addr: &Address) {
        self.ban(addr).ban(self.retry_delay);
    }
}
