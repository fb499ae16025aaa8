//! Balancers shared by target.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;

use crate::config::{Config, LoadBalancingStrategy};

use super::{Balancer, CurrentConfig, Discovery, Selector, Target};

/// One [`Balancer`] per (keyspace, shard, role), created on first use.
#[derive(Debug)]
pub struct BalancerMap {
    discovery: Arc<dyn Discovery>,
    strategy: LoadBalancingStrategy,
    balancers: DashMap<Target, Arc<Balancer>>,
}

impl BalancerMap {
    pub fn new(discovery: Arc<dyn Discovery>, strategy: LoadBalancingStrategy) -> Self {
        Self {
            discovery,
            strategy,
            balancers: DashMap::new(),
        }
    }

    /// Balancers picking with the config's strategy. Addresses come from
    /// the process-wide config, so [`crate::config::set`] takes effect
    /// without rebuilding the map.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            Arc::new(CurrentConfig),
            config.general.load_balancing_strategy,
        )
    }

    /// Get the balancer for the target. `retry_delay` only applies
    /// if the balancer doesn't exist yet.
    pub fn balancer(&self, target: &Target, retry_delay: Duration) -> Arc<dyn Selector> {
        self.balancers
            .entry(target.clone())
            .or_insert_with(|| {
                Arc::new(Balancer::new(
                    target,
                    self.discovery.clone(),
                    retry_delay,
                    self.strategy,
                ))
            })
            .value()
            .clone()
    }

    /// Number of targets with a balancer.
    pub fn len(&self) -> usize {
        self.balancers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::backend::{Address, Error};
    use crate::config::{self, Role, TargetConfig};

    fn customer(addresses: &[&str]) -> Config {
        let mut config = Config::default();
        config.general.load_balancing_strategy = LoadBalancingStrategy::RoundRobin;
        config.targets.push(TargetConfig {
            keyspace: "customer".into(),
            shard: "-40".into(),
            role: Role::Primary,
            addresses: addresses.iter().map(|addr| addr.to_string()).collect(),
            ..Default::default()
        });
        config
    }

    #[test]
    fn test_shared_per_target() {
        let mut config = Config::default();
        for role in [Role::Primary, Role::Replica] {
            config.targets.push(TargetConfig {
                keyspace: "commerce".into(),
                shard: "0".into(),
                role,
                addresses: vec!["a:1".into(), "b:1".into()],
                ..Default::default()
            });
        }
        let map = BalancerMap::new(Arc::new(config), LoadBalancingStrategy::Random);

        let primary = Target::new("commerce", "0", Role::Primary);
        let first = map.balancer(&primary, Duration::from_secs(60));
        let second = map.balancer(&primary, Duration::from_secs(1));
        let replica = map.balancer(
            &Target::new("commerce", "0", Role::Replica),
            Duration::from_secs(60),
        );
        assert_eq!(map.len(), 2);

        // Health is shared between handles to the same target.
        first.mark_down(&Address::from("a:1"));
        for _ in 0..8 {
            assert_eq!(second.get().unwrap(), Address::from("b:1"));
        }

        replica.mark_down(&Address::from("b:1"));
        for _ in 0..8 {
            assert_eq!(replica.get().unwrap(), Address::from("a:1"));
        }
    }

    #[test]
    fn test_addresses_follow_config() {
        let _lock = config::TEST_LOCK.lock();
        let target = Target::new("customer", "-40", Role::Primary);

        let map = BalancerMap::from_config(&config::set(customer(&["a:1"])));
        let balancer = map.balancer(&target, Duration::from_secs(60));
        assert_eq!(balancer.get().unwrap(), Address::from("a:1"));

        config::set(customer(&["c:1", "d:1"]));
        let picked: Vec<_> = (0..2).map(|_| balancer.get().unwrap()).collect();
        assert!(picked.contains(&Address::from("c:1")));
        assert!(picked.contains(&Address::from("d:1")));

        config::set(Config::default());
        assert!(matches!(balancer.get(), Err(Error::NoBackends(_))));
    }
}
