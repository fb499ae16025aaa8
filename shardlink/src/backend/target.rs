//! Which backends a connection talks to.

use std::fmt::Display;

use crate::config::Role;

/// Keyspace, shard and replica role.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Target {
    pub keyspace: String,
    pub shard: String,
    pub role: Role,
}

impl Target {
    pub fn new(keyspace: impl ToString, shard: impl ToString, role: Role) -> Self {
        Self {
            keyspace: keyspace.to_string(),
            shard: shard.to_string(),
            role,
        }
    }
}

impl Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.keyspace, self.shard, self.role)
    }
}
