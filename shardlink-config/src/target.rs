use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;

/// What a backend replica is used for.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq, Hash, Copy)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Serves writes and reads (default).
    #[default]
    Primary,
    /// Serves reads, kept in sync with the primary.
    Replica,
    /// Serves reads for batch and analytics work.
    ReadOnly,
}

impl Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Primary => write!(f, "primary"),
            Self::Replica => write!(f, "replica"),
            Self::ReadOnly => write!(f, "read_only"),
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "primary" => Ok(Self::Primary),
            "replica" => Ok(Self::Replica),
            "read_only" | "readonly" => Ok(Self::ReadOnly),
            _ => Err(format!("Invalid role: {}", s)),
        }
    }
}

/// Backend processes serving one (keyspace, shard, role).
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TargetConfig {
    /// Keyspace name.
    pub keyspace: String,
    /// Shard name, e.g. `-80` or `0`.
    pub shard: String,
    /// Replica role.
    #[serde(default)]
    pub role: Role,
    /// Candidate backend addresses, `host:port`.
    #[serde(default)]
    pub addresses: Vec<String>,
    /// Username for the authenticated dial.
    pub user: Option<String>,
    /// Password for the authenticated dial.
    pub password: Option<String>,
}

impl TargetConfig {
    /// Same keyspace, shard and role.
    pub fn matches(&self, keyspace: &str, shard: &str, role: Role) -> bool {
        self.keyspace == keyspace && self.shard == shard && self.role == role
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_role_round_trip() {
        for role in [Role::Primary, Role::Replica, Role::ReadOnly] {
            assert_eq!(role.to_string().parse::<Role>(), Ok(role));
        }
        assert_eq!("READONLY".parse::<Role>(), Ok(Role::ReadOnly));
        assert!("leader".parse::<Role>().is_err());
    }
}
