//! Connections to database backends.

pub mod address;
pub mod balancer;
pub mod error;
pub mod rpc;
pub mod shard_conn;
pub mod tablet;
pub mod target;

#[cfg(test)]
pub mod test;

pub use address::{Address, Credentials};
pub use balancer::{Balancer, BalancerMap, CurrentConfig, Discovery, Selector};
pub use error::{Error, ErrorKind};
pub use rpc::{Dialer, RpcClient, TcpDialer, Transport};
pub use shard_conn::ShardConn;
pub use tablet::{BindVariables, QueryResult, StreamResult, TabletConn, Value};
pub use target::Target;
