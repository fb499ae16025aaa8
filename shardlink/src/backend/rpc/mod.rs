//! RPC transport to backend processes.

use std::fmt::Debug;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use super::{Address, Credentials, Error};

pub mod call;
pub mod client;
pub mod frame;

pub use call::{Call, CallSender};
pub use client::{RpcClient, TcpDialer};

/// Request/response exchange with one backend process.
#[async_trait]
pub trait Transport: Send + Sync + Debug {
    /// Send a request and wait for its response.
    async fn call(&self, method: &str, body: Bytes) -> Result<Bytes, Error>;

    /// Start a streaming request. Chunks are pushed into `sink` as they
    /// arrive; the returned [`Call`] resolves once the backend is done.
    ///
    /// Fails right away if the connection is known to be gone.
    fn stream(&self, method: &str, body: Bytes, sink: mpsc::Sender<Bytes>)
        -> Result<Call, Error>;

    /// Close the connection. Calls in flight end with [`Error::Shutdown`].
    async fn close(&mut self) -> Result<(), Error>;
}

/// Opens transports.
#[async_trait]
pub trait Dialer: Send + Sync + Debug {
    async fn dial(
        &self,
        addr: &Address,
        credentials: Option<&Credentials>,
    ) -> Result<Box<dyn Transport>, Error>;
}
