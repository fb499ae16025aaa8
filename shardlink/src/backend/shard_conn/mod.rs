//! Load balanced connection to one shard.
//!
//! A [`ShardConn`] keeps at most one session open to a backend picked by the
//! target's [`Selector`]. Transport faults tear the session down and, unless a
//! transaction is open, the request is retried once on a fresh backend. Errors
//! reported by the backend itself are never retried: the statement may have
//! run already.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, warn};

use crate::config::Config;

use super::balancer::{BalancerMap, Selector};
use super::rpc::Dialer;
use super::tablet::{BindVariables, QueryResult, StreamResult, TabletConn};
use super::{Address, Credentials, Error, Target};


/// Attempts of an execute-style request, reconnects included.
const MAX_ATTEMPTS: usize = 2;

/// Default capacity of the streaming results queue.
pub const DEFAULT_STREAM_BUFFER: usize = 10;

/// Session and the address it's connected to. They come and go together.
#[derive(Debug)]
struct Connected {
    addr: Address,
    conn: TabletConn,
}

/// Connection to a shard, surviving backend failures where that's safe.
///
/// Not meant to be shared: calls must not overlap. A stream returned by
/// [`ShardConn::exec_stream`] must be read to the end before the connection
/// is used again; closing the connection aborts it.
#[derive(Debug)]
pub struct ShardConn {
    target: Target,
    retry_count: usize,
    balancer: Arc<dyn Selector>,
    dialer: Arc<dyn Dialer>,
    credentials: Option<Credentials>,
    stream_buffer: usize,
    conn: Option<Connected>,
}

impl ShardConn {
    /// Create new shard connection, sharing the target's balancer with
    /// every other connection created from the same map.
    ///
    /// `retry_count` is how many backends a connect attempt tries before
    /// giving up.
    pub fn new(
        balancers: &BalancerMap,
        target: Target,
        retry_delay: Duration,
        retry_count: usize,
        dialer: Arc<dyn Dialer>,
    ) -> Self {
        let balancer = balancers.balancer(&target, retry_delay);
        Self::with_selector(target, balancer, retry_count, dialer)
    }

    /// Create new shard connection using the given selector.
    pub fn with_selector(
        target: Target,
        selector: Arc<dyn Selector>,
        retry_count: usize,
        dialer: Arc<dyn Dialer>,
    ) -> Self {
        Self {
            target,
            retry_count: retry_count.max(1),
            balancer: selector,
            dialer,
            credentials: None,
            stream_buffer: DEFAULT_STREAM_BUFFER,
            conn: None,
        }
    }

    /// Create new shard connection with settings from the config.
    pub fn from_config(
        config: &Config,
        balancers: &BalancerMap,
        target: Target,
        dialer: Arc<dyn Dialer>,
    ) -> Self {
        let credentials = config
            .target(&target.keyspace, &target.shard, target.role)
            .and_then(|target| match (&target.user, &target.password) {
                (Some(user), Some(password)) => Some(Credentials::new(user, password)),
                _ => None,
            });

        Self::new(
            balancers,
            target,
            config.general.retry_delay(),
            config.general.retry_count,
            dialer,
        )
        .credentials(credentials)
        .stream_buffer(config.general.stream_buffer)
    }

    /// Authenticate new sessions with these credentials.
    pub fn credentials(mut self, credentials: Option<Credentials>) -> Self {
        self.credentials = credentials;
        self
    }

    /// Capacity of the streaming results queue.
    pub fn stream_buffer(mut self, stream_buffer: usize) -> Self {
        self.stream_buffer = stream_buffer.max(1);
        self
    }

    async fn connect(&mut self) -> Result<(), Error> {
        let mut last_error = None;

        for attempt in 1..=self.retry_count {
            let addr = self.balancer.get().map_err(|err| {
                if err.target().is_some() {
                    err
                } else {
                    Error::ConnectFailed {
                        target: self.target.clone(),
                        source: Box::new(err),
                    }
                }
            })?;

            match TabletConn::dial(
                self.dialer.as_ref(),
                &addr,
                &self.target.keyspace,
                &self.target.shard,
                self.credentials.as_ref(),
                self.stream_buffer,
            )
            .await
            {
                Ok(conn) => {
                    debug!("connected to {} [{}]", addr, self.target);
                    self.conn = Some(Connected { addr, conn });
                    return Ok(());
                }

                Err(err) => {
                    warn!(
                        "connect attempt {}/{} failed: {} [{}, {}]",
                        attempt, self.retry_count, err, self.target, addr
                    );
                    self.balancer.mark_down(&addr);
                    last_error = Some(err);
                }
            }
        }

        let source = last_error.unwrap_or_else(|| Error::NoHealthyBackend(self.target.clone()));
        error!("giving up on {}: {}", self.target, source);

        Err(Error::ConnectFailed {
            target: self.target.clone(),
            source: Box::new(source),
        })
    }

    /// Current session, connecting first if there isn't one.
    async fn connected(&mut self) -> Result<&mut Connected, Error> {
        if self.conn.is_none() {
            self.connect().await?;
        }

        self.conn.as_mut().ok_or(Error::Shutdown)
    }

    /// Mark the backend down and drop the session.
    async fn discard(&mut self, reason: &Error) {
        if let Some(Connected { addr, mut conn }) = self.conn.take() {
            warn!("closing session: {} [{}, {}]", reason, self.target, addr);
            self.balancer.mark_down(&addr);
            if let Err(err) = conn.close().await {
                debug!("close: {} [{}, {}]", err, self.target, addr);
            }
        }
    }

    /// Decide if the outcome of a request goes back to the caller (`true`)
    /// or the request should be retried on another backend (`false`).
    async fn must_return(&mut self, err: Option<&Error>) -> bool {
        let err = match err {
            Some(err) => err,
            None => return true,
        };

        if err.server() {
            return true;
        }

        // A transaction can't move to another backend.
        let in_transaction = self.in_transaction();
        self.discard(err).await;

        in_transaction
    }

    /// Execute a statement and return all of its rows.
    pub async fn exec_direct(
        &mut self,
        sql: &str,
        bind_variables: &BindVariables,
    ) -> Result<QueryResult, Error> {
        let mut attempt = 0;

        loop {
            attempt += 1;

            let (addr, result) = {
                let connected = self.connected().await?;
                let result = connected.conn.exec_direct(sql, bind_variables).await;
                (connected.addr.clone(), result)
            };

            if self.must_return(result.as_ref().err()).await || attempt == MAX_ATTEMPTS {
                return result.map_err(|err| err.shard(&self.target, &addr));
            }
        }
    }

    /// Execute a statement, receiving its rows in chunks.
    pub async fn exec_stream(
        &mut self,
        sql: &str,
        bind_variables: &BindVariables,
    ) -> Result<StreamResult, Error> {
        let mut attempt = 0;

        loop {
            attempt += 1;

            let (addr, result) = {
                let connected = self.connected().await?;
                let result = connected.conn.exec_stream(sql, bind_variables);
                (connected.addr.clone(), result)
            };

            if self.must_return(result.as_ref().err()).await || attempt == MAX_ATTEMPTS {
                return result
                    .map(|stream| stream.shard(&self.target, &addr))
                    .map_err(|err| err.shard(&self.target, &addr));
            }
        }
    }

    /// Start a transaction. Nested transactions are not supported.
    pub async fn begin(&mut self) -> Result<(), Error> {
        if self.in_transaction() {
            return Err(Error::AlreadyInTransaction(self.target.clone()));
        }

        let mut attempt = 0;

        loop {
            attempt += 1;

            let (addr, result) = {
                let connected = self.connected().await?;
                let result = connected.conn.begin().await;
                (connected.addr.clone(), result)
            };

            if self.must_return(result.as_ref().err()).await || attempt == MAX_ATTEMPTS {
                return result.map_err(|err| err.shard(&self.target, &addr));
            }
        }
    }

    /// Commit the transaction. Never retried.
    pub async fn commit(&mut self) -> Result<(), Error> {
        let result = self.transaction("commit")?.conn.commit().await;

        self.outcome("commit", result).await
    }

    /// Roll back the transaction. Never retried.
    pub async fn rollback(&mut self) -> Result<(), Error> {
        let result = self.transaction("rollback")?.conn.rollback().await;

        self.outcome("rollback", result).await
    }

    fn transaction(&mut self, op: &'static str) -> Result<&mut Connected, Error> {
        match self.conn {
            Some(ref mut connected) if connected.conn.in_transaction() => Ok(connected),
            _ => Err(Error::NotInTransaction {
                op,
                target: self.target.clone(),
            }),
        }
    }

    /// Whatever happened to a failed commit or rollback, we can't tell
    /// if the backend applied it.
    async fn outcome(&mut self, op: &'static str, result: Result<(), Error>) -> Result<(), Error> {
        match result {
            Ok(()) => Ok(()),
            Err(err) => {
                error!("{} outcome unknown: {} [{}]", op, err, self.target);

                if !err.server() {
                    self.discard(&err).await;
                }

                Err(Error::OutcomeUnknown {
                    op,
                    target: self.target.clone(),
                    source: Box::new(err),
                })
            }
        }
    }

    /// Close the session, if any.
    pub async fn close(&mut self) -> Result<(), Error> {
        match self.conn.take() {
            Some(Connected { addr, mut conn }) => {
                debug!("closing session [{}, {}]", self.target, addr);
                conn.close()
                    .await
                    .map_err(|err| err.shard(&self.target, &addr))
            }
            None => Ok(()),
        }
    }

    /// A transaction is open.
    pub fn in_transaction(&self) -> bool {
        self.conn
            .as_ref()
            .map(|connected| connected.conn.in_transaction())
            .unwrap_or(false)
    }

    /// Address of the backend we're connected to.
    pub fn address(&self) -> Option<&Address> {
        self.conn.as_ref().map(|connected| &connected.addr)
    }

    /// Current session.
    pub fn session(&self) -> Option<&TabletConn> {
        self.conn.as_ref().map(|connected| &connected.conn)
    }

    pub fn target(&self) -> &Target {
        &self.target
    }
}
