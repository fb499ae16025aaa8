//! Session with one backend process.

use std::ops::Deref;

use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

use super::rpc::{
    frame::{decode, encode},
    Dialer, Transport,
};
use super::{Address, Credentials, Error};

pub mod proto;
pub mod stream;

pub use proto::{
    BindVariables, Field, Query, QueryResult, Session, SessionInfo, SessionParams, Value,
};
pub use stream::StreamResult;

use proto::*;


async fn call<Req, Resp>(
    transport: &dyn Transport,
    method: &str,
    request: &Req,
) -> Result<Resp, Error>
where
    Req: Serialize + Sync + ?Sized,
    Resp: DeserializeOwned,
{
    let body = encode(request)?;
    let response = transport.call(method, body).await?;
    decode(&response)
}

/// Resets the transaction id when dropped, however the
/// request it guards ended.
struct EndTransaction<'a>(&'a mut Session);

impl Deref for EndTransaction<'_> {
    type Target = Session;

    fn deref(&self) -> &Self::Target {
        self.0
    }
}

impl Drop for EndTransaction<'_> {
    fn drop(&mut self) {
        self.0.transaction_id = 0;
    }
}

/// RPC session bound to one backend process.
#[derive(Debug)]
pub struct TabletConn {
    transport: Option<Box<dyn Transport>>,
    session: Session,
    addr: Address,
    stream_buffer: usize,
}

impl TabletConn {
    /// Connect to the backend and open a session for the keyspace and shard.
    pub async fn dial(
        dialer: &dyn Dialer,
        addr: &Address,
        keyspace: &str,
        shard: &str,
        credentials: Option<&Credentials>,
        stream_buffer: usize,
    ) -> Result<Self, Error> {
        let mut transport = dialer.dial(addr, credentials).await?;

        let params = SessionParams {
            keyspace: keyspace.to_string(),
            shard: shard.to_string(),
        };

        let handshake = call(transport.as_ref(), GET_SESSION_ID, &params).await;
        let info: SessionInfo = match handshake {
            Ok(info) => info,
            Err(err) => {
                if let Err(close) = transport.close().await {
                    debug!("close after failed handshake: {} [{}]", close, addr);
                }
                return Err(err);
            }
        };

        debug!("session {} opened [{}]", info.session_id, addr);

        Ok(Self {
            transport: Some(transport),
            session: Session {
                session_id: info.session_id,
                ..Default::default()
            },
            addr: addr.clone(),
            stream_buffer: stream_buffer.max(1),
        })
    }

    fn transport(&self) -> Result<&dyn Transport, Error> {
        self.transport.as_deref().ok_or(Error::Shutdown)
    }

    fn query(&self, sql: &str, bind_variables: &BindVariables) -> Query {
        Query {
            sql: sql.to_string(),
            bind_variables: bind_variables.clone(),
            transaction_id: self.session.transaction_id,
            connection_id: self.session.connection_id,
            session_id: self.session.session_id,
        }
    }

    /// Execute a statement and return all of its rows.
    pub async fn exec_direct(
        &self,
        sql: &str,
        bind_variables: &BindVariables,
    ) -> Result<QueryResult, Error> {
        let query = self.query(sql, bind_variables);
        call(self.transport()?, EXECUTE, &query).await
    }

    /// Execute a statement, receiving its rows in chunks.
    ///
    /// Returns as soon as the request is on its way. The stream has to be
    /// read to the end to learn how the statement finished.
    pub fn exec_stream(
        &self,
        sql: &str,
        bind_variables: &BindVariables,
    ) -> Result<StreamResult, Error> {
        let body = encode(&self.query(sql, bind_variables))?;
        let (tx, rx) = mpsc::channel(self.stream_buffer);
        let call = self.transport()?.stream(STREAM_EXECUTE, body, tx)?;

        Ok(StreamResult::new(call, rx))
    }

    /// Start a transaction. Following requests are part of it
    /// until commit or rollback.
    pub async fn begin(&mut self) -> Result<(), Error> {
        let transaction_id: i64 = call(self.transport()?, BEGIN, &self.session).await?;
        self.session.transaction_id = transaction_id;
        debug!("transaction {} started [{}]", transaction_id, self.addr);

        Ok(())
    }

    /// Commit the transaction. The transaction is over afterwards,
    /// even if the request failed.
    pub async fn commit(&mut self) -> Result<(), Error> {
        self.end(COMMIT).await
    }

    /// Roll back the transaction. The transaction is over afterwards,
    /// even if the request failed.
    pub async fn rollback(&mut self) -> Result<(), Error> {
        self.end(ROLLBACK).await
    }

    async fn end(&mut self, method: &str) -> Result<(), Error> {
        let Self {
            transport, session, ..
        } = self;
        let session = EndTransaction(session);
        let transport = transport.as_deref().ok_or(Error::Shutdown)?;

        transport.call(method, encode(&*session)?).await?;

        Ok(())
    }

    /// Close the session. Identifiers are reset and the transport released.
    pub async fn close(&mut self) -> Result<(), Error> {
        self.session = Session::default();

        match self.transport.take() {
            Some(mut transport) => transport.close().await,
            None => Ok(()),
        }
    }

    pub fn session_id(&self) -> i64 {
        self.session.session_id
    }

    pub fn transaction_id(&self) -> i64 {
        self.session.transaction_id
    }

    pub fn connection_id(&self) -> i64 {
        self.session.connection_id
    }

    pub fn in_transaction(&self) -> bool {
        self.session.transaction_id != 0
    }

    /// Backend address.
    pub fn addr(&self) -> &Address {
        &self.addr
    }
}
