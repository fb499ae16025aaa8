//! In-memory and TCP backends for tests.

use std::collections::{HashSet, VecDeque};
use std::io::ErrorKind;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::spawn;
use tokio::sync::mpsc;

use super::rpc::{frame::decode, frame::encode, Call, Dialer, Transport};
use super::tablet::proto::*;
use super::{Address, Credentials, Error};


pub use server::TestServer;

/// Failure injected into the next call of a method.
#[derive(Debug, Clone)]
pub enum Fault {
    /// Connection breaks.
    Transport,
    /// Backend rejects the request.
    Server(String),
}

impl Fault {
    fn error(&self) -> Error {
        match self {
            Fault::Transport => {
                Error::Io(std::io::Error::new(ErrorKind::BrokenPipe, "broken pipe"))
            }
            Fault::Server(msg) => Error::Server(msg.clone()),
        }
    }
}

/// Request seen by the fake backend.
#[derive(Debug, Clone, PartialEq)]
pub struct Recorded {
    pub addr: Address,
    pub method: String,
    pub session_id: i64,
    pub transaction_id: i64,
}

#[derive(Debug)]
struct State {
    down: HashSet<Address>,
    faults: VecDeque<(String, Fault)>,
    dials: Vec<Address>,
    calls: Vec<Recorded>,
    next_id: i64,
    chunks: u64,
    closed: usize,
}

/// Scriptable backend shared by every transport the fake dialer opens.
#[derive(Debug)]
pub struct FakeBackend {
    state: Mutex<State>,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State {
                down: HashSet::new(),
                faults: VecDeque::new(),
                dials: vec![],
                calls: vec![],
                next_id: 100,
                chunks: 3,
                closed: 0,
            }),
        })
    }

    /// Refuse connections to the address.
    pub fn down(&self, addr: &str) {
        self.state.lock().down.insert(Address::from(addr));
    }

    pub fn up(&self, addr: &str) {
        self.state.lock().down.remove(&Address::from(addr));
    }

    /// Fail the next call of `method`. Faults queue up in order.
    pub fn fail(&self, method: &str, fault: Fault) {
        self.state
            .lock()
            .faults
            .push_back((method.to_string(), fault));
    }

    /// Chunks sent for every streaming execute.
    pub fn chunks(&self, chunks: u64) {
        self.state.lock().chunks = chunks;
    }

    /// Addresses dialed so far, in order.
    pub fn dials(&self) -> Vec<Address> {
        self.state.lock().dials.clone()
    }

    /// Calls of `method` so far, in order.
    pub fn calls(&self, method: &str) -> Vec<Recorded> {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|call| call.method == method)
            .cloned()
            .collect()
    }

    /// Transports closed so far.
    pub fn closed(&self) -> usize {
        self.state.lock().closed
    }

    pub fn dialer(self: &Arc<Self>) -> Arc<FakeDialer> {
        Arc::new(FakeDialer {
            backend: self.clone(),
        })
    }

    fn fault(&self, method: &str) -> Option<Fault> {
        let mut state = self.state.lock();
        let position = state.faults.iter().position(|(m, _)| m == method)?;
        state.faults.remove(position).map(|(_, fault)| fault)
    }

    fn next_id(&self) -> i64 {
        let mut state = self.state.lock();
        state.next_id += 1;
        state.next_id
    }

    fn record(&self, addr: &Address, method: &str, session: Session) {
        self.state.lock().calls.push(Recorded {
            addr: addr.clone(),
            method: method.to_string(),
            session_id: session.session_id,
            transaction_id: session.transaction_id,
        });
    }
}

/// Opens [`FakeTransport`]s.
#[derive(Debug)]
pub struct FakeDialer {
    backend: Arc<FakeBackend>,
}

#[async_trait]
impl Dialer for FakeDialer {
    async fn dial(
        &self,
        addr: &Address,
        credentials: Option<&Credentials>,
    ) -> Result<Box<dyn Transport>, Error> {
        {
            let mut state = self.backend.state.lock();
            state.dials.push(addr.clone());
            if state.down.contains(addr) {
                return Err(Error::Io(std::io::Error::new(
                    ErrorKind::ConnectionRefused,
                    "connection refused",
                )));
            }
        }

        if credentials.is_some() {
            if let Some(fault) = self.backend.fault(crate::backend::rpc::client::LOGIN) {
                return Err(fault.error());
            }
        }

        Ok(Box::new(FakeTransport {
            addr: addr.clone(),
            backend: self.backend.clone(),
            closed: AtomicBool::new(false),
        }))
    }
}

fn session(query: &Query) -> Session {
    Session {
        transaction_id: query.transaction_id,
        connection_id: query.connection_id,
        session_id: query.session_id,
    }
}

/// Connection to the fake backend.
#[derive(Debug)]
pub struct FakeTransport {
    addr: Address,
    backend: Arc<FakeBackend>,
    closed: AtomicBool,
}

#[async_trait]
impl Transport for FakeTransport {
    async fn call(&self, method: &str, body: Bytes) -> Result<Bytes, Error> {
        if self.closed.load(Ordering::Relaxed) {
            return Err(Error::Shutdown);
        }

        if let Some(fault) = self.backend.fault(method) {
            return Err(fault.error());
        }

        match method {
            GET_SESSION_ID => {
                let _: SessionParams = decode(&body)?;
                encode(&SessionInfo {
                    session_id: self.backend.next_id(),
                })
            }

            EXECUTE => {
                let query: Query = decode(&body)?;
                self.backend.record(&self.addr, method, session(&query));
                encode(&QueryResult {
                    rows_affected: 1,
                    rows: vec![vec![
                        Value::String(query.sql),
                        Value::String(self.addr.to_string()),
                    ]],
                    ..Default::default()
                })
            }

            BEGIN => {
                let session: Session = decode(&body)?;
                self.backend.record(&self.addr, method, session);
                encode(&self.backend.next_id())
            }

            COMMIT | ROLLBACK => {
                let session: Session = decode(&body)?;
                self.backend.record(&self.addr, method, session);
                encode(&())
            }

            _ => Err(Error::Server(format!("unknown method \"{}\"", method))),
        }
    }

    fn stream(&self, method: &str, body: Bytes, sink: mpsc::Sender<Bytes>) -> Result<Call, Error> {
        if self.closed.load(Ordering::Relaxed) {
            return Err(Error::Shutdown);
        }

        let fault = self.backend.fault(method);
        if let Some(Fault::Transport) = fault {
            return Err(Fault::Transport.error());
        }

        let query: Query = decode(&body)?;
        self.backend.record(&self.addr, method, session(&query));

        let chunks = self.backend.state.lock().chunks;
        let (done, call) = Call::pair();

        spawn(async move {
            for i in 0..chunks {
                let chunk = QueryResult {
                    rows_affected: i,
                    rows: vec![vec![Value::String(query.sql.clone())]],
                    ..Default::default()
                };
                let chunk = match encode(&chunk) {
                    Ok(chunk) => chunk,
                    Err(err) => {
                        let _ = done.send(Err(err));
                        return;
                    }
                };
                if sink.send(chunk).await.is_err() {
                    break;
                }
            }

            let result = match fault {
                Some(fault) => Err(fault.error()),
                None => Ok(()),
            };
            let _ = done.send(result);
        });

        Ok(call)
    }

    async fn close(&mut self) -> Result<(), Error> {
        if !self.closed.swap(true, Ordering::Relaxed) {
            self.backend.state.lock().closed += 1;
        }
        Ok(())
    }
}
