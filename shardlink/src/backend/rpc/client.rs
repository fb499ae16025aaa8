//! RPC client over TCP.
//!
//! Requests are written by the caller; a background task reads responses
//! and hands them to whoever is waiting for that sequence number. Streaming
//! calls get their chunks pushed into a bounded queue, so a slow consumer
//! holds up the reader (and with it the backend) instead of buffering
//! without limit.

use std::collections::HashMap;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::spawn;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};
use tracing::{debug, error, trace};

use super::frame::{decode, encode, Request, Response, MAX_FRAME_LENGTH};
use super::{Address, Call, CallSender, Credentials, Error, Transport};

/// Authenticate the connection.
pub const LOGIN: &str = "Auth.Login";

#[derive(Debug)]
enum Handler {
    Unary(oneshot::Sender<Result<Bytes, Error>>),
    Stream {
        sink: mpsc::Sender<Bytes>,
        done: CallSender,
    },
}

impl Handler {
    fn complete(self, result: Result<Bytes, Error>) {
        // The caller may have given up waiting, that's fine.
        match self {
            Handler::Unary(tx) => {
                let _ = tx.send(result);
            }
            Handler::Stream { done, .. } => {
                let _ = done.send(result.map(|_| ()));
            }
        }
    }
}

#[derive(Debug, Default)]
struct Handlers {
    pending: HashMap<u64, Handler>,
    closed: bool,
}

#[derive(Debug)]
struct Inner {
    writer: tokio::sync::Mutex<FramedWrite<OwnedWriteHalf, LengthDelimitedCodec>>,
    handlers: Mutex<Handlers>,
    seq: AtomicU64,
    addr: Address,
}

impl Inner {
    fn register(&self, handler: Handler) -> Result<u64, Error> {
        let mut guard = self.handlers.lock();
        if guard.closed {
            return Err(Error::Shutdown);
        }
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        guard.pending.insert(seq, handler);
        Ok(seq)
    }

    async fn send(&self, seq: u64, method: &str, body: Bytes) -> Result<(), Error> {
        let request = Request {
            seq,
            method: method.to_string(),
            body,
        };
        let frame = encode(&request)?;
        trace!("{} <-- {} #{}", self.addr, method, seq);
        self.writer.lock().await.send(frame).await?;

        Ok(())
    }

    /// Complete a call that couldn't be sent.
    fn fail(&self, seq: u64, err: Error) {
        let handler = self.handlers.lock().pending.remove(&seq);
        if let Some(handler) = handler {
            handler.complete(Err(err));
        }
    }

    /// Complete every call in flight, refusing new ones.
    fn fail_all(&self) {
        let pending = {
            let mut guard = self.handlers.lock();
            guard.closed = true;
            std::mem::take(&mut guard.pending)
        };

        for (_, handler) in pending {
            handler.complete(Err(Error::Shutdown));
        }
    }

    fn closed(&self) -> bool {
        self.handlers.lock().closed
    }

    async fn dispatch(&self, frame: &[u8]) -> Result<(), Error> {
        let response: Response = decode(frame)?;
        trace!("{} --> #{} (last: {})", self.addr, response.seq, response.last);

        if response.last {
            let handler = self.handlers.lock().pending.remove(&response.seq);
            let handler = handler.ok_or(Error::UnexpectedResponse(response.seq))?;
            handler.complete(response.into_result());
        } else {
            let sink = match self.handlers.lock().pending.get(&response.seq) {
                Some(Handler::Stream { sink, .. }) => sink.clone(),
                _ => return Err(Error::UnexpectedResponse(response.seq)),
            };
            // Consumer dropped the stream, discard the rest of it.
            let _ = sink.send(response.body).await;
        }

        Ok(())
    }

    async fn read(inner: Arc<Inner>, mut frames: FramedRead<OwnedReadHalf, LengthDelimitedCodec>) {
        while let Some(frame) = frames.next().await {
            let frame = match frame {
                Ok(frame) => frame,
                Err(err) => {
                    debug!("read error: {} [{}]", err, inner.addr);
                    break;
                }
            };

            if let Err(err) = inner.dispatch(&frame).await {
                error!("{} [{}]", err, inner.addr);
                break;
            }
        }

        debug!("reader finished [{}]", inner.addr);
        inner.fail_all();
    }
}

fn codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .max_frame_length(MAX_FRAME_LENGTH)
        .new_codec()
}

/// Connection to one backend process.
#[derive(Debug)]
pub struct RpcClient {
    inner: Arc<Inner>,
    reader: Option<JoinHandle<()>>,
}

impl RpcClient {
    /// Open a connection.
    pub async fn connect(addr: &Address) -> Result<Self, Error> {
        debug!("=> {}", addr);
        let stream = TcpStream::connect(&**addr).await?;
        stream.set_nodelay(true)?;

        Ok(Self::new(stream, addr))
    }

    fn new(stream: TcpStream, addr: &Address) -> Self {
        let (read, write) = stream.into_split();

        let inner = Arc::new(Inner {
            writer: tokio::sync::Mutex::new(FramedWrite::new(write, codec())),
            handlers: Mutex::new(Handlers::default()),
            seq: AtomicU64::new(1),
            addr: addr.clone(),
        });

        let reader = spawn(Inner::read(inner.clone(), FramedRead::new(read, codec())));

        Self {
            inner,
            reader: Some(reader),
        }
    }

    /// Authenticate with username and password.
    pub async fn login(&self, credentials: &Credentials) -> Result<(), Error> {
        self.call(LOGIN, encode(credentials)?).await?;
        debug!("authenticated as \"{}\" [{}]", credentials.user, self.inner.addr);
        Ok(())
    }

    /// The connection is gone and won't accept new calls.
    pub fn closed(&self) -> bool {
        self.inner.closed()
    }
}

#[async_trait]
impl Transport for RpcClient {
    async fn call(&self, method: &str, body: Bytes) -> Result<Bytes, Error> {
        let (tx, rx) = oneshot::channel();
        let seq = self.inner.register(Handler::Unary(tx))?;

        if let Err(err) = self.inner.send(seq, method, body).await {
            self.inner.fail(seq, err);
        }

        rx.await.unwrap_or(Err(Error::Shutdown))
    }

    fn stream(&self, method: &str, body: Bytes, sink: mpsc::Sender<Bytes>) -> Result<Call, Error> {
        let (done, call) = Call::pair();
        let seq = self.inner.register(Handler::Stream { sink, done })?;

        let inner = self.inner.clone();
        let method = method.to_string();
        spawn(async move {
            if let Err(err) = inner.send(seq, &method, body).await {
                inner.fail(seq, err);
            }
        });

        Ok(call)
    }

    async fn close(&mut self) -> Result<(), Error> {
        // Stop reading first: the reader may be parked on a full stream
        // queue nobody is draining anymore.
        if let Some(reader) = self.reader.take() {
            reader.abort();
            let _ = reader.await;
        }
        self.inner.fail_all();

        let result: Result<(), std::io::Error> =
            SinkExt::<Bytes>::close(&mut *self.inner.writer.lock().await).await;

        debug!("closed [{}]", self.inner.addr);
        result.map_err(Error::Io)
    }
}

impl Drop for RpcClient {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        self.inner.fail_all();
    }
}

/// Dials backends over TCP.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpDialer;

#[async_trait]
impl super::Dialer for TcpDialer {
    async fn dial(
        &self,
        addr: &Address,
        credentials: Option<&Credentials>,
    ) -> Result<Box<dyn Transport>, Error> {
        let mut client = RpcClient::connect(addr).await?;

        if let Some(credentials) = credentials {
            if let Err(err) = client.login(credentials).await {
                let _ = client.close().await;
                return Err(err);
            }
        }

        Ok(Box::new(client))
    }
}
