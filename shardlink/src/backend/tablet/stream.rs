//! Streaming query results.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::{ready, Stream, StreamExt};
use tokio::sync::mpsc;

use super::super::rpc::{frame::decode, Call};
use super::super::{Address, Target};
use super::{Error, QueryResult};

/// Result chunks of a streaming execute, in the order the backend sent them.
///
/// The stream can only be read once. Whether the backend finished
/// successfully is only known after the last chunk: call
/// [`StreamResult::finish`] to find out.
#[derive(Debug)]
pub struct StreamResult {
    call: Call,
    stream: mpsc::Receiver<Bytes>,
    error: Option<Error>,
    origin: Option<(Target, Address)>,
}

impl StreamResult {
    pub(crate) fn new(call: Call, stream: mpsc::Receiver<Bytes>) -> Self {
        Self {
            call,
            stream,
            error: None,
            origin: None,
        }
    }

    /// Attach target identity to the error returned by [`StreamResult::finish`].
    pub(crate) fn shard(mut self, target: &Target, addr: &Address) -> Self {
        self.origin = Some((target.clone(), addr.clone()));
        self
    }

    /// Wait for the next chunk. Returns `None` once the stream ended.
    pub async fn recv(&mut self) -> Option<QueryResult> {
        self.next().await
    }

    /// Drain whatever is left and return how the call ended.
    pub async fn finish(mut self) -> Result<(), Error> {
        while self.next().await.is_some() {}

        let result = self.call.done().await;

        let result = match self.error.take() {
            Some(err) => Err(err),
            None => result,
        };

        match self.origin {
            Some((ref target, ref addr)) => result.map_err(|err| err.shard(target, addr)),
            None => result,
        }
    }
}

impl Stream for StreamResult {
    type Item = QueryResult;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.error.is_some() {
            return Poll::Ready(None);
        }

        match ready!(self.stream.poll_recv(cx)) {
            Some(chunk) => match decode(&chunk) {
                Ok(result) => Poll::Ready(Some(result)),
                Err(err) => {
                    self.error = Some(err);
                    self.stream.close();
                    Poll::Ready(None)
                }
            },
            None => Poll::Ready(None),
        }
    }
}
