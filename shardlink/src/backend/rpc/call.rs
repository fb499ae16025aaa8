use tokio::sync::oneshot;

use super::Error;

/// Sends the outcome of a streaming call.
pub type CallSender = oneshot::Sender<Result<(), Error>>;

/// Streaming call in flight. Resolves once the backend is done producing.
#[derive(Debug)]
pub struct Call {
    done: oneshot::Receiver<Result<(), Error>>,
}

impl Call {
    pub fn pair() -> (CallSender, Call) {
        let (tx, rx) = oneshot::channel();
        (tx, Call { done: rx })
    }

    /// Wait for the call to finish.
    ///
    /// A call abandoned by the transport (connection closed) ends
    /// with [`Error::Shutdown`].
    pub async fn done(self) -> Result<(), Error> {
        self.done.await.unwrap_or(Err(Error::Shutdown))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn test_dropped_sender_is_shutdown() {
        let (tx, call) = Call::pair();
        drop(tx);
        assert!(matches!(call.done().await, Err(Error::Shutdown)));
    }
}
