//! Backend errors.

use thiserror::Error;

use super::{Address, Target};

#[derive(Debug, Error)]
pub enum Error {
    #[error("no backends configured for {0}")]
    NoBackends(Target),

    #[error("no healthy backend for {0}")]
    NoHealthyBackend(Target),

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("connection shut down")]
    Shutdown,

    #[error("encode: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("decode: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    #[error("unexpected response for request {0}")]
    UnexpectedResponse(u64),

    #[error("{0}")]
    Server(String),

    #[error("cannot begin: already in transaction [{0}]")]
    AlreadyInTransaction(Target),

    #[error("cannot {op}: not in transaction [{target}]")]
    NotInTransaction { op: &'static str, target: Target },

    #[error("{op} outcome unknown [{target}]: {source}")]
    OutcomeUnknown {
        op: &'static str,
        target: Target,
        source: Box<Error>,
    },

    #[error("could not obtain connection to {target}, last error: {source}")]
    ConnectFailed { target: Target, source: Box<Error> },

    #[error("{target} [{address}]: {source}")]
    Shard {
        target: Target,
        address: Address,
        source: Box<Error>,
    },
}

/// How an error is handled by the shard connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The selector had no candidate to hand out.
    Selection,
    /// Dial or RPC transport fault.
    Transport,
    /// The backend rejected the request.
    Server,
    /// Local precondition violated, nothing was sent.
    ProtocolState,
    /// Commit or rollback failed, the backend state is unknown.
    AmbiguousOutcome,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        use Error::*;

        match self {
            NoBackends(_) | NoHealthyBackend(_) => ErrorKind::Selection,
            Io(_) | Shutdown | Encode(_) | Decode(_) | UnexpectedResponse(_) => {
                ErrorKind::Transport
            }
            Server(_) => ErrorKind::Server,
            AlreadyInTransaction(_) | NotInTransaction { .. } => ErrorKind::ProtocolState,
            OutcomeUnknown { .. } => ErrorKind::AmbiguousOutcome,
            ConnectFailed { source, .. } | Shard { source, .. } => source.kind(),
        }
    }

    /// The backend itself reported this error.
    pub fn server(&self) -> bool {
        self.kind() == ErrorKind::Server
    }

    /// Target this error is about, if it's known.
    pub fn target(&self) -> Option<&Target> {
        use Error::*;

        match self {
            NoBackends(target)
            | NoHealthyBackend(target)
            | AlreadyInTransaction(target)
            | NotInTransaction { target, .. }
            | OutcomeUnknown { target, .. }
            | ConnectFailed { target, .. }
            | Shard { target, .. } => Some(target),
            _ => None,
        }
    }

    /// Attach target identity unless the error already carries it.
    pub(crate) fn shard(self, target: &Target, address: &Address) -> Self {
        if self.target().is_some() {
            return self;
        }

        Error::Shard {
            target: target.clone(),
            address: address.clone(),
            source: Box::new(self),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::Role;

    #[test]
    fn test_kind_looks_through_wrappers() {
        let target = Target::new("commerce", "0", Role::Primary);

        let addr = Address::from("127.0.0.1:15991");
        let err = Error::Server("duplicate key".into()).shard(&target, &addr);
        assert_eq!(err.kind(), ErrorKind::Server);
        assert_eq!(err.target(), Some(&target));

        let err = Error::ConnectFailed {
            target: target.clone(),
            source: Box::new(Error::Shutdown),
        };
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert_eq!(
            err.to_string(),
            "could not obtain connection to commerce.0.primary, last error: connection shut down"
        );

        let err = Error::OutcomeUnknown {
            op: "commit",
            target: target.clone(),
            source: Box::new(Error::Shutdown),
        };
        assert_eq!(err.kind(), ErrorKind::AmbiguousOutcome);
    }

    #[test]
    fn test_shard_does_not_wrap_twice() {
        let target = Target::new("commerce", "0", Role::Primary);
        let addr = Address::from("127.0.0.1:15991");
        let err = Error::NoHealthyBackend(target.clone()).shard(&target, &addr);
        assert!(matches!(err, Error::NoHealthyBackend(_)));

        let err = Error::Shutdown.shard(&target, &addr).shard(&target, &addr);
        match err {
            Error::Shard {
                address, source, ..
            } => {
                assert_eq!(address, addr);
                assert!(matches!(*source, Error::Shutdown));
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
