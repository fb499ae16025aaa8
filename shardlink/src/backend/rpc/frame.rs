//! Request and response envelopes.
//!
//! Every frame on the wire is a big-endian u32 length followed by a
//! MessagePack document. Bodies are opaque to the envelope; the session
//! layer encodes its own request and result types into them.

use bytes::Bytes;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use super::Error;

/// Frames larger than this are a protocol error.
pub const MAX_FRAME_LENGTH: usize = 64 * 1024 * 1024;

/// Client -> backend.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Request {
    /// Correlates responses with this request.
    pub seq: u64,
    /// Service method, e.g. `SqlQuery.Execute`.
    pub method: String,
    pub body: Bytes,
}

/// Backend -> client.
///
/// A unary call gets exactly one response with `last` set. A streaming call
/// gets any number of chunks followed by a `last` response without a body,
/// which carries the error if the stream failed.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Response {
    pub seq: u64,
    pub error: Option<String>,
    pub body: Bytes,
    pub last: bool,
}

impl Response {
    pub fn ok(seq: u64, body: Bytes) -> Self {
        Self {
            seq,
            error: None,
            body,
            last: true,
        }
    }

    pub fn chunk(seq: u64, body: Bytes) -> Self {
        Self {
            seq,
            error: None,
            body,
            last: false,
        }
    }

    pub fn error(seq: u64, error: impl ToString) -> Self {
        Self {
            seq,
            error: Some(error.to_string()),
            body: Bytes::new(),
            last: true,
        }
    }

    /// Body or the error reported by the backend.
    pub fn into_result(self) -> Result<Bytes, Error> {
        match self.error {
            Some(error) => Err(Error::Server(error)),
            None => Ok(self.body),
        }
    }
}

pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Bytes, Error> {
    Ok(rmp_serde::to_vec_named(value)?.into())
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, Error> {
    Ok(rmp_serde::from_slice(bytes)?)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_error_response_is_server_error() {
        let response = Response::error(7, "table not found");
        assert!(response.last);

        let bytes = encode(&response).unwrap();
        let decoded: Response = decode(&bytes).unwrap();
        assert_eq!(decoded, response);

        match decoded.into_result() {
            Err(Error::Server(msg)) => assert_eq!(msg, "table not found"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_decode_garbage() {
        let err = decode::<Request>(&[0xc1, 0x00]).unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }
}
