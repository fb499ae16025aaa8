//! Session requests and results.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

pub const GET_SESSION_ID: &str = "SqlQuery.GetSessionId";
pub const EXECUTE: &str = "SqlQuery.Execute";
pub const STREAM_EXECUTE: &str = "SqlQuery.StreamExecute";
pub const BEGIN: &str = "SqlQuery.Begin";
pub const COMMIT: &str = "SqlQuery.Commit";
pub const ROLLBACK: &str = "SqlQuery.Rollback";

/// Named bind variables.
pub type BindVariables = HashMap<String, Value>;

/// Identifiers assigned by the backend.
///
/// `transaction_id == 0` means no transaction is open.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Session {
    pub transaction_id: i64,
    pub connection_id: i64,
    pub session_id: i64,
}

/// Handshake request.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionParams {
    pub keyspace: String,
    pub shard: String,
}

/// Handshake response.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionInfo {
    pub session_id: i64,
}

/// Statement to execute.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub sql: String,
    pub bind_variables: BindVariables,
    pub transaction_id: i64,
    pub connection_id: i64,
    pub session_id: i64,
}

/// Bind variable or column value.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    UInt(u64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        Value::UInt(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Bytes(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Column description.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub type_code: i64,
}

/// Rows returned by a statement, or one chunk of them when streaming.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub fields: Vec<Field>,
    pub rows_affected: u64,
    pub insert_id: u64,
    pub rows: Vec<Vec<Value>>,
}
