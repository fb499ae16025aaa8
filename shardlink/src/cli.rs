use std::fs::read_to_string;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use serde_json::json;
use thiserror::Error;
use tracing::{info, warn};

use crate::backend::{
    BalancerMap, BindVariables, QueryResult, ShardConn, Target, TcpDialer, Value,
};
use crate::config::{Config, Role};

/// Run statements against a sharded database backend.
#[derive(Parser, Debug)]
#[command(name = "shardlink", version)]
pub struct Cli {
    /// Path to the configuration file. Default: "shardlink.toml"
    #[arg(short, long, default_value = "shardlink.toml")]
    pub config: PathBuf,
    /// Subcommand.
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Execute a statement and print the result.
    Exec(Statement),

    /// Execute a statement, printing result chunks as they arrive.
    Stream(Statement),

    /// Check configuration file for errors.
    Configcheck,
}

#[derive(Args, Debug, Clone)]
pub struct Statement {
    /// Keyspace name.
    #[arg(short, long)]
    pub keyspace: String,

    /// Shard name, e.g. `-80`.
    #[arg(short, long, allow_hyphen_values = true)]
    pub shard: String,

    /// Replica role.
    #[arg(short, long, default_value = "primary")]
    pub role: Role,

    /// Bind variable, `name=value`. Can be repeated.
    #[arg(short, long = "bind", value_parser = parse_bind)]
    pub bind: Vec<(String, Value)>,

    /// Statement to execute.
    pub sql: String,
}

impl Statement {
    pub fn target(&self) -> Target {
        Target::new(&self.keyspace, &self.shard, self.role)
    }

    pub fn bind_variables(&self) -> BindVariables {
        self.bind.iter().cloned().collect()
    }

    fn connect(&self, config: &Config) -> ShardConn {
        let balancers = BalancerMap::from_config(config);
        ShardConn::from_config(config, &balancers, self.target(), Arc::new(TcpDialer))
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Backend(#[from] crate::backend::Error),

    #[error("{0}")]
    Config(#[from] crate::config::Error),

    #[error("I/O error on `{0}`: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("{0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid bind variable \"{0}\", expected name=value")]
    Bind(String),
}

/// Parse `name=value`.
pub fn parse_bind(arg: &str) -> Result<(String, Value), Error> {
    match arg.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.to_string(), bind_value(value))),
        _ => Err(Error::Bind(arg.to_string())),
    }
}

/// Integer, then float, then string.
pub fn bind_value(value: &str) -> Value {
    if let Ok(value) = value.parse::<i64>() {
        Value::Int(value)
    } else if let Some(value) = value.parse::<f64>().ok().filter(|value| value.is_finite()) {
        Value::Float(value)
    } else {
        Value::String(value.to_string())
    }
}

fn value(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Int(value) => json!(value),
        Value::UInt(value) => json!(value),
        Value::Float(value) => json!(value),
        Value::String(value) => json!(value),
        Value::Bytes(value) => json!(String::from_utf8_lossy(value)),
    }
}

/// Result as JSON, columns by name.
pub fn to_json(result: &QueryResult) -> serde_json::Value {
    let rows: Vec<serde_json::Value> = result
        .rows
        .iter()
        .map(|row| row.iter().map(value).collect())
        .collect();

    json!({
        "fields": result.fields.iter().map(|field| &field.name).collect::<Vec<_>>(),
        "rows_affected": result.rows_affected,
        "insert_id": result.insert_id,
        "rows": rows,
    })
}

async fn close(conn: &mut ShardConn) {
    if let Err(err) = conn.close().await {
        warn!("{}", err);
    }
}

/// Execute a statement and print the result.
#[allow(clippy::print_stdout)]
pub async fn exec(config: &Config, statement: Statement) -> Result<(), Error> {
    let mut conn = statement.connect(config);

    let result = conn
        .exec_direct(&statement.sql, &statement.bind_variables())
        .await;
    close(&mut conn).await;

    println!("{}", serde_json::to_string(&to_json(&result?))?);

    Ok(())
}

/// Execute a statement, printing one line per result chunk.
#[allow(clippy::print_stdout)]
pub async fn stream(config: &Config, statement: Statement) -> Result<(), Error> {
    let mut conn = statement.connect(config);

    let mut stream = match conn
        .exec_stream(&statement.sql, &statement.bind_variables())
        .await
    {
        Ok(stream) => stream,
        Err(err) => {
            close(&mut conn).await;
            return Err(err.into());
        }
    };

    let mut chunks = 0;
    while let Some(chunk) = stream.recv().await {
        chunks += 1;
        println!("{}", serde_json::to_string(&to_json(&chunk))?);
    }

    let result = stream.finish().await;
    close(&mut conn).await;
    result?;

    info!("{} chunks [{}]", chunks, statement.target());

    Ok(())
}

/// Confirm that the configuration file is valid.
pub fn config_check(path: &Path) -> Result<Config, Error> {
    read_to_string(path).map_err(|err| Error::Io(path.to_path_buf(), err))?;
    let config = Config::load(path)?;

    info!(
        "\"{}\" is valid, {} targets",
        path.display(),
        config.targets.len()
    );

    Ok(config)
}
