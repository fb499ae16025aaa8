//! Configuration errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Deserialize(#[from] toml::de::Error),

    #[error("config error on line {line}: {message}")]
    Config { line: usize, message: String },
}

impl Error {
    /// Point at the offending line of the config file.
    pub fn config(source: &str, err: toml::de::Error) -> Self {
        let line = err
            .span()
            .map(|span| source[..span.start.min(source.len())].matches('\n').count() + 1)
            .unwrap_or(0);

        Self::Config {
            line,
            message: err.message().to_string(),
        }
    }
}
