//! Logging.

use std::io::IsTerminal;

use tracing::level_filters::LevelFilter;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LogFormat;

/// Install the global subscriber. Logs go to stderr, results to stdout.
///
/// Only the first call does anything; later ones are ignored.
pub fn logger(format: LogFormat) {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    let registry = tracing_subscriber::registry();

    let _ = match format {
        LogFormat::Text => {
            let format = fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(std::io::stderr().is_terminal())
                .with_file(false);
            registry.with(format).with(filter).try_init()
        }

        LogFormat::Json => {
            let format = fmt::layer().json().with_writer(std::io::stderr);
            registry.with(format).with(filter).try_init()
        }
    };
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_logger_twice() {
        logger(LogFormat::Json);
        logger(LogFormat::Text);
        tracing::info!("still logging");
    }
}
