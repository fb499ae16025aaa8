//! shardlink, run statements against a sharded database backend.

use std::process::exit;

use clap::Parser;
use shardlink::cli::{self, Cli, Commands};
use shardlink::config::{self, LogFormat};
use shardlink::logger;
use tokio::runtime::Builder;
use tracing::error;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Cli::parse();

    if let Commands::Configcheck = args.command {
        logger(LogFormat::Text);
        if let Err(err) = cli::config_check(&args.config) {
            error!("{}", err);
            exit(1);
        }
        return Ok(());
    }

    let config = config::load(&args.config)?;
    logger(config.general.log_format);

    let runtime = Builder::new_current_thread().enable_all().build()?;

    let result = runtime.block_on(async {
        match args.command {
            Commands::Exec(statement) => cli::exec(&config, statement).await,
            Commands::Stream(statement) => cli::stream(&config, statement).await,
            Commands::Configcheck => Ok(()),
        }
    });

    if let Err(err) = result {
        error!("{}", err);
        exit(1);
    }

    Ok(())
}
