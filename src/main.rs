use std::sync::Arc;

use colored::Colorize;
use log::{error, info, warn};
use thiserror::Error;
use tokio::runtime;
use udo_collab::{Collab, DatabaseError, LogCodeSender, MemoryDatabase, PgDatabase, SharedDatabase};
use udo_core::Config;
use udo_server::{run_server, ConfigError, ServerConfig};

mod logging;

#[derive(Debug, Error)]
enum StartupError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("Could not initialize database: {0}")]
    Database(#[from] DatabaseError),
    #[error("Fatal error: {0}")]
    Fatal(#[from] std::io::Error),
}

impl StartupError {
    fn hint(&self) -> String {
        match self {
            Self::Config(_) => "Check the UDO_* environment variables and try again.".to_string(),
            Self::Database(_) => "This is a database error. Make sure DATABASE_URL points to a running Postgres instance, then try again.".to_string(),
            Self::Fatal(_) => "This error is fatal. Make sure the port is free, then try again.".to_string(),
        }
    }
}

async fn database(config: &ServerConfig) -> Result<SharedDatabase, StartupError> {
    let Some(url) = &config.database_url else {
        warn!("DATABASE_URL is not set, data will only be kept in memory");
        return Ok(Arc::new(MemoryDatabase::new()));
    };

    info!("Connecting to database...");
    let database = PgDatabase::new(url).await?;

    info!("Applying migrations...");
    database.migrate().await?;

    Ok(Arc::new(database))
}

async fn start() -> Result<(), StartupError> {
    let config = ServerConfig::from_env()?;

    let domain = Config {
        utc_offset_minutes: config.utc_offset_minutes.unwrap_or_default(),
        ..Default::default()
    };

    if config.migration_secret.is_none() {
        info!("UDO_MIGRATION_SECRET is not set, imports are disabled");
    }

    let database = database(&config).await?;
    let collab = Collab::new(database, domain, Arc::new(LogCodeSender));

    info!("Initialized successfully.");
    run_server(Arc::new(collab), &config).await?;

    Ok(())
}

fn main() {
    if let Err(e) = logging::init_logger() {
        eprintln!("Could not initialize logging: {}", e);
    }

    let result = runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("udo-async")
        .build()
        .map_err(StartupError::from)
        .and_then(|runtime| runtime.block_on(start()));

    if let Err(error) = result {
        error!("{} Read the error below to troubleshoot the issue.", "U-Do failed to start!".bold().red());
        error!("{}", error);
        error!("{}", format!("Hint: {}", error.hint()).dimmed().italic());
        std::process::exit(1);
    }
}
