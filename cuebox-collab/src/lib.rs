mod db;
mod input;
mod logging;

pub use db::*;
pub use input::*;
pub use logging::*;

use cuebox_core::{Config, ConfigError, Engine, StoreError};
use log::{debug, info};
use thiserror::Error;

/// The engine backed by postgres and yt-dlp.
pub type CollabEngine = Engine<PgDatabase, YouTubeMetadata>;

#[derive(Debug, Error)]
pub enum SetupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Database setup failed: {0}")]
    Database(#[from] StoreError),
}

/// Builds an engine from the environment, migrating the database on the way.
///
/// Installs the stdout logger first, unless the application already set up its own.
pub async fn engine_from_env() -> Result<CollabEngine, SetupError> {
    if init_logger(level_from_env()).is_err() {
        debug!("A logger is already installed, leaving it in place");
    }

    let config = Config::from_env()?;
    let database = PgDatabase::from_env().await?;

    database.migrate().await?;

    info!(
        "Engine ready (max {} items per room, {} conflict retries)",
        config.max_queue_len, config.conflict_retries
    );

    Ok(Engine::new(config, database, YouTubeMetadata::new()))
}
