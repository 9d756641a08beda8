//! Shared building blocks for Nimbus: the query result envelope, the error
//! taxonomy, configuration and logging setup.

pub mod config;
pub mod error;
pub mod result;

pub use config::{
    ApiConfig, CacheConfig, Config, ForecastConfig, SearchConfig, ValidationResult,
    MAX_FORECAST_DAYS, MIN_QUERY_LENGTH,
};
pub use error::{ErrorKind, IoErrorExt, ReqwestErrorExt, RusqliteErrorExt};
pub use result::ResultState;

use anyhow::Result;

/// Initialize logging for the application
pub fn init() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    tracing::info!("Nimbus core initialized");
    Ok(())
}
