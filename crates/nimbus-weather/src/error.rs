//! Failures raised by the weather data sources and their classification.

use nimbus_core::error::DEFAULT_CACHE_DECODE_MESSAGE;
use nimbus_core::{ErrorKind, IoErrorExt, ReqwestErrorExt, RusqliteErrorExt};
use thiserror::Error;

/// Anything the remote source or the cache store can raise.
#[derive(Debug, Error)]
pub enum WeatherError {
    #[error("HTTP {status}")]
    Status { status: u16, message: Option<String> },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Failed to deserialize {what} from cache: {source}")]
    CacheDecode {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl WeatherError {
    /// Maps this failure into exactly one [`ErrorKind`].
    ///
    /// Order matters: timeouts win over connection failures, which win over
    /// HTTP statuses, then parse, then storage; everything else is `Unknown`.
    pub fn classify(&self) -> ErrorKind {
        match self {
            WeatherError::Status { status, message } => {
                let reason = reqwest::StatusCode::from_u16(*status)
                    .ok()
                    .and_then(|s| s.canonical_reason());
                ErrorKind::http(*status, message.as_deref().or(reason))
            }
            WeatherError::Network(e) => e.to_error_kind(),
            WeatherError::Io(e) => e.to_error_kind(),
            WeatherError::Parse(e) => ErrorKind::parse(Some(&e.to_string())),
            WeatherError::Database(e) => e.to_error_kind(),
            WeatherError::CacheDecode { what, .. } => {
                let message = format!("Failed to deserialize {} from cache", what);
                ErrorKind::Cache {
                    message: if what.is_empty() {
                        DEFAULT_CACHE_DECODE_MESSAGE.to_string()
                    } else {
                        message
                    },
                }
            }
            WeatherError::Task(e) => ErrorKind::unknown_from(e),
            WeatherError::Other(e) => {
                ErrorKind::unknown(Some(&e.to_string()), source_of_anyhow(e))
            }
        }
    }
}

fn source_of_anyhow(e: &anyhow::Error) -> Option<String> {
    let chain: Vec<String> = e.chain().skip(1).map(|c| c.to_string()).collect();
    if chain.is_empty() {
        None
    } else {
        Some(chain.join(": "))
    }
}
