//! Error taxonomy shared by every Nimbus data source.
//!
//! Raised failures (HTTP, SQLite, JSON, I/O) are classified into the closed
//! [`ErrorKind`] set before they reach a caller:
//! - Classification never fails; unrecognised failures land in [`ErrorKind::Unknown`]
//! - Each kind carries a UI-appropriate `user_message()`
//! - The underlying failure text is preserved for logging

use std::error::Error as StdError;

use thiserror::Error;

/// Message used when an unexpected failure carries no text of its own.
pub const DEFAULT_UNKNOWN_MESSAGE: &str = "An unexpected error occurred";
/// Message used when a parse failure carries no text of its own.
pub const DEFAULT_PARSE_MESSAGE: &str = "Failed to parse data";
/// Message used when a storage failure carries no text of its own.
pub const DEFAULT_DATABASE_MESSAGE: &str = "Database error occurred";
/// Message used when a cached record cannot be decoded.
pub const DEFAULT_CACHE_DECODE_MESSAGE: &str = "Failed to deserialize cached data";
/// Message used when an HTTP status has no canonical reason phrase.
pub const DEFAULT_HTTP_MESSAGE: &str = "HTTP error";

/// Closed set of failure kinds a query can end with.
///
/// Produced by the classifier extensions below and by
/// `nimbus_weather::WeatherError::classify`. Consumers should match
/// exhaustively.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ErrorKind {
    #[error("Request timed out")]
    Timeout,

    #[error("No connection")]
    NoConnection,

    #[error("HTTP error {code}: {message}")]
    Http { code: u16, message: String },

    #[error("Parse error: {message}")]
    Parse { message: String },

    #[error("Cache error: {message}")]
    Cache { message: String },

    #[error("{message}")]
    Unknown {
        message: String,
        /// Rendered source chain of the underlying failure, if it had one.
        cause: Option<String>,
    },
}

impl ErrorKind {
    pub fn http(code: u16, message: Option<&str>) -> Self {
        ErrorKind::Http {
            code,
            message: message_or(message, DEFAULT_HTTP_MESSAGE),
        }
    }

    pub fn parse(message: Option<&str>) -> Self {
        ErrorKind::Parse {
            message: message_or(message, DEFAULT_PARSE_MESSAGE),
        }
    }

    pub fn cache(message: Option<&str>) -> Self {
        ErrorKind::Cache {
            message: message_or(message, DEFAULT_DATABASE_MESSAGE),
        }
    }

    pub fn unknown(message: Option<&str>, cause: Option<String>) -> Self {
        ErrorKind::Unknown {
            message: message_or(message, DEFAULT_UNKNOWN_MESSAGE),
            cause,
        }
    }

    /// Builds an `Unknown` kind from any error, keeping its source chain.
    pub fn unknown_from(err: &(dyn StdError + 'static)) -> Self {
        let message = err.to_string();
        Self::unknown(Some(&message), source_chain(err))
    }

    /// True for failures that originate in the transport layer.
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            ErrorKind::Timeout | ErrorKind::NoConnection | ErrorKind::Http { .. }
        )
    }

    /// Returns a user-friendly message suitable for display in the UI.
    pub fn user_message(&self) -> &'static str {
        match self {
            ErrorKind::Timeout => "The request timed out. Please try again.",
            ErrorKind::NoConnection => "Unable to connect. Check your internet connection.",
            ErrorKind::Http { code, .. } if *code >= 500 => {
                "The weather service is experiencing issues. Please try again later."
            }
            ErrorKind::Http { code: 401 | 403, .. } => {
                "The weather API key was rejected. Check your settings."
            }
            ErrorKind::Http { .. } => "The request failed. Please try again.",
            ErrorKind::Parse { .. } => "Received an unexpected response. Please try again.",
            ErrorKind::Cache { .. } => "Local weather data could not be read or saved.",
            ErrorKind::Unknown { .. } => "An unexpected error occurred. Please try again.",
        }
    }
}

fn message_or(message: Option<&str>, default: &str) -> String {
    match message.map(str::trim) {
        Some(m) if !m.is_empty() => m.to_string(),
        _ => default.to_string(),
    }
}

/// Renders the `source()` chain below `err` as `"a: b: c"`.
pub fn source_chain(err: &(dyn StdError + 'static)) -> Option<String> {
    let mut parts = Vec::new();
    let mut current = err.source();
    while let Some(source) = current {
        parts.push(source.to_string());
        current = source.source();
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(": "))
    }
}

/// Extension trait for classifying reqwest errors.
pub trait ReqwestErrorExt {
    fn to_error_kind(&self) -> ErrorKind;
}

impl ReqwestErrorExt for reqwest::Error {
    fn to_error_kind(&self) -> ErrorKind {
        if self.is_timeout() {
            ErrorKind::Timeout
        } else if self.is_connect() {
            ErrorKind::NoConnection
        } else if let Some(status) = self.status() {
            ErrorKind::http(status.as_u16(), status.canonical_reason())
        } else if self.is_decode() {
            ErrorKind::parse(Some(&self.to_string()))
        } else {
            ErrorKind::unknown_from(self)
        }
    }
}

/// Extension trait for classifying rusqlite errors.
pub trait RusqliteErrorExt {
    fn to_error_kind(&self) -> ErrorKind;
}

impl RusqliteErrorExt for rusqlite::Error {
    fn to_error_kind(&self) -> ErrorKind {
        match self {
            rusqlite::Error::SqliteFailure(_, Some(msg)) => ErrorKind::cache(Some(msg)),
            _ => ErrorKind::cache(Some(&self.to_string())),
        }
    }
}

/// Extension trait for classifying raw socket/file errors.
pub trait IoErrorExt {
    fn to_error_kind(&self) -> ErrorKind;
}

impl IoErrorExt for std::io::Error {
    fn to_error_kind(&self) -> ErrorKind {
        use std::io::ErrorKind as Io;

        match self.kind() {
            Io::TimedOut => ErrorKind::Timeout,
            Io::ConnectionRefused
            | Io::ConnectionReset
            | Io::ConnectionAborted
            | Io::NotConnected
            | Io::AddrNotAvailable => ErrorKind::NoConnection,
            _ => ErrorKind::unknown_from(self),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_blank_messages_fall_back_to_defaults() {
        assert_eq!(
            ErrorKind::parse(None),
            ErrorKind::Parse {
                message: DEFAULT_PARSE_MESSAGE.into()
            }
        );
        assert_eq!(
            ErrorKind::cache(Some("   ")),
            ErrorKind::Cache {
                message: DEFAULT_DATABASE_MESSAGE.into()
            }
        );
        assert_eq!(
            ErrorKind::http(404, None),
            ErrorKind::Http {
                code: 404,
                message: DEFAULT_HTTP_MESSAGE.into()
            }
        );
        assert!(matches!(
            ErrorKind::unknown(None, None),
            ErrorKind::Unknown { message, cause: None } if message == DEFAULT_UNKNOWN_MESSAGE
        ));
    }

    #[test]
    fn test_io_timeout_and_refused() {
        let timed_out = std::io::Error::new(std::io::ErrorKind::TimedOut, "slow");
        assert_eq!(timed_out.to_error_kind(), ErrorKind::Timeout);

        let refused = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        assert_eq!(refused.to_error_kind(), ErrorKind::NoConnection);
    }

    #[test]
    fn test_io_other_is_unknown_with_message() {
        let err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
        match err.to_error_kind() {
            ErrorKind::Unknown { message, .. } => assert_eq!(message, "nope"),
            other => panic!("expected Unknown, got {other:?}"),
        }
    }

    #[test]
    fn test_sqlite_failure_is_cache_error() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        let err = conn.execute("SELECT * FROM missing_table", []).unwrap_err();
        assert!(matches!(
            err.to_error_kind(),
            ErrorKind::Cache { message } if message.contains("missing_table")
        ));
    }

    #[derive(Debug, Error)]
    #[error("refresh failed")]
    struct Wrapper(#[source] std::io::Error);

    #[test]
    fn test_unknown_from_keeps_source_chain() {
        let err = Wrapper(std::io::Error::new(std::io::ErrorKind::Other, "disk gone"));
        assert_eq!(
            ErrorKind::unknown_from(&err),
            ErrorKind::Unknown {
                message: "refresh failed".into(),
                cause: Some("disk gone".into()),
            }
        );
    }

    #[test]
    fn test_user_messages() {
        assert!(ErrorKind::NoConnection.user_message().contains("internet"));
        assert!(ErrorKind::http(503, None).user_message().contains("later"));
        assert!(ErrorKind::http(401, None).user_message().contains("API key"));
        assert!(ErrorKind::http(404, None).user_message().contains("failed"));
    }

    #[test]
    fn test_is_network() {
        assert!(ErrorKind::Timeout.is_network());
        assert!(ErrorKind::http(500, None).is_network());
        assert!(!ErrorKind::parse(None).is_network());
        assert!(!ErrorKind::cache(None).is_network());
    }

    #[tokio::test]
    async fn test_reqwest_status_error_is_http() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = reqwest::get(format!("{}/missing", server.uri()))
            .await
            .unwrap()
            .error_for_status()
            .unwrap_err();

        assert_eq!(
            err.to_error_kind(),
            ErrorKind::Http {
                code: 404,
                message: "Not Found".into()
            }
        );
    }

    #[tokio::test]
    async fn test_reqwest_timeout_is_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(50))
            .build()
            .unwrap();
        let err = client.get(server.uri()).send().await.unwrap_err();

        assert_eq!(err.to_error_kind(), ErrorKind::Timeout);
    }

    #[tokio::test]
    async fn test_reqwest_connection_refused_is_no_connection() {
        let addr = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap()
        };

        let err = reqwest::get(format!("http://{addr}/")).await.unwrap_err();

        assert_eq!(err.to_error_kind(), ErrorKind::NoConnection);
    }

    #[tokio::test]
    async fn test_reqwest_decode_is_parse() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let err = reqwest::get(server.uri())
            .await
            .unwrap()
            .json::<serde_json::Value>()
            .await
            .unwrap_err();

        assert!(matches!(err.to_error_kind(), ErrorKind::Parse { .. }));
    }
}
