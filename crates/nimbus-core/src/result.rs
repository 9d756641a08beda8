//! Lifecycle envelope for one asynchronous query.

use crate::error::ErrorKind;

/// State of a query as observed by its single consumer.
///
/// A well-formed sequence is one `Loading` followed by exactly one terminal
/// state (`Success` or `Failure`), after which nothing else is emitted.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultState<T> {
    /// In flight. Carries the last cached value, if there was one.
    Loading { data: Option<T> },
    /// Terminal. Fresh remote data, or cached data used as a fallback.
    Success { data: T },
    /// Terminal. No value is available.
    Failure { error: ErrorKind },
}

impl<T> ResultState<T> {
    pub fn loading(data: Option<T>) -> Self {
        ResultState::Loading { data }
    }

    pub fn success(data: T) -> Self {
        ResultState::Success { data }
    }

    pub fn failure(error: ErrorKind) -> Self {
        ResultState::Failure { error }
    }

    /// Data of a `Success`, or of a `Loading` that carries cached data.
    pub fn data(&self) -> Option<&T> {
        match self {
            ResultState::Loading { data } => data.as_ref(),
            ResultState::Success { data } => Some(data),
            ResultState::Failure { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&ErrorKind> {
        match self {
            ResultState::Failure { error } => Some(error),
            ResultState::Loading { .. } | ResultState::Success { .. } => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, ResultState::Loading { .. })
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, ResultState::Failure { .. })
    }

    /// True for the states that end a sequence.
    pub fn is_terminal(&self) -> bool {
        !self.is_loading()
    }
}
