use std::result::Result as StdResult;

use thiserror::Error;

/// Convenient result type for the ctxkey crate.
pub type Result<T> = StdResult<T, Error>;

/// Unified error type for context and service operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A structural operation was attempted on a disposed service.
    #[error("{service} has been disposed")]
    Disposed {
        /// Which kind of service rejected the call.
        service: &'static str,
    },

    /// Every context id has been handed out.
    #[error("context ids exhausted")]
    IdsExhausted,

    /// A typed context key could not convert its value to or from JSON.
    #[error("context key '{key}' holds a value of the wrong type: {message}")]
    KeyValue {
        /// The context key name.
        key: String,
        /// Conversion failure reported by serde.
        message: String,
    },

    /// Preference data could not be loaded.
    #[error("Preference load error: {0}")]
    Preferences(String),
}

impl Error {
    /// Build a disposed-state error for the given service kind.
    pub(crate) fn disposed(service: &'static str) -> Self {
        Self::Disposed { service }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Preferences(err.to_string())
    }
}

impl From<ron::error::SpannedError> for Error {
    fn from(err: ron::error::SpannedError) -> Self {
        Self::Preferences(err.to_string())
    }
}
