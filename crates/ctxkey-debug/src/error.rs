use std::result::Result as StdResult;

use thiserror::Error;

/// Convenient result type for debug contribution routing.
pub type Result<T> = StdResult<T, Error>;

/// Errors surfaced by contributors and base debug services.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A contributor failed to answer a request.
    #[error("debug contributor '{debug_type}' failed: {message}")]
    Contributor {
        /// Debug type the contributor is registered under.
        debug_type: String,
        /// Failure description.
        message: String,
    },

    /// No contributor or built-in debugger handles this type.
    #[error("no debugger registered for type '{0}'")]
    UnknownDebugType(String),

    /// The session id does not name a live session.
    #[error("unknown debug session '{0}'")]
    UnknownSession(String),
}
