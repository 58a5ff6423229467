//! Error handling for the ctxkey command.

use std::{io, result};

use thiserror::Error;

/// Convenient result type for command execution.
pub type Result<T> = result::Result<T, Error>;

/// Errors that can occur while running a command.
#[derive(Debug, Error)]
pub enum Error {
    /// Wrapper for standard I/O errors.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// Context, preference or service failures.
    #[error("{0}")]
    Context(#[from] ctxkey::Error),
}
