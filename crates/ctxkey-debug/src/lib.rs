//! Debug contribution routing.
//!
//! Debuggers come from two places: a built-in [`DebugService`] and any number
//! of [`DebugContributor`]s registered at runtime (typically from plugins).
//! [`DebugContributionManager`] presents both behind one asynchronous
//! surface, preferring the contributor registered for a debug type and
//! falling back to the base service.

mod contributor;
mod error;
mod manager;
mod types;

pub use contributor::{DebugContributor, DebugService, EmptyDebugService};
pub use error::{Error, Result};
pub use manager::DebugContributionManager;
pub use types::{
    ConfigurationSnippet, DebugConfiguration, DebugSession, DebugSessionFactory,
    DebuggerDescription, JsonSchema,
};
