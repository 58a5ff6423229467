//! ctxkey
//!
//! Context keys and when-clause rules. A host publishes typed facts about its
//! current state ("editor has focus", "language is go") into a tree of
//! scoped contexts, and asks whether a rule such as
//! `editorFocus && !inDebugMode` holds for a given scope.
//!
//! The main entry points:
//! - [`ContextKeyService`]: root or scoped service owning the context tree
//! - [`ContextKeyExpr`]: parsed, normalized when-clause expressions
//! - [`RawContextKey`] and [`ContextKey`]: declared and bound typed keys
//! - [`PreferenceStore`]: the read-only preference seam behind `config.*` keys
//!
//! Values are `serde_json::Value`s throughout; [`value`] defines how rules
//! interpret them.

mod context;
mod error;
mod events;
mod expr;
mod preferences;
mod service;
pub mod value;

pub use context::{
    CONTEXT_ID_KEY, ConfigAwareContext, Context, ContextId, ContextReader, ContextStore,
    NullContext,
};
pub use error::{Error, Result};
pub use events::{ContextKeyChangeEvent, Emitter, ReadableSet, Subscription};
pub use expr::{
    ContextKeyExpr, ExprType, ParseDiagnostic, Parsed, PatternError, RawContextKey, RegexPattern,
    cmp_exprs, parse_with_diagnostics,
};
pub use preferences::{
    MemoryPreferences, PreferenceChange, PreferenceListener, PreferenceStore, read_map_file,
};
pub use service::{ContextKey, ContextKeyService, Element, KEYBINDING_CONTEXT_ATTR, ServiceTarget};
