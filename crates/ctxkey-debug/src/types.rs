//! Data exchanged with debuggers.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A JSON schema fragment describing launch configuration attributes.
pub type JsonSchema = Value;

/// A debugger as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebuggerDescription {
    /// Debug type, e.g. `node` or `python`.
    #[serde(rename = "type")]
    pub debug_type: String,
    /// Human readable name.
    pub label: String,
}

impl DebuggerDescription {
    /// Describe a debugger.
    pub fn new(debug_type: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            debug_type: debug_type.into(),
            label: label.into(),
        }
    }
}

/// A launch configuration.
///
/// Only `type`, `name` and `request` are interpreted; every other attribute is
/// carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugConfiguration {
    /// Debug type that handles this configuration.
    #[serde(rename = "type")]
    pub debug_type: String,
    /// Display name.
    pub name: String,
    /// `launch` or `attach`.
    #[serde(default)]
    pub request: String,
    /// Debugger-specific attributes.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DebugConfiguration {
    /// A `launch` configuration with no extra attributes.
    pub fn launch(debug_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            debug_type: debug_type.into(),
            name: name.into(),
            request: "launch".to_string(),
            extra: Map::new(),
        }
    }

    /// Set an extra attribute, builder style.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.extra.insert(key.to_string(), value.into());
        self
    }
}

/// A snippet offered when editing launch configurations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationSnippet {
    /// Menu label.
    pub label: String,
    /// Longer description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Configuration body inserted by the snippet.
    pub body: Value,
}

/// A session created by a [`DebugSessionFactory`].
#[derive(Debug, Clone, PartialEq)]
pub struct DebugSession {
    /// Session id handed out by the contributor.
    pub id: String,
    /// Configuration the session was started with.
    pub configuration: DebugConfiguration,
}

/// Builds session objects for one debug type.
pub trait DebugSessionFactory: Send + Sync {
    /// Wrap a started session.
    fn create_session(&self, session_id: &str, configuration: &DebugConfiguration)
    -> DebugSession;
}
