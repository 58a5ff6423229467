//! Preference storage consulted by the `config.*` context namespace.
//!
//! The engine only ever reads preferences. [`PreferenceStore`] is the seam a
//! host implements; [`MemoryPreferences`] is a ready-made in-memory store that
//! can be loaded from JSON or RON and updated programmatically.

use std::{ffi::OsStr, fs, path::Path};

use parking_lot::Mutex;
use serde_json::{Map, Value};
use tracing::debug;

use crate::{
    Error, Result,
    events::{Emitter, Subscription},
};

/// A single upstream preference change.
#[derive(Debug, Clone, PartialEq)]
pub struct PreferenceChange {
    /// Dotted preference name, e.g. `editor.fontSize`.
    pub preference_name: String,
    /// Value before the change, if any.
    pub old_value: Option<Value>,
    /// Value after the change, if any.
    pub new_value: Option<Value>,
}

/// Callback invoked for every preference change.
pub type PreferenceListener = Box<dyn Fn(&PreferenceChange) + Send + Sync>;

/// Read-only view of a preference service.
pub trait PreferenceStore: Send + Sync {
    /// Current value of preference `name`.
    fn get(&self, name: &str) -> Option<Value>;

    /// Register for change notifications until the subscription is dropped.
    fn on_preference_changed(&self, listener: PreferenceListener) -> Subscription;
}

/// In-memory preference store.
///
/// Lookups first try the exact name, then descend through nested objects, so
/// `{"editor": {"fontSize": 14}}` answers `editor.fontSize` as well as a flat
/// `{"editor.fontSize": 14}` does.
#[derive(Debug, Default)]
pub struct MemoryPreferences {
    /// Stored preference tree.
    values: Mutex<Map<String, Value>>,
    /// Change feed.
    changes: Emitter<PreferenceChange>,
}

impl MemoryPreferences {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store seeded with `values`.
    pub fn from_map(values: Map<String, Value>) -> Self {
        Self {
            values: Mutex::new(values),
            changes: Emitter::new(),
        }
    }

    /// Load preferences from a JSON object.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(value)
    }

    /// Load preferences from a RON map.
    pub fn from_ron_str(text: &str) -> Result<Self> {
        let value: Value = ron::from_str(text)?;
        Self::from_value(value)
    }

    /// Load preferences from a `.json` or `.ron` file.
    pub fn from_path(path: &Path) -> Result<Self> {
        read_map_file(path).map(Self::from_map)
    }

    /// Validate that a parsed document is a map.
    fn from_value(value: Value) -> Result<Self> {
        into_map(value).map(Self::from_map)
    }

    /// Set preference `name`; fires a change event when the value changed.
    pub fn set(&self, name: &str, value: Value) -> bool {
        let old_value = {
            let mut values = self.values.lock();
            let old = lookup(&values, name).cloned();
            if old.as_ref() == Some(&value) {
                return false;
            }
            values.insert(name.to_string(), value.clone());
            old
        };
        debug!(preference = name, "preference_set");
        self.changes.fire(&PreferenceChange {
            preference_name: name.to_string(),
            old_value,
            new_value: Some(value),
        });
        true
    }

    /// Remove the flat entry `name`; fires a change event when it existed.
    pub fn remove(&self, name: &str) -> bool {
        let Some(old_value) = self.values.lock().remove(name) else {
            return false;
        };
        debug!(preference = name, "preference_removed");
        self.changes.fire(&PreferenceChange {
            preference_name: name.to_string(),
            old_value: Some(old_value),
            new_value: None,
        });
        true
    }
}

impl PreferenceStore for MemoryPreferences {
    fn get(&self, name: &str) -> Option<Value> {
        lookup(&self.values.lock(), name).cloned()
    }

    fn on_preference_changed(&self, listener: PreferenceListener) -> Subscription {
        self.changes.subscribe(listener)
    }
}

/// Read a JSON or RON map from `path`, choosing the format by extension.
pub fn read_map_file(path: &Path) -> Result<Map<String, Value>> {
    let text = fs::read_to_string(path)
        .map_err(|e| Error::Preferences(format!("{}: {}", path.display(), e)))?;
    let value: Value = match path.extension().and_then(OsStr::to_str) {
        Some("json") => serde_json::from_str(&text)?,
        Some("ron") => ron::from_str(&text)?,
        _ => {
            return Err(Error::Preferences(format!(
                "{}: unsupported format (expected .json or .ron)",
                path.display()
            )));
        }
    };
    into_map(value)
}

/// Accept only map documents.
fn into_map(value: Value) -> Result<Map<String, Value>> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(Error::Preferences(format!(
            "expected a map of values, found {}",
            other
        ))),
    }
}

/// Resolve a dotted name against a map, trying the exact key before
/// descending into nested objects at each `.` boundary.
fn lookup<'a>(map: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    if let Some(v) = map.get(name) {
        return Some(v);
    }
    name.match_indices('.').find_map(|(i, _)| {
        let (head, rest) = (&name[..i], &name[i + 1..]);
        match map.get(head) {
            Some(Value::Object(inner)) => lookup(inner, rest),
            _ => None,
        }
    })
}
