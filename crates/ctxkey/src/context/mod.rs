//! Layered key/value scopes that rules are evaluated against.
//!
//! A [`Context`] holds local values and a weak link to its parent scope;
//! lookups that miss locally fall through to the parent. Strong ownership of
//! every context lives in the service's context table, so a parent that has
//! been removed from the table simply ends the chain.

mod config;

use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    num::ParseIntError,
    str::FromStr,
    sync::{Arc, Weak},
};

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use serde_json::{Map, Value};

pub use config::ConfigAwareContext;

/// Internal bookkeeping key holding a context's own id.
pub const CONTEXT_ID_KEY: &str = "_contextId";

/// Identifier of a context within a service tree.
///
/// Ids are assigned monotonically by the root service and never reused while
/// the root is alive, so a stale id can only miss, never alias.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(u32);

impl ContextId {
    /// The root service's own context.
    pub const ROOT: Self = Self(0);

    /// Id reported by [`NullContext`]; never assigned to a real context.
    pub const NULL: Self = Self(u32::MAX);

    /// Wrap a raw id.
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// The raw numeric id.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// The id following this one, or `None` once the id space is spent.
    /// [`Self::NULL`] is never handed out.
    pub(crate) fn next(self) -> Option<Self> {
        self.0
            .checked_add(1)
            .map(Self)
            .filter(|id| *id != Self::NULL)
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ContextId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u32>().map(Self)
    }
}

/// Anything rules can read values from.
pub trait ContextReader {
    /// The nearest value for `key`, or `None` when it is not defined.
    fn get_value(&self, key: &str) -> Option<Value>;
}

/// A mutable scope held in a service's context table.
pub trait ContextStore: ContextReader + Send + Sync {
    /// This scope's id.
    fn id(&self) -> ContextId;

    /// Write `key` locally. Returns `true` when the stored value changed.
    fn set_value(&self, key: &str, value: Value) -> bool;

    /// Delete the local entry for `key`. Returns `true` when one existed.
    fn remove_value(&self, key: &str) -> bool;

    /// The effective mapping: parent values overridden by local ones, without
    /// internal bookkeeping keys.
    fn collect_all_values(&self) -> BTreeMap<String, Value>;

    /// Release resources held by this scope.
    fn dispose(&self) {}
}

impl<T: ContextReader + ?Sized> ContextReader for Arc<T> {
    fn get_value(&self, key: &str) -> Option<Value> {
        (**self).get_value(key)
    }
}

impl ContextReader for HashMap<String, Value> {
    fn get_value(&self, key: &str) -> Option<Value> {
        self.get(key).cloned()
    }
}

impl ContextReader for BTreeMap<String, Value> {
    fn get_value(&self, key: &str) -> Option<Value> {
        self.get(key).cloned()
    }
}

impl ContextReader for Map<String, Value> {
    fn get_value(&self, key: &str) -> Option<Value> {
        self.get(key).cloned()
    }
}

/// A single scope: local values plus an optional parent for fallback.
pub struct Context {
    /// This scope's id.
    id: ContextId,
    /// Fallback scope; owned by the context table, not by this context.
    parent: Option<Weak<dyn ContextStore>>,
    /// Local values, including the `_contextId` entry.
    values: Mutex<HashMap<String, Value>>,
}

impl Context {
    /// Create a scope with the given id and optional parent.
    pub fn new(id: ContextId, parent: Option<&Arc<dyn ContextStore>>) -> Self {
        let mut values = HashMap::new();
        values.insert(CONTEXT_ID_KEY.to_string(), Value::from(id.get()));
        Self {
            id,
            parent: parent.map(Arc::downgrade),
            values: Mutex::new(values),
        }
    }

    /// The parent scope, if it is still alive.
    pub fn parent(&self) -> Option<Arc<dyn ContextStore>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.id)
            .field("parent", &self.parent().map(|p| p.id()))
            .field("values", &self.values.lock().len())
            .finish()
    }
}

impl ContextReader for Context {
    fn get_value(&self, key: &str) -> Option<Value> {
        if let Some(v) = self.values.lock().get(key) {
            return Some(v.clone());
        }
        self.parent().and_then(|p| p.get_value(key))
    }
}

impl ContextStore for Context {
    fn id(&self) -> ContextId {
        self.id
    }

    fn set_value(&self, key: &str, value: Value) -> bool {
        let mut values = self.values.lock();
        if values.get(key) == Some(&value) {
            return false;
        }
        values.insert(key.to_string(), value);
        true
    }

    fn remove_value(&self, key: &str) -> bool {
        self.values.lock().remove(key).is_some()
    }

    fn collect_all_values(&self) -> BTreeMap<String, Value> {
        let mut all = self
            .parent()
            .map(|p| p.collect_all_values())
            .unwrap_or_default();
        all.extend(
            self.values
                .lock()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        all.remove(CONTEXT_ID_KEY);
        all
    }
}

/// Shared inert instance handed out by [`NullContext::shared`].
static NULL_CONTEXT: Lazy<Arc<NullContext>> = Lazy::new(|| Arc::new(NullContext));

/// Sentinel scope: always empty and ignores writes.
///
/// Returned by services after disposal and for ids that no longer resolve.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullContext;

impl NullContext {
    /// The process-wide instance.
    pub fn shared() -> Arc<dyn ContextStore> {
        let shared: Arc<Self> = NULL_CONTEXT.clone();
        shared
    }
}

impl ContextReader for NullContext {
    fn get_value(&self, _key: &str) -> Option<Value> {
        None
    }
}

impl ContextStore for NullContext {
    fn id(&self) -> ContextId {
        ContextId::NULL
    }

    fn set_value(&self, _key: &str, _value: Value) -> bool {
        false
    }

    fn remove_value(&self, _key: &str) -> bool {
        false
    }

    fn collect_all_values(&self) -> BTreeMap<String, Value> {
        BTreeMap::new()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn scope(id: u32, parent: Option<&Arc<dyn ContextStore>>) -> Arc<dyn ContextStore> {
        Arc::new(Context::new(ContextId::new(id), parent))
    }

    #[test]
    fn id_sequence_stops_before_null() {
        assert_eq!(ContextId::ROOT.next(), Some(ContextId::new(1)));
        assert_eq!(ContextId::new(u32::MAX - 2).next(), Some(ContextId::new(u32::MAX - 1)));
        assert_eq!(ContextId::new(u32::MAX - 1).next(), None);
        assert_eq!(ContextId::NULL.next(), None);
    }

    #[test]
    fn child_shadows_parent() {
        let parent = scope(1, None);
        parent.set_value("x", json!(1));
        let child = scope(2, Some(&parent));
        child.set_value("x", json!(2));

        assert_eq!(child.get_value("x"), Some(json!(2)));
        assert_eq!(parent.get_value("x"), Some(json!(1)));
        assert_eq!(child.collect_all_values().get("x"), Some(&json!(2)));
    }

    #[test]
    fn lookup_falls_back_to_parent() {
        let parent = scope(1, None);
        parent.set_value("y", json!(5));
        let child = scope(2, Some(&parent));
        assert_eq!(child.get_value("y"), Some(json!(5)));
        assert_eq!(child.get_value("z"), None);
    }

    #[test]
    fn set_reports_changes_by_value() {
        let ctx = scope(1, None);
        assert!(ctx.set_value("k", json!("v")));
        assert!(!ctx.set_value("k", json!("v")));
        assert!(ctx.set_value("k", json!("w")));
        assert!(ctx.remove_value("k"));
        assert!(!ctx.remove_value("k"));
    }

    #[test]
    fn collect_hides_bookkeeping_key() {
        let parent = scope(1, None);
        parent.set_value("a", json!(true));
        let child = scope(2, Some(&parent));
        child.set_value("b", json!("x"));

        assert_eq!(child.get_value(CONTEXT_ID_KEY), Some(json!(2)));
        let all = child.collect_all_values();
        assert!(!all.contains_key(CONTEXT_ID_KEY));
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn dropped_parent_ends_chain() {
        let parent = scope(1, None);
        parent.set_value("y", json!(5));
        let child = scope(2, Some(&parent));
        drop(parent);
        assert_eq!(child.get_value("y"), None);
    }

    #[test]
    fn null_context_is_inert() {
        let null = NullContext::shared();
        assert!(!null.set_value("k", json!(1)));
        assert_eq!(null.get_value("k"), None);
        assert!(!null.remove_value("k"));
        assert!(null.collect_all_values().is_empty());
        assert_eq!(null.id(), ContextId::NULL);
    }

    #[test]
    fn context_id_parses() {
        assert_eq!("12".parse::<ContextId>(), Ok(ContextId::new(12)));
        assert!("NaN".parse::<ContextId>().is_err());
        assert_eq!(ContextId::new(3).to_string(), "3");
    }
}
