//! Root scope that mirrors preferences under the `config.` prefix.

use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    sync::{Arc, Weak},
};

use parking_lot::Mutex;
use serde_json::Value;
use tracing::debug;

use super::{Context, ContextId, ContextReader, ContextStore};
use crate::{
    events::{ContextKeyChangeEvent, Emitter, Subscription},
    preferences::{PreferenceChange, PreferenceStore},
};

/// Resolved `config.*` values; `None` records an unrepresentable preference.
type ConfigCache = Mutex<HashMap<String, Option<Value>>>;

/// Root context whose `config.<name>` keys read through to a preference store.
///
/// Resolved values are cached. Only numbers, booleans and strings are
/// representable; any other preference resolves to `None`. When the store
/// reports a change for `name`, the cached `config.<name>` entry is evicted and
/// a change event naming that key is fired on the service's channel.
pub struct ConfigAwareContext {
    /// Plain scope used for every key outside the `config.` namespace.
    base: Context,
    /// Upstream preference source.
    preferences: Arc<dyn PreferenceStore>,
    /// Cache of resolved config keys, shared with the change listener.
    cache: Arc<ConfigCache>,
    /// Preference change registration; taken on dispose.
    listener: Mutex<Option<Subscription>>,
}

impl ConfigAwareContext {
    /// Prefix that routes a key to the preference store.
    pub const KEY_PREFIX: &'static str = "config.";

    /// Create the root scope and subscribe to preference changes.
    ///
    /// Evictions are announced on `changes`.
    pub fn new(
        id: ContextId,
        preferences: Arc<dyn PreferenceStore>,
        changes: Emitter<ContextKeyChangeEvent>,
    ) -> Self {
        let cache: Arc<ConfigCache> = Arc::new(Mutex::new(HashMap::new()));
        let weak: Weak<ConfigCache> = Arc::downgrade(&cache);
        let listener = preferences.on_preference_changed(Box::new(
            move |change: &PreferenceChange| {
                let Some(cache) = weak.upgrade() else {
                    return;
                };
                let key = format!("{}{}", Self::KEY_PREFIX, change.preference_name);
                let evicted = cache.lock().remove(&key).is_some();
                if evicted {
                    debug!(key = %key, "config_key_evicted");
                    changes.fire(&ContextKeyChangeEvent::Multiple(vec![key]));
                }
            },
        ));
        Self {
            base: Context::new(id, None),
            preferences,
            cache,
            listener: Mutex::new(Some(listener)),
        }
    }

    /// Whether `config.<name>` currently has a cached resolution.
    pub fn is_cached(&self, key: &str) -> bool {
        self.cache.lock().contains_key(key)
    }

    /// Resolve a `config.`-prefixed key, consulting the cache first.
    ///
    /// The cache guard is held across the store read, so an eviction for
    /// this key lands either before the read or after the insert.
    fn config_value(&self, key: &str) -> Option<Value> {
        let mut cache = self.cache.lock();
        if let Some(cached) = cache.get(key) {
            return cached.clone();
        }
        let name = &key[Self::KEY_PREFIX.len()..];
        let value = self
            .preferences
            .get(name)
            .filter(|v| matches!(v, Value::Number(_) | Value::Bool(_) | Value::String(_)));
        cache.insert(key.to_string(), value.clone());
        value
    }
}

impl fmt::Debug for ConfigAwareContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigAwareContext")
            .field("base", &self.base)
            .field("cached", &self.cache.lock().len())
            .field("subscribed", &self.listener.lock().is_some())
            .finish()
    }
}

impl ContextReader for ConfigAwareContext {
    fn get_value(&self, key: &str) -> Option<Value> {
        if key.starts_with(Self::KEY_PREFIX) {
            return self.config_value(key);
        }
        self.base.get_value(key)
    }
}

impl ContextStore for ConfigAwareContext {
    fn id(&self) -> ContextId {
        self.base.id()
    }

    fn set_value(&self, key: &str, value: Value) -> bool {
        self.base.set_value(key, value)
    }

    fn remove_value(&self, key: &str) -> bool {
        self.base.remove_value(key)
    }

    fn collect_all_values(&self) -> BTreeMap<String, Value> {
        let mut all: BTreeMap<String, Value> = self
            .cache
            .lock()
            .iter()
            .filter_map(|(k, v)| v.clone().map(|v| (k.clone(), v)))
            .collect();
        all.extend(self.base.collect_all_values());
        all
    }

    fn dispose(&self) {
        if let Some(listener) = self.listener.lock().take() {
            listener.unsubscribe();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicBool, AtomicUsize, Ordering},
        thread,
        time::Duration,
    };

    use serde_json::json;

    use super::*;
    use crate::preferences::{MemoryPreferences, PreferenceListener};

    fn setup() -> (
        Arc<MemoryPreferences>,
        Emitter<ContextKeyChangeEvent>,
        ConfigAwareContext,
    ) {
        let prefs = Arc::new(MemoryPreferences::new());
        prefs.set("editor.fontSize", json!(14));
        let changes = Emitter::new();
        let ctx = ConfigAwareContext::new(ContextId::ROOT, prefs.clone(), changes.clone());
        (prefs, changes, ctx)
    }

    #[test]
    fn resolves_and_caches_config_keys() {
        let (prefs, _changes, ctx) = setup();
        assert_eq!(ctx.get_value("config.editor.fontSize"), Some(json!(14)));
        assert!(ctx.is_cached("config.editor.fontSize"));

        // Upstream changes are invisible until the store announces them; the
        // announcement evicts, so the next read re-fetches.
        prefs.set("editor.fontSize", json!(16));
        assert_eq!(ctx.get_value("config.editor.fontSize"), Some(json!(16)));
    }

    /// Store whose first read triggers a concurrent update of the same
    /// preference from another thread.
    struct RacingPreferences {
        /// Backing values.
        inner: Arc<MemoryPreferences>,
        /// Set once the writer thread has been started.
        spawned: AtomicBool,
        /// The writer thread, joined by the test.
        writer: parking_lot::Mutex<Option<thread::JoinHandle<()>>>,
    }

    impl PreferenceStore for RacingPreferences {
        fn get(&self, name: &str) -> Option<Value> {
            let value = self.inner.get(name);
            if !self.spawned.swap(true, Ordering::SeqCst) {
                let inner = self.inner.clone();
                let name = name.to_string();
                *self.writer.lock() = Some(thread::spawn(move || {
                    inner.set(&name, json!(99));
                }));
                // Give the writer a chance to fire before the cache insert.
                thread::sleep(Duration::from_millis(20));
            }
            value
        }

        fn on_preference_changed(&self, listener: PreferenceListener) -> Subscription {
            self.inner.on_preference_changed(listener)
        }
    }

    #[test]
    fn concurrent_change_during_read_is_not_lost() {
        let inner = Arc::new(MemoryPreferences::new());
        inner.set("editor.fontSize", json!(14));
        let prefs = Arc::new(RacingPreferences {
            inner,
            spawned: AtomicBool::new(false),
            writer: parking_lot::Mutex::new(None),
        });
        let ctx = ConfigAwareContext::new(ContextId::ROOT, prefs.clone(), Emitter::new());

        assert_eq!(ctx.get_value("config.editor.fontSize"), Some(json!(14)));
        if let Some(writer) = prefs.writer.lock().take() {
            writer.join().unwrap();
        }
        assert_eq!(ctx.get_value("config.editor.fontSize"), Some(json!(99)));
    }

    #[test]
    fn unrepresentable_values_resolve_to_none() {
        let (prefs, _changes, ctx) = setup();
        prefs.set("files.exclude", json!({"**/.git": true}));
        prefs.set("editor.rulers", json!([80, 100]));
        assert_eq!(ctx.get_value("config.files.exclude"), None);
        assert_eq!(ctx.get_value("config.editor.rulers"), None);
        assert_eq!(ctx.get_value("config.missing"), None);
        assert!(ctx.is_cached("config.missing"));
    }

    #[test]
    fn eviction_fires_single_key_event() {
        let (prefs, changes, ctx) = setup();
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let _sub = {
            let seen = seen.clone();
            changes.subscribe(move |e: &ContextKeyChangeEvent| seen.lock().push(e.clone()))
        };
        let _ = ctx.get_value("config.editor.fontSize");
        prefs.set("editor.fontSize", json!(20));
        // Not cached: no notification.
        prefs.set("editor.tabSize", json!(2));

        assert_eq!(
            *seen.lock(),
            vec![ContextKeyChangeEvent::Multiple(vec![
                "config.editor.fontSize".to_string()
            ])]
        );
        assert!(!ctx.is_cached("config.editor.fontSize"));
    }

    #[test]
    fn plain_keys_use_local_values() {
        let (_prefs, _changes, ctx) = setup();
        assert!(ctx.set_value("editorFocus", json!(true)));
        assert_eq!(ctx.get_value("editorFocus"), Some(json!(true)));
        let _ = ctx.get_value("config.editor.fontSize");
        let all = ctx.collect_all_values();
        assert_eq!(all.get("config.editor.fontSize"), Some(&json!(14)));
        assert_eq!(all.get("editorFocus"), Some(&json!(true)));
    }

    #[test]
    fn dispose_unsubscribes() {
        let (prefs, changes, ctx) = setup();
        let count = Arc::new(AtomicUsize::new(0));
        let _sub = {
            let count = count.clone();
            changes.subscribe(move |_| {
                count.fetch_add(1, Ordering::SeqCst);
            })
        };
        let _ = ctx.get_value("config.editor.fontSize");
        ctx.dispose();
        prefs.set("editor.fontSize", json!(15));
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(ctx.is_cached("config.editor.fontSize"));
    }
}
