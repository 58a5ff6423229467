//! Synchronous publish/subscribe channel and context change events.
//!
//! An [`Emitter`] delivers every fired event to each live listener, in
//! registration order, on the caller's thread. The listener list is
//! snapshotted before delivery and no lock is held while listeners run, so a
//! listener may re-enter the emitter (or the service that owns it) freely.

use std::{
    collections::{BTreeSet, HashSet},
    fmt, slice,
    sync::{Arc, Weak},
};

use parking_lot::Mutex;

/// Shared callback type stored by an emitter.
type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Listener table behind an emitter.
struct Registry<T> {
    /// Next registration id; ids are never reused.
    next_id: u64,
    /// Live listeners in registration order.
    listeners: Vec<(u64, Listener<T>)>,
}

/// Fan-out channel for events of type `T`.
pub struct Emitter<T> {
    /// Shared listener table; subscriptions hold a weak reference to it.
    registry: Arc<Mutex<Registry<T>>>,
}

impl<T> Clone for Emitter<T> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
        }
    }
}

impl<T: 'static> Default for Emitter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Emitter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Emitter")
            .field("listeners", &self.registry.lock().listeners.len())
            .finish()
    }
}

impl<T: 'static> Emitter<T> {
    /// Create an emitter with no listeners.
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry {
                next_id: 0,
                listeners: Vec::new(),
            })),
        }
    }

    /// Register `listener`; it stays registered until the returned
    /// [`Subscription`] is dropped or unsubscribed.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = {
            let mut reg = self.registry.lock();
            let id = reg.next_id;
            reg.next_id += 1;
            let listener: Listener<T> = Arc::new(listener);
            reg.listeners.push((id, listener));
            id
        };
        let weak: Weak<Mutex<Registry<T>>> = Arc::downgrade(&self.registry);
        Subscription::new(move || {
            if let Some(registry) = weak.upgrade() {
                registry.lock().listeners.retain(|(lid, _)| *lid != id);
            }
        })
    }

    /// Deliver `event` to every listener registered at the time of the call.
    pub fn fire(&self, event: &T) {
        let snapshot: Vec<Listener<T>> = self
            .registry
            .lock()
            .listeners
            .iter()
            .map(|(_, l)| l.clone())
            .collect();
        for listener in snapshot {
            listener(event);
        }
    }

    /// Number of live listeners.
    pub fn listener_count(&self) -> usize {
        self.registry.lock().listeners.len()
    }
}

/// Registration handle returned by [`Emitter::subscribe`] and by preference
/// stores. Dropping the handle unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    /// Teardown action; `None` once run or for inert handles.
    teardown: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// Wrap a teardown action.
    pub fn new<F>(teardown: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            teardown: Some(Box::new(teardown)),
        }
    }

    /// A handle that does nothing when dropped.
    pub fn empty() -> Self {
        Self { teardown: None }
    }

    /// Unsubscribe now.
    pub fn unsubscribe(mut self) {
        self.run();
    }

    /// Run the teardown action at most once.
    fn run(&mut self) {
        if let Some(teardown) = self.teardown.take() {
            teardown();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.run();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.teardown.is_some())
            .finish()
    }
}

/// Read-only membership test used by [`ContextKeyChangeEvent::affects_some`].
pub trait ReadableSet {
    /// True when `key` is a member.
    fn has(&self, key: &str) -> bool;
}

impl ReadableSet for HashSet<String> {
    fn has(&self, key: &str) -> bool {
        self.contains(key)
    }
}

impl ReadableSet for BTreeSet<String> {
    fn has(&self, key: &str) -> bool {
        self.contains(key)
    }
}

impl ReadableSet for [&str] {
    fn has(&self, key: &str) -> bool {
        self.contains(&key)
    }
}

impl<const N: usize> ReadableSet for [&str; N] {
    fn has(&self, key: &str) -> bool {
        self.contains(&key)
    }
}

/// Notification that one or more context keys changed value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextKeyChangeEvent {
    /// A single key was set or removed through the service.
    Single(String),
    /// Several keys changed at once (e.g. evicted `config.*` entries).
    Multiple(Vec<String>),
}

impl ContextKeyChangeEvent {
    /// True when any changed key is in `keys`.
    pub fn affects_some<S: ReadableSet + ?Sized>(&self, keys: &S) -> bool {
        match self {
            Self::Single(key) => keys.has(key),
            Self::Multiple(changed) => changed.iter().any(|k| keys.has(k)),
        }
    }

    /// True when `key` changed.
    pub fn affects(&self, key: &str) -> bool {
        self.keys().any(|k| k == key)
    }

    /// The changed keys.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        let keys: &[String] = match self {
            Self::Single(key) => slice::from_ref(key),
            Self::Multiple(changed) => changed,
        };
        keys.iter().map(String::as_str)
    }
}
