//! The context key service tree.
//!
//! A root [`ContextKeyService`] owns the table of every context created in its
//! tree, hands out ids, and owns the change channel. Scoped services are
//! lightweight views: each owns one context (a child of its parent's context)
//! and forwards structural operations up to the root. Disposing a scoped
//! service removes its context from the root's table; disposing the root
//! disposes every context.
//!
//! Locks are held only around table and value access; change notifications
//! are always fired with no lock held, so listeners may call back into any
//! service in the tree.

mod key;
mod target;

use std::{
    collections::HashMap,
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use parking_lot::Mutex;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use tracing::{debug, trace};

pub use key::ContextKey;
pub use target::{Element, KEYBINDING_CONTEXT_ATTR, ServiceTarget};

use crate::{
    Error, Result,
    context::{ConfigAwareContext, Context, ContextId, ContextReader, ContextStore, NullContext},
    events::{ContextKeyChangeEvent, Emitter, Subscription},
    expr::ContextKeyExpr,
    preferences::PreferenceStore,
};

/// One-way active/disposed state of a service node.
#[derive(Debug, Default)]
struct Lifecycle {
    /// Set once on disposal.
    disposed: AtomicBool,
}

impl Lifecycle {
    /// Whether the node has been disposed.
    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Move to the disposed state. Returns `false` when already disposed.
    fn dispose(&self) -> bool {
        !self.disposed.swap(true, Ordering::AcqRel)
    }
}

/// Context table owned by the root.
struct ContextTable {
    /// Every live context, keyed by id.
    contexts: HashMap<ContextId, Arc<dyn ContextStore>>,
    /// Most recently assigned id.
    last_id: ContextId,
}

/// Root- or scope-specific state.
enum NodeKind {
    /// Owns the context table.
    Root(Mutex<ContextTable>),
    /// Delegates structural operations to `parent`.
    Scoped {
        /// Service this one was created from.
        parent: ContextKeyService,
        /// Element tagged with this service's context id.
        target: Mutex<Option<Arc<dyn ServiceTarget>>>,
    },
}

/// Shared state behind a service handle.
struct ServiceNode {
    /// The context this service reads and writes.
    context_id: ContextId,
    /// Active or disposed.
    lifecycle: Lifecycle,
    /// Change channel shared by the whole tree.
    changes: Emitter<ContextKeyChangeEvent>,
    /// Root or scoped.
    kind: NodeKind,
}

/// Handle to a node in a context key service tree.
///
/// Handles are cheap to clone; all clones refer to the same node.
#[derive(Clone)]
pub struct ContextKeyService {
    /// Shared node state.
    node: Arc<ServiceNode>,
}

impl ContextKeyService {
    /// Create a root service whose `config.*` keys read from `preferences`.
    pub fn new(preferences: Arc<dyn PreferenceStore>) -> Self {
        let changes = Emitter::new();
        let root: Arc<dyn ContextStore> = Arc::new(ConfigAwareContext::new(
            ContextId::ROOT,
            preferences,
            changes.clone(),
        ));
        let mut contexts = HashMap::new();
        contexts.insert(ContextId::ROOT, root);
        debug!("context_key_service_created");
        Self {
            node: Arc::new(ServiceNode {
                context_id: ContextId::ROOT,
                lifecycle: Lifecycle::default(),
                changes,
                kind: NodeKind::Root(Mutex::new(ContextTable {
                    contexts,
                    last_id: ContextId::ROOT,
                })),
            }),
        }
    }

    /// Name used in disposed-state errors.
    fn service_name(&self) -> &'static str {
        match self.node.kind {
            NodeKind::Root(_) => "ContextKeyService",
            NodeKind::Scoped { .. } => "ScopedContextKeyService",
        }
    }

    /// Fail with [`Error::Disposed`] when this node is disposed.
    fn ensure_active(&self) -> Result<()> {
        if self.node.lifecycle.is_disposed() {
            return Err(Error::disposed(self.service_name()));
        }
        Ok(())
    }

    /// Id of the context this service owns.
    pub fn context_id(&self) -> ContextId {
        self.node.context_id
    }

    /// Whether this service has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.node.lifecycle.is_disposed()
    }

    /// Whether this is a root service.
    pub fn is_root(&self) -> bool {
        matches!(self.node.kind, NodeKind::Root(_))
    }

    /// Subscribe to key changes anywhere in this service's tree.
    pub fn on_did_change_context<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&ContextKeyChangeEvent) + Send + Sync + 'static,
    {
        self.node.changes.subscribe(listener)
    }

    /// Bind a typed key in this service's scope, writing its default.
    pub fn create_key<T>(&self, key: &str, default: Option<T>) -> Result<ContextKey<T>>
    where
        T: Serialize + DeserializeOwned,
    {
        self.ensure_active()?;
        ContextKey::new(self.clone(), key, default)
    }

    /// Create a child service with its own scope.
    ///
    /// When `target` is given, it is tagged with the new scope's id so that
    /// [`get_context`](Self::get_context) resolves it and its descendants to
    /// the new scope.
    pub fn create_scoped(&self, target: Option<Arc<dyn ServiceTarget>>) -> Result<Self> {
        self.ensure_active()?;
        let context_id = self.create_child_context(None)?;
        if let Some(target) = &target {
            target.set_attribute(KEYBINDING_CONTEXT_ATTR, &context_id.to_string());
        }
        debug!(context = %context_id, parent = %self.context_id(), "scoped_service_created");
        Ok(Self {
            node: Arc::new(ServiceNode {
                context_id,
                lifecycle: Lifecycle::default(),
                changes: self.node.changes.clone(),
                kind: NodeKind::Scoped {
                    parent: self.clone(),
                    target: Mutex::new(target),
                },
            }),
        })
    }

    /// Evaluate `rules` against this service's scope. `None` always matches.
    pub fn context_matches_rules(&self, rules: Option<&ContextKeyExpr>) -> Result<bool> {
        self.ensure_active()?;
        let Some(rules) = rules else {
            return Ok(true);
        };
        let context = self.get_context_values_container(self.context_id());
        let matched = rules.evaluate(&context);
        trace!(rules = %rules, context = %self.context_id(), matched, "context_matches_rules");
        Ok(matched)
    }

    /// Nearest value for `key` from this service's scope. `None` after
    /// disposal.
    pub fn get_context_key_value(&self, key: &str) -> Option<Value> {
        if self.is_disposed() {
            return None;
        }
        self.get_context_values_container(self.context_id())
            .get_value(key)
    }

    /// Write `key` into this service's scope, notifying when the value
    /// changed. Ignored after disposal.
    pub fn set_context(&self, key: &str, value: Value) {
        if self.is_disposed() {
            return;
        }
        let context = self.get_context_values_container(self.context_id());
        if context.set_value(key, value) {
            self.node
                .changes
                .fire(&ContextKeyChangeEvent::Single(key.to_string()));
        }
    }

    /// Remove `key` from this service's scope, notifying when it existed.
    /// Ignored after disposal.
    pub fn remove_context(&self, key: &str) {
        if self.is_disposed() {
            return;
        }
        let context = self.get_context_values_container(self.context_id());
        if context.remove_value(key) {
            self.node
                .changes
                .fire(&ContextKeyChangeEvent::Single(key.to_string()));
        }
    }

    /// The scope governing `target`: the nearest tagged ancestor-or-self, or
    /// the root scope when nothing is tagged.
    pub fn get_context(&self, target: Option<&dyn ServiceTarget>) -> Arc<dyn ContextStore> {
        if self.is_disposed() {
            return NullContext::shared();
        }
        match target::find_context_attr(target) {
            Some(id) => self.get_context_values_container(id),
            None => NullContext::shared(),
        }
    }

    /// The context registered under `id`, or the null context when there is
    /// none.
    pub fn get_context_values_container(&self, id: ContextId) -> Arc<dyn ContextStore> {
        if self.is_disposed() {
            return NullContext::shared();
        }
        match &self.node.kind {
            NodeKind::Root(table) => table
                .lock()
                .contexts
                .get(&id)
                .cloned()
                .unwrap_or_else(NullContext::shared),
            NodeKind::Scoped { parent, .. } => parent.get_context_values_container(id),
        }
    }

    /// Register a new context whose parent is `parent_id` (default: this
    /// service's own scope) and return its id.
    pub fn create_child_context(&self, parent_id: Option<ContextId>) -> Result<ContextId> {
        self.ensure_active()?;
        let parent_id = parent_id.unwrap_or(self.context_id());
        match &self.node.kind {
            NodeKind::Root(table) => {
                let mut table = table.lock();
                let id = table.last_id.next().ok_or(Error::IdsExhausted)?;
                table.last_id = id;
                let parent = table.contexts.get(&parent_id).cloned();
                let context: Arc<dyn ContextStore> = Arc::new(Context::new(id, parent.as_ref()));
                table.contexts.insert(id, context);
                debug!(context = %id, parent = %parent_id, "context_created");
                Ok(id)
            }
            NodeKind::Scoped { parent, .. } => parent.create_child_context(Some(parent_id)),
        }
    }

    /// Remove and dispose the context registered under `id`.
    pub fn dispose_context(&self, id: ContextId) {
        if self.is_disposed() {
            return;
        }
        match &self.node.kind {
            NodeKind::Root(table) => {
                let removed = table.lock().contexts.remove(&id);
                if let Some(context) = removed {
                    context.dispose();
                    debug!(context = %id, "context_disposed");
                }
            }
            NodeKind::Scoped { .. } => self.root().dispose_context(id),
        }
    }

    /// The root service of this tree.
    fn root(&self) -> &Self {
        match &self.node.kind {
            NodeKind::Root(_) => self,
            NodeKind::Scoped { parent, .. } => parent.root(),
        }
    }

    /// Dispose this service. Idempotent.
    ///
    /// A root disposes every context in its tree. A scoped service removes its
    /// own context from the root and strips the tag from its target element.
    pub fn dispose(&self) {
        if !self.node.lifecycle.dispose() {
            return;
        }
        match &self.node.kind {
            NodeKind::Root(table) => {
                let drained: Vec<Arc<dyn ContextStore>> =
                    table.lock().contexts.drain().map(|(_, c)| c).collect();
                for context in &drained {
                    context.dispose();
                }
                debug!(contexts = drained.len(), "context_key_service_disposed");
            }
            NodeKind::Scoped { target, .. } => {
                // Intermediate scopes may already be gone; the root owns the table.
                self.root().dispose_context(self.context_id());
                if let Some(target) = target.lock().take() {
                    target.remove_attribute(KEYBINDING_CONTEXT_ATTR);
                }
                debug!(context = %self.context_id(), "scoped_service_disposed");
            }
        }
    }
}

impl fmt::Debug for ContextKeyService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(self.service_name())
            .field("context_id", &self.context_id())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::preferences::MemoryPreferences;

    fn root() -> ContextKeyService {
        ContextKeyService::new(Arc::new(MemoryPreferences::new()))
    }

    #[test]
    fn ids_are_monotonic_and_never_reused() {
        let svc = root();
        let a = svc.create_child_context(None).unwrap();
        let b = svc.create_child_context(Some(a)).unwrap();
        assert_eq!((a.get(), b.get()), (1, 2));
        svc.dispose_context(b);
        let c = svc.create_child_context(None).unwrap();
        assert_eq!(c.get(), 3);
    }

    #[test]
    fn exhausted_ids_are_reported() {
        let svc = root();
        if let NodeKind::Root(table) = &svc.node.kind {
            table.lock().last_id = ContextId::new(u32::MAX - 2);
        }
        let last = svc.create_child_context(None).unwrap();
        assert_eq!(last.get(), u32::MAX - 1);
        assert!(matches!(
            svc.create_child_context(None),
            Err(Error::IdsExhausted)
        ));
        assert!(matches!(svc.create_scoped(None), Err(Error::IdsExhausted)));
        // The last real id still resolves.
        assert_eq!(svc.get_context_values_container(last).id(), last);
    }

    #[test]
    fn child_context_inherits_from_requested_parent() {
        let svc = root();
        let a = svc.create_child_context(None).unwrap();
        svc.get_context_values_container(a)
            .set_value("x", json!("from-a"));
        let b = svc.create_child_context(Some(a)).unwrap();
        assert_eq!(
            svc.get_context_values_container(b).get_value("x"),
            Some(json!("from-a"))
        );
    }

    #[test]
    fn unknown_ids_resolve_to_null() {
        let svc = root();
        let ctx = svc.get_context_values_container(ContextId::new(99));
        assert_eq!(ctx.id(), ContextId::NULL);
    }

    #[test]
    fn lifecycle_is_one_way() {
        let state = Lifecycle::default();
        assert!(!state.is_disposed());
        assert!(state.dispose());
        assert!(!state.dispose());
        assert!(state.is_disposed());
    }

    #[test]
    fn debug_names_the_node_kind() {
        let svc = root();
        let scoped = svc.create_scoped(None).unwrap();
        assert!(format!("{:?}", svc).starts_with("ContextKeyService"));
        assert!(format!("{:?}", scoped).starts_with("ScopedContextKeyService"));
        assert!(svc.is_root());
        assert!(!scoped.is_root());
    }
}
