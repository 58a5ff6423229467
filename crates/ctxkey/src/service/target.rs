//! Host elements that scoped services attach to.

use std::{collections::HashMap, fmt, sync::Arc};

use parking_lot::Mutex;

use crate::context::ContextId;

/// Attribute a scoped service writes onto its target element.
pub const KEYBINDING_CONTEXT_ATTR: &str = "data-keybinding-context";

/// A node in the host's UI tree.
///
/// Scoped services tag their element with [`KEYBINDING_CONTEXT_ATTR`]; lookups
/// from an arbitrary element walk up through [`parent_element`] to the nearest
/// tag.
///
/// [`parent_element`]: ServiceTarget::parent_element
pub trait ServiceTarget: Send + Sync {
    /// The enclosing element, if any.
    fn parent_element(&self) -> Option<Arc<dyn ServiceTarget>>;
    /// Set attribute `name` to `value`.
    fn set_attribute(&self, name: &str, value: &str);
    /// Remove attribute `name`.
    fn remove_attribute(&self, name: &str);
    /// Whether attribute `name` is present.
    fn has_attribute(&self, name: &str) -> bool;
    /// Value of attribute `name`.
    fn get_attribute(&self, name: &str) -> Option<String>;
}

/// Minimal in-memory element tree.
pub struct Element {
    /// Enclosing element.
    parent: Option<Arc<Element>>,
    /// Attribute storage.
    attributes: Mutex<HashMap<String, String>>,
}

impl Element {
    /// A parentless element.
    pub fn root() -> Arc<Self> {
        Arc::new(Self {
            parent: None,
            attributes: Mutex::new(HashMap::new()),
        })
    }

    /// A new element nested inside `parent`.
    pub fn child_of(parent: &Arc<Self>) -> Arc<Self> {
        Arc::new(Self {
            parent: Some(parent.clone()),
            attributes: Mutex::new(HashMap::new()),
        })
    }
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Element")
            .field("attributes", &*self.attributes.lock())
            .field("has_parent", &self.parent.is_some())
            .finish()
    }
}

impl ServiceTarget for Element {
    fn parent_element(&self) -> Option<Arc<dyn ServiceTarget>> {
        let parent: Arc<dyn ServiceTarget> = self.parent.clone()?;
        Some(parent)
    }

    fn set_attribute(&self, name: &str, value: &str) {
        self.attributes
            .lock()
            .insert(name.to_string(), value.to_string());
    }

    fn remove_attribute(&self, name: &str) {
        self.attributes.lock().remove(name);
    }

    fn has_attribute(&self, name: &str) -> bool {
        self.attributes.lock().contains_key(name)
    }

    fn get_attribute(&self, name: &str) -> Option<String> {
        self.attributes.lock().get(name).cloned()
    }
}

/// Context id for an element: the nearest tagged ancestor-or-self.
///
/// No element, or no tag anywhere up the chain, means the root context. A tag
/// that does not parse as an id yields `None`.
pub(crate) fn find_context_attr(target: Option<&dyn ServiceTarget>) -> Option<ContextId> {
    let Some(target) = target else {
        return Some(ContextId::ROOT);
    };
    if target.has_attribute(KEYBINDING_CONTEXT_ATTR) {
        return parse_tag(target);
    }
    let mut current = target.parent_element();
    while let Some(element) = current {
        if element.has_attribute(KEYBINDING_CONTEXT_ATTR) {
            return parse_tag(&*element);
        }
        current = element.parent_element();
    }
    Some(ContextId::ROOT)
}

/// Read the context id tag from a tagged element.
fn parse_tag(element: &dyn ServiceTarget) -> Option<ContextId> {
    element
        .get_attribute(KEYBINDING_CONTEXT_ATTR)
        .and_then(|raw| raw.parse().ok())
}
