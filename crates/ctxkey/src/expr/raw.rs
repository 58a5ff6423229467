//! Typed key declarations that double as expression builders.

use std::marker::PhantomData;

use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

use super::ContextKeyExpr;
use crate::{
    Error, Result,
    service::{ContextKey, ContextKeyService},
};

/// A context key declaration: a name, a value type and an optional default.
///
/// Declarations are inert until bound to a service with
/// [`bind_to`](Self::bind_to). They also act as expression builders, so a
/// declared key can be used directly in rules.
#[derive(Debug, Clone)]
pub struct RawContextKey<T> {
    /// Key name.
    key: String,
    /// Value written when the key is bound or reset.
    default: Option<T>,
    /// Value type marker.
    _type: PhantomData<fn() -> T>,
}

impl<T> RawContextKey<T>
where
    T: Serialize + DeserializeOwned + Clone,
{
    /// Declare `key` with an optional default.
    pub fn new(key: impl Into<String>, default: Option<T>) -> Self {
        Self {
            key: key.into(),
            default,
            _type: PhantomData,
        }
    }

    /// The key name.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Bind to `service`, writing the default into the service's own scope.
    pub fn bind_to(&self, service: &ContextKeyService) -> Result<ContextKey<T>> {
        service.create_key(&self.key, self.default.clone())
    }

    /// Current value of this key as seen from `service`.
    pub fn get_value(&self, service: &ContextKeyService) -> Result<Option<T>> {
        service
            .get_context_key_value(&self.key)
            .map(|v| {
                serde_json::from_value(v).map_err(|e| Error::KeyValue {
                    key: self.key.clone(),
                    message: e.to_string(),
                })
            })
            .transpose()
    }

    /// `key`
    pub fn to_expr(&self) -> ContextKeyExpr {
        ContextKeyExpr::has(&self.key)
    }

    /// `!key`
    pub fn to_negated(&self) -> ContextKeyExpr {
        ContextKeyExpr::not(&self.key)
    }

    /// `key == value`
    pub fn is_equal_to(&self, value: impl Into<Value>) -> ContextKeyExpr {
        ContextKeyExpr::equals(&self.key, value)
    }

    /// `key != value`
    pub fn not_equal_to(&self, value: impl Into<Value>) -> ContextKeyExpr {
        ContextKeyExpr::not_equals(&self.key, value)
    }
}

impl<T> From<&RawContextKey<T>> for ContextKeyExpr {
    fn from(raw: &RawContextKey<T>) -> Self {
        Self::has(&raw.key)
    }
}
