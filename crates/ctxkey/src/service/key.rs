//! Typed handles to keys bound in a service's own scope.

use std::fmt;

use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

use super::ContextKeyService;
use crate::{Error, Result};

/// A key bound to one service; reads and writes go to that service's scope.
pub struct ContextKey<T> {
    /// Owning service.
    service: ContextKeyService,
    /// Key name.
    key: String,
    /// Value restored by [`reset`](Self::reset).
    default: Option<T>,
}

impl<T> ContextKey<T>
where
    T: Serialize + DeserializeOwned,
{
    /// Bind `key` and write its default.
    pub(crate) fn new(service: ContextKeyService, key: &str, default: Option<T>) -> Result<Self> {
        let bound = Self {
            service,
            key: key.to_string(),
            default,
        };
        bound.reset()?;
        Ok(bound)
    }

    /// The key name.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Write `value` into the owning service's scope.
    pub fn set(&self, value: &T) -> Result<()> {
        let value = self.to_json(value)?;
        self.service.set_context(&self.key, value);
        Ok(())
    }

    /// Restore the default, or remove the key when there is none.
    pub fn reset(&self) -> Result<()> {
        match &self.default {
            Some(default) => {
                let value = self.to_json(default)?;
                self.service.set_context(&self.key, value);
            }
            None => self.service.remove_context(&self.key),
        }
        Ok(())
    }

    /// Current value as seen from the owning service, including inherited
    /// values.
    pub fn get(&self) -> Result<Option<T>> {
        self.service
            .get_context_key_value(&self.key)
            .map(|v| {
                serde_json::from_value(v).map_err(|e| Error::KeyValue {
                    key: self.key.clone(),
                    message: e.to_string(),
                })
            })
            .transpose()
    }

    /// Serialize a value for storage.
    fn to_json(&self, value: &T) -> Result<Value> {
        serde_json::to_value(value).map_err(|e| Error::KeyValue {
            key: self.key.clone(),
            message: e.to_string(),
        })
    }
}

impl<T> fmt::Debug for ContextKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextKey")
            .field("key", &self.key)
            .field("service", &self.service.context_id())
            .finish()
    }
}
