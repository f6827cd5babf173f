//! # Execution Context
//!
//! An opaque attribute store shared by every unit of work and cleanup handler
//! running on behalf of one runner, worker or pool.
//!
//! The runtime never reads or writes attributes itself; it only threads the
//! same [`Context`] reference through to user code. Values are type-erased and
//! retrieved by downcasting.
//!
//! ```rust
//! use spindle_api::Context;
//!
//! let context = Context::new();
//! context.set("started", "yes");
//! assert!(context.contains("started"));
//! assert_eq!(context.get::<&str>("started").as_deref(), Some(&"yes"));
//! ```

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

type Attribute = Arc<dyn Any + Send + Sync>;

/// Key/value attribute store with unique keys.
#[derive(Default)]
pub struct Context {
    attributes: RwLock<HashMap<String, Attribute>>,
}

impl Context {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty context ready to be shared between threads.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Returns the attribute stored under `key` if it has type `T`.
    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        let attributes = self.attributes.read().unwrap_or_else(PoisonError::into_inner);
        attributes
            .get(key)
            .cloned()
            .and_then(|value| value.downcast::<T>().ok())
    }

    /// Stores `value` under `key`, returning true if an earlier value was replaced.
    pub fn set<T: Any + Send + Sync>(&self, key: impl Into<String>, value: T) -> bool {
        let mut attributes = self.attributes.write().unwrap_or_else(PoisonError::into_inner);
        attributes.insert(key.into(), Arc::new(value)).is_some()
    }

    /// Removes the attribute stored under `key`.
    pub fn remove(&self, key: &str) -> bool {
        let mut attributes = self.attributes.write().unwrap_or_else(PoisonError::into_inner);
        attributes.remove(key).is_some()
    }

    /// Returns true if an attribute of any type is stored under `key`.
    pub fn contains(&self, key: &str) -> bool {
        let attributes = self.attributes.read().unwrap_or_else(PoisonError::into_inner);
        attributes.contains_key(key)
    }

    /// Snapshot of the attribute keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let attributes = self.attributes.read().unwrap_or_else(PoisonError::into_inner);
        let mut keys: Vec<String> = attributes.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Removes every attribute.
    pub fn clear(&self) {
        let mut attributes = self.attributes.write().unwrap_or_else(PoisonError::into_inner);
        attributes.clear();
    }

    pub fn len(&self) -> usize {
        self.attributes.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("keys", &self.keys())
            .finish()
    }
}
