//! Per-document lock registry.
//!
//! Writes and deletes to a single document are serialized by an advisory
//! lock keyed `collection/document`. Locks are created lazily under one
//! registry-level mutex and never removed; the registry grows with the
//! number of distinct documents ever touched, which is acceptable for the
//! working sets this store targets.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Registry of lazily-created per-document locks
#[derive(Debug, Default)]
pub struct LockRegistry {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl LockRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the lock for `key`, creating it on first use.
    ///
    /// The caller locks the returned handle for the duration of the
    /// critical section; the registry lock itself is held only for the
    /// map lookup.
    pub fn acquire(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().expect("lock registry poisoned");
        locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Number of distinct keys ever locked
    pub fn len(&self) -> usize {
        self.locks.lock().expect("lock registry poisoned").len()
    }

    /// Whether no key has been locked yet
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Build the canonical `collection/document` lock key
pub fn lock_key(collection: &str, id: &str) -> String {
    format!("{collection}/{id}")
}
