//! Bijective key/value map used by the identity caches
//!
//! Lookups happen by key (the native handle) while eviction happens by value
//! (the proxy being torn down), so both directions are indexed. Values are
//! indexed in reverse by their [`ProxyId`] rather than by the value itself,
//! which keeps the reverse index free of extra clones of counted handles.
//!
//! Not synchronized: the owning identity cache serializes access.

use crate::handle::{RefCounted, RefPtr};
use std::collections::HashMap;
use std::hash::Hash;
use std::rc::{Rc, Weak};
use std::sync::Arc;

/// Address-derived identity of a proxy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProxyId(usize);

impl ProxyId {
    /// Identity of the value behind `ptr`
    pub fn of<T: ?Sized>(ptr: *const T) -> Self {
        Self(ptr as *const () as usize)
    }

    /// Identity of a borrowed value
    pub fn of_ref<T: ?Sized>(value: &T) -> Self {
        Self::of(value as *const T)
    }
}

/// Values that can be indexed by identity
pub trait Identity {
    /// Identity of this value
    fn identity(&self) -> ProxyId;
}

impl<T: ?Sized> Identity for Rc<T> {
    fn identity(&self) -> ProxyId {
        ProxyId::of(Rc::as_ptr(self))
    }
}

impl<T> Identity for Weak<T> {
    fn identity(&self) -> ProxyId {
        ProxyId::of(self.as_ptr())
    }
}

impl<T: ?Sized> Identity for Arc<T> {
    fn identity(&self) -> ProxyId {
        ProxyId::of(Arc::as_ptr(self))
    }
}

impl<T: RefCounted> Identity for RefPtr<T> {
    fn identity(&self) -> ProxyId {
        ProxyId::of(self.as_ptr())
    }
}

/// Map with unique keys and unique values
#[derive(Debug)]
pub struct BidiMap<K, V> {
    forward: HashMap<K, V>,
    reverse: HashMap<ProxyId, K>,
}

impl<K, V> Default for BidiMap<K, V> {
    fn default() -> Self {
        Self {
            forward: HashMap::new(),
            reverse: HashMap::new(),
        }
    }
}

impl<K, V> BidiMap<K, V> {
    /// Number of entries
    pub fn len(&self) -> usize {
        self.forward.len()
    }

    /// Whether the map is empty
    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }
}

impl<K, V> BidiMap<K, V>
where
    K: Eq + Hash + Clone,
    V: Identity + Clone,
{
    /// Create an empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Value stored under `key`
    pub fn get(&self, key: &K) -> Option<V> {
        self.forward.get(key).cloned()
    }

    /// Whether `key` is present
    pub fn contains_key(&self, key: &K) -> bool {
        self.forward.contains_key(key)
    }

    /// Key whose value has identity `id`
    pub fn key_of(&self, id: ProxyId) -> Option<&K> {
        self.reverse.get(&id)
    }

    /// Return the value for `key`, inserting `factory()` if absent
    ///
    /// The factory runs at most once and only when `key` is missing.
    pub fn compute_if_absent<F>(&mut self, key: K, factory: F) -> V
    where
        F: FnOnce() -> V,
    {
        if let Some(existing) = self.forward.get(&key) {
            return existing.clone();
        }
        let value = factory();
        self.insert_new(key, value.clone());
        value
    }

    /// Fallible [`compute_if_absent`](Self::compute_if_absent)
    ///
    /// A failing factory leaves the map untouched.
    pub fn try_compute_if_absent<F, E>(&mut self, key: K, factory: F) -> Result<V, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        if let Some(existing) = self.forward.get(&key) {
            return Ok(existing.clone());
        }
        let value = factory()?;
        self.insert_new(key, value.clone());
        Ok(value)
    }

    fn insert_new(&mut self, key: K, value: V) {
        let id = value.identity();
        if let Some(stale_key) = self.reverse.insert(id, key.clone()) {
            // The same value under a second key would break the bijection.
            self.forward.remove(&stale_key);
        }
        self.forward.insert(key, value);
    }

    /// Remove the entry whose value is `value`; no-op if absent
    pub fn remove_by_value(&mut self, value: &V) -> Option<(K, V)> {
        self.remove_by_identity(value.identity())
    }

    /// Remove the entry whose value has identity `id`; no-op if absent
    pub fn remove_by_identity(&mut self, id: ProxyId) -> Option<(K, V)> {
        let key = self.reverse.remove(&id)?;
        let value = self.forward.remove(&key)?;
        Some((key, value))
    }

    /// Remove the entry stored under `key`
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let value = self.forward.remove(key)?;
        self.reverse.remove(&value.identity());
        Some(value)
    }

    /// Remove every entry, returning them
    pub fn drain(&mut self) -> Vec<(K, V)> {
        self.reverse.clear();
        self.forward.drain().collect()
    }

    /// Keys currently present
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.forward.keys()
    }

    /// Values currently present
    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.forward.values()
    }
}
