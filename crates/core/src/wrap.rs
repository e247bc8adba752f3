//! Identity caches: one proxy per native handle
//!
//! Two flavors share one contract:
//!
//! - [`Wrap`] is the shared, weak cache. It stores [`Weak`] references, so
//!   it never extends a proxy's lifetime. It is owned by the registry
//!   context and handed by reference to whoever needs it.
//! - [`OwnedWrap`] is scoped to the object that holds it. It resolves
//!   proxies through a shared [`Wrap`] and keeps each one pinned with a
//!   [`RefPtr`] for as long as the scope lives.
//!
//! A proxy must call [`Wrap::release`] from its own `Drop` once it is
//! otherwise torn down. Both caches are `!Send`, which confines every
//! lookup, insertion and release to the designated thread.

use crate::bidi_map::{BidiMap, ProxyId};
use crate::handle::{RefCounted, RefPtr};
use crate::Result;
use std::cell::RefCell;
use std::fmt;
use std::hash::Hash;
use std::rc::{Rc, Weak};
use tracing::debug;

/// Factory invoked on a cache miss
pub type Factory<K, T, A> = Box<dyn Fn(A, K) -> Result<Rc<T>>>;

/// Weak identity cache keyed by native handle
pub struct Wrap<K, T, A = ()> {
    name: &'static str,
    create: Factory<K, T, A>,
    map: RefCell<BidiMap<K, Weak<T>>>,
}

impl<K, T, A> Wrap<K, T, A>
where
    K: Eq + Hash + Clone + fmt::Debug,
{
    /// Create a cache whose misses are served by `create`
    pub fn new(name: &'static str, create: impl Fn(A, K) -> Result<Rc<T>> + 'static) -> Self {
        Self {
            name,
            create: Box::new(create),
            map: RefCell::new(BidiMap::new()),
        }
    }

    /// Name used in log output
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Return the proxy for `key`, constructing it on a miss
    ///
    /// A factory error is returned to the caller and nothing is cached. The
    /// factory runs outside the internal borrow so it may consult other
    /// caches; if it reentrantly populated `key` itself, the first value
    /// wins.
    pub fn get_or_create(&self, args: A, key: K) -> Result<Rc<T>> {
        if let Some(existing) = self.get(&key) {
            return Ok(existing);
        }

        let created = (self.create)(args, key.clone())?;
        let candidate = Rc::downgrade(&created);
        let resolved = self
            .map
            .borrow_mut()
            .compute_if_absent(key.clone(), || candidate.clone());

        match resolved.upgrade() {
            Some(winner) if Rc::ptr_eq(&winner, &created) => {
                debug!(cache = self.name, key = ?key, "created proxy");
                Ok(created)
            }
            Some(winner) => {
                // `created` drops here, after the borrow above has ended.
                Ok(winner)
            }
            None => panic!(
                "{} cache holds a dead proxy for {:?}; release() was skipped in Drop",
                self.name, key
            ),
        }
    }

    /// Proxy currently cached for `key`
    pub fn get(&self, key: &K) -> Option<Rc<T>> {
        let weak = self.map.borrow().get(key)?;
        match weak.upgrade() {
            Some(proxy) => Some(proxy),
            None => panic!(
                "{} cache lookup for {:?} found a proxy mid-teardown",
                self.name, key
            ),
        }
    }

    /// Evict `proxy`; no-op if it is not cached
    ///
    /// Must only be called from the proxy's own teardown.
    pub fn release(&self, proxy: &T) {
        self.release_identity(ProxyId::of_ref(proxy));
    }

    /// Evict the entry with identity `id`
    pub fn release_identity(&self, id: ProxyId) {
        let removed = self.map.borrow_mut().remove_by_identity(id);
        if let Some((key, _)) = removed {
            debug!(cache = self.name, key = ?key, "released proxy");
        }
    }

    /// Every proxy currently cached
    ///
    /// Entries whose proxy is mid-teardown are skipped.
    pub fn live(&self) -> Vec<Rc<T>> {
        self.map
            .borrow()
            .values()
            .filter_map(Weak::upgrade)
            .collect()
    }

    /// Whether `key` is cached
    pub fn contains(&self, key: &K) -> bool {
        self.map.borrow().contains_key(key)
    }

    /// Number of cached proxies
    pub fn len(&self) -> usize {
        self.map.borrow().len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.map.borrow().is_empty()
    }
}

impl<K, T, A> fmt::Debug for Wrap<K, T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wrap")
            .field("name", &self.name)
            .field("len", &self.map.borrow().len())
            .finish()
    }
}

/// Owning identity cache scoped to its holder
pub struct OwnedWrap<K, T: RefCounted, A = ()> {
    shared: Rc<Wrap<K, T, A>>,
    map: RefCell<BidiMap<K, RefPtr<T>>>,
}

impl<K, T, A> OwnedWrap<K, T, A>
where
    K: Eq + Hash + Clone + fmt::Debug,
    T: RefCounted,
{
    /// Create an owning cache resolving through `shared`
    pub fn new(shared: Rc<Wrap<K, T, A>>) -> Self {
        Self {
            shared,
            map: RefCell::new(BidiMap::new()),
        }
    }

    /// Return a pinned handle to the proxy for `key`
    ///
    /// The cache keeps one reference of its own; every returned handle adds
    /// one more.
    pub fn get_or_create(&self, args: A, key: K) -> Result<RefPtr<T>> {
        if let Some(existing) = self.get(&key) {
            return Ok(existing);
        }

        let proxy = self.shared.get_or_create(args, key.clone())?;
        let pinned = RefPtr::new(proxy);
        let mut map = self.map.borrow_mut();
        Ok(map.compute_if_absent(key, || pinned))
    }

    /// Pinned handle to the proxy cached for `key`
    pub fn get(&self, key: &K) -> Option<RefPtr<T>> {
        self.map.borrow().get(key)
    }

    /// Drop this scope's pin on `proxy`; no-op if it is not held
    pub fn release(&self, proxy: &T) {
        let removed = self
            .map
            .borrow_mut()
            .remove_by_identity(ProxyId::of_ref(proxy));
        // The pin is released after the borrow ends.
        drop(removed);
    }

    /// Drop every pin held by this scope
    pub fn clear(&self) {
        let drained = self.map.borrow_mut().drain();
        drop(drained);
    }

    /// Number of pinned proxies
    pub fn len(&self) -> usize {
        self.map.borrow().len()
    }

    /// Whether nothing is pinned
    pub fn is_empty(&self) -> bool {
        self.map.borrow().is_empty()
    }

    /// The shared cache this scope resolves through
    pub fn shared(&self) -> &Rc<Wrap<K, T, A>> {
        &self.shared
    }
}

impl<K, T: RefCounted, A> Drop for OwnedWrap<K, T, A> {
    fn drop(&mut self) {
        // Release pins outside the RefCell so proxy teardown can re-enter.
        let pins = std::mem::take(&mut *self.map.borrow_mut());
        drop(pins);
    }
}

impl<K, T: RefCounted, A> fmt::Debug for OwnedWrap<K, T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwnedWrap")
            .field("shared", &self.shared.name)
            .field("len", &self.map.borrow().len())
            .finish()
    }
}
