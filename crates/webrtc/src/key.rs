//! Identity keys for native handles
//!
//! A key is the address of the native object behind an `Arc`. Every proxy
//! keeps an `Arc` to its native handle until it is dropped, including after
//! the native object closes, so an address cannot be reused while a proxy
//! for it is cached.

use std::fmt;
use std::sync::Arc;

/// Address-derived identity of a native handle
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleKey(usize);

impl HandleKey {
    /// Key of the object behind `handle`
    pub fn of<T: ?Sized>(handle: &Arc<T>) -> Self {
        Self(Arc::as_ptr(handle) as *const () as usize)
    }
}

impl fmt::Debug for HandleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HandleKey({:#x})", self.0)
    }
}
