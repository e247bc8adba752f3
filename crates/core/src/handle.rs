//! Strong reference-counted handles over host-visible proxies
//!
//! A proxy carries a host-side pin count (the equivalent of an object wrap's
//! `Ref`/`Unref`). [`RefPtr`] is the RAII owner of one unit of that count:
//!
//! - creating a non-null handle adds one reference
//! - cloning adds one reference
//! - dropping releases one reference
//! - moving transfers the reference; [`RefPtr::take`] leaves a null handle
//!   behind
//!
//! Non-owning references are plain [`std::rc::Weak`] values, so strong and
//! weak ownership are distinct types.

use std::cell::Cell;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::{Rc, Weak};

/// A value whose host-side lifetime is governed by an explicit pin count
pub trait RefCounted {
    /// Add one reference
    fn add_ref(&self);

    /// Release one reference
    fn release_ref(&self);

    /// Current number of references
    fn ref_count(&self) -> u32;
}

/// Embeddable pin counter for proxy types
#[derive(Debug, Default)]
pub struct HostRefCount {
    count: Cell<u32>,
}

impl HostRefCount {
    /// Create a counter starting at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment and return the new count
    pub fn increment(&self) -> u32 {
        let next = self.count.get() + 1;
        self.count.set(next);
        next
    }

    /// Decrement and return the new count
    ///
    /// # Panics
    ///
    /// Panics if the count is already zero; an unbalanced release means some
    /// owner released a reference it never held.
    pub fn decrement(&self) -> u32 {
        let current = self.count.get();
        assert!(current > 0, "HostRefCount released below zero");
        self.count.set(current - 1);
        current - 1
    }

    /// Current count
    pub fn get(&self) -> u32 {
        self.count.get()
    }
}

impl RefCounted for HostRefCount {
    fn add_ref(&self) {
        self.increment();
    }

    fn release_ref(&self) {
        self.decrement();
    }

    fn ref_count(&self) -> u32 {
        self.get()
    }
}

/// Strong, nullable, reference-counted handle to a proxy
pub struct RefPtr<T: RefCounted> {
    ptr: Option<Rc<T>>,
}

impl<T: RefCounted> RefPtr<T> {
    /// Take a new reference to `value`
    pub fn new(value: Rc<T>) -> Self {
        value.add_ref();
        Self { ptr: Some(value) }
    }

    /// A handle that refers to nothing
    pub fn null() -> Self {
        Self { ptr: None }
    }

    /// Take a new reference to `value` if present
    pub fn from_option(value: Option<Rc<T>>) -> Self {
        value.map(Self::new).unwrap_or_else(Self::null)
    }

    /// Whether this handle refers to nothing
    pub fn is_null(&self) -> bool {
        self.ptr.is_none()
    }

    /// Borrow the target
    pub fn get(&self) -> Option<&Rc<T>> {
        self.ptr.as_ref()
    }

    /// Move the reference out, leaving this handle null
    ///
    /// The reference count is unchanged.
    pub fn take(&mut self) -> Self {
        Self {
            ptr: self.ptr.take(),
        }
    }

    /// Point this handle at `value`
    ///
    /// The previous target is released before the new one is referenced.
    /// Resetting to the current target leaves the count unchanged.
    pub fn reset(&mut self, value: Option<Rc<T>>) {
        let unchanged = match (&self.ptr, &value) {
            (Some(current), Some(next)) => Rc::ptr_eq(current, next),
            (None, None) => true,
            _ => false,
        };
        if unchanged {
            return;
        }

        if let Some(previous) = self.ptr.take() {
            previous.release_ref();
        }
        if let Some(next) = &value {
            next.add_ref();
        }
        self.ptr = value;
    }

    /// A non-owning reference to the target
    pub fn downgrade(&self) -> Option<Weak<T>> {
        self.ptr.as_ref().map(Rc::downgrade)
    }

    /// Whether both handles refer to the same proxy
    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (&self.ptr, &other.ptr) {
            (Some(a), Some(b)) => Rc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }

    /// Whether this handle refers to `value`
    pub fn points_to(&self, value: &T) -> bool {
        self.ptr
            .as_ref()
            .is_some_and(|current| std::ptr::eq(Rc::as_ptr(current), value))
    }

    /// Address of the target, or null
    pub fn as_ptr(&self) -> *const T {
        self.ptr
            .as_ref()
            .map(Rc::as_ptr)
            .unwrap_or(std::ptr::null())
    }
}

impl<T: RefCounted> Clone for RefPtr<T> {
    fn clone(&self) -> Self {
        if let Some(value) = &self.ptr {
            value.add_ref();
        }
        Self {
            ptr: self.ptr.clone(),
        }
    }
}

impl<T: RefCounted> Drop for RefPtr<T> {
    fn drop(&mut self) {
        if let Some(value) = self.ptr.take() {
            value.release_ref();
        }
    }
}

impl<T: RefCounted> Default for RefPtr<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T: RefCounted> From<Rc<T>> for RefPtr<T> {
    fn from(value: Rc<T>) -> Self {
        Self::new(value)
    }
}

impl<T: RefCounted> PartialEq for RefPtr<T> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl<T: RefCounted> Eq for RefPtr<T> {}

impl<T: RefCounted> Hash for RefPtr<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (self.as_ptr() as *const () as usize).hash(state);
    }
}

impl<T: RefCounted> fmt::Debug for RefPtr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.ptr {
            Some(value) => f
                .debug_struct("RefPtr")
                .field("ptr", &Rc::as_ptr(value))
                .field("ref_count", &value.ref_count())
                .finish(),
            None => f.write_str("RefPtr(null)"),
        }
    }
}
