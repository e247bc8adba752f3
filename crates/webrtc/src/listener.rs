//! Host-facing event listeners
//!
//! Each proxy exposes one listener slot per event type. Host code installs a
//! closure; the proxy emits from its event handlers on the host thread.

use std::cell::RefCell;
use std::fmt;

type Callback<E> = Box<dyn FnMut(&E)>;

/// A single replaceable listener
pub struct Listener<E> {
    slot: RefCell<Option<Callback<E>>>,
}

impl<E> Listener<E> {
    /// An empty slot
    pub fn new() -> Self {
        Self {
            slot: RefCell::new(None),
        }
    }

    /// Install `callback`, replacing any previous listener
    pub fn set(&self, callback: impl FnMut(&E) + 'static) {
        *self.slot.borrow_mut() = Some(Box::new(callback));
    }

    /// Remove the listener
    pub fn clear(&self) {
        let previous = self.slot.borrow_mut().take();
        drop(previous);
    }

    /// Whether a listener is installed
    pub fn is_set(&self) -> bool {
        self.slot.borrow().is_some()
    }

    /// Deliver `event`; returns whether a listener ran
    ///
    /// The listener may replace or clear itself while running.
    pub fn emit(&self, event: &E) -> bool {
        let Some(mut callback) = self.slot.borrow_mut().take() else {
            return false;
        };
        callback(event);

        let mut slot = self.slot.borrow_mut();
        if slot.is_none() {
            *slot = Some(callback);
        }
        true
    }
}

impl<E> Default for Listener<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for Listener<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("set", &self.is_set())
            .finish()
    }
}
