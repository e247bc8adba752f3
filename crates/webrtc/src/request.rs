//! Host-side completions for asynchronous engine requests
//!
//! Operations such as `createOffer` finish on an engine thread, but their
//! completion callbacks capture host-only state. The callback is parked
//! here under a [`RequestId`]; only the id crosses threads, and the proxy
//! settles the request once the engine's answer reaches the host thread.

use crate::Result;
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;

/// Correlates an engine completion with its parked callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u64);

/// Callback run once with the outcome of a request
pub type Completion<T> = Box<dyn FnOnce(Result<T>)>;

/// Parked completions of one result type
pub struct PendingRequests<T> {
    next: Cell<u64>,
    waiting: RefCell<BTreeMap<RequestId, Completion<T>>>,
}

impl<T> PendingRequests<T> {
    pub fn new() -> Self {
        Self {
            next: Cell::new(0),
            waiting: RefCell::new(BTreeMap::new()),
        }
    }

    /// Park `on_complete` until [`settle`](Self::settle) is called with the returned id
    pub fn register(&self, on_complete: impl FnOnce(Result<T>) + 'static) -> RequestId {
        let id = RequestId(self.next.get());
        self.next.set(id.0 + 1);
        self.waiting.borrow_mut().insert(id, Box::new(on_complete));
        id
    }

    /// Run the callback parked under `id`
    ///
    /// Returns `false` if the request was already settled.
    pub fn settle(&self, id: RequestId, result: Result<T>) -> bool {
        let parked = self.waiting.borrow_mut().remove(&id);
        match parked {
            Some(on_complete) => {
                on_complete(result);
                true
            }
            None => false,
        }
    }

    /// Fail every parked request with an error built by `reason`
    pub fn reject_all(&self, reason: impl Fn() -> crate::Error) -> usize {
        let parked = std::mem::take(&mut *self.waiting.borrow_mut());
        let count = parked.len();
        for (_, on_complete) in parked {
            on_complete(Err(reason()));
        }
        count
    }

    /// Requests still waiting for the engine
    pub fn len(&self) -> usize {
        self.waiting.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiting.borrow().is_empty()
    }
}

impl<T> Default for PendingRequests<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for PendingRequests<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingRequests")
            .field("waiting", &self.len())
            .finish()
    }
}
