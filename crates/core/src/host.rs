//! The designated host thread
//!
//! The embedding host owns one thread on which all proxy state lives and all
//! host callbacks run. This module provides that thread together with its
//! thread-affine wakeup primitive:
//!
//! ```text
//! engine threads                       designated thread
//! ──────────────                       ─────────────────
//! AsyncWakeup::signal() ──Wake(id)──►  HostContext::fire(id) ─► callback
//! HostHandle::post(task) ──Post────►   task(&HostContext)
//!                         ◄─Close(id)─ HostContext::close_wakeup(..)
//!                                      ...next turn: slot released,
//!                                      on_closed(&HostContext)
//! ```
//!
//! Signals are coalesced: any number of `signal()` calls made before the
//! callback starts produce a single callback run. Closing is two-phase: the
//! wakeup is marked closing immediately, and its slot is released on a
//! later turn of the loop, after which the close callback runs.

use crate::config::HostConfig;
use crate::{Error, Result};
use crossbeam::channel::{self, Receiver, Sender};
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use tracing::{debug, error, info, trace, warn};

type Task = Box<dyn FnOnce(&HostContext) + Send>;
type WakeCallback = Box<dyn FnMut(&HostContext)>;
type CloseCallback = Box<dyn FnOnce(&HostContext)>;

/// Identifier of a wakeup registered with a host thread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WakeupId(u64);

enum HostMessage {
    Wake(WakeupId),
    Post(Task),
    Close(WakeupId),
    Shutdown,
}

#[derive(Debug, Default)]
struct WakeupState {
    pending: AtomicBool,
    closing: AtomicBool,
}

/// Thread-safe handle used to wake a callback on the host thread
#[derive(Clone)]
pub struct AsyncWakeup {
    id: WakeupId,
    sender: Sender<HostMessage>,
    state: Arc<WakeupState>,
}

impl AsyncWakeup {
    /// Request a run of the wakeup callback on the host thread
    ///
    /// Returns `false` if the wakeup is closing or the host is gone.
    pub fn signal(&self) -> bool {
        if self.state.closing.load(Ordering::SeqCst) {
            return false;
        }
        if !self.state.pending.swap(true, Ordering::SeqCst)
            && self.sender.send(HostMessage::Wake(self.id)).is_err()
        {
            trace!(id = ?self.id, "host gone; signal ignored");
            return false;
        }
        true
    }

    /// Whether `close_wakeup` has been called for this wakeup
    pub fn is_closing(&self) -> bool {
        self.state.closing.load(Ordering::SeqCst)
    }

    /// Identifier of this wakeup
    pub fn id(&self) -> WakeupId {
        self.id
    }
}

impl fmt::Debug for AsyncWakeup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncWakeup")
            .field("id", &self.id)
            .field("closing", &self.is_closing())
            .finish()
    }
}

struct WakeupSlot {
    callback: Option<WakeCallback>,
    on_closed: Option<CloseCallback>,
    state: Arc<WakeupState>,
}

/// Thread-safe handle to a host thread
#[derive(Clone)]
pub struct HostHandle {
    sender: Sender<HostMessage>,
    thread_id: ThreadId,
}

impl HostHandle {
    /// Run `task` on the host thread
    pub fn post<F>(&self, task: F) -> Result<()>
    where
        F: FnOnce(&HostContext) + Send + 'static,
    {
        self.sender
            .send(HostMessage::Post(Box::new(task)))
            .map_err(|_| Error::HostUnavailable("host thread has shut down".to_string()))
    }

    /// Run `task` on the host thread and wait for its result
    ///
    /// Every message posted before this call has been processed when it
    /// returns. Refused when called from the host thread itself.
    pub fn call<F, R>(&self, task: F) -> Result<R>
    where
        F: FnOnce(&HostContext) -> R + Send + 'static,
        R: Send + 'static,
    {
        if self.is_host_thread() {
            return Err(Error::HostReentrancy(
                "call() issued on the host thread".to_string(),
            ));
        }

        let (reply_tx, reply_rx) = channel::bounded(1);
        self.post(move |ctx| {
            let outcome = catch_unwind(AssertUnwindSafe(|| task(ctx)));
            let _ = reply_tx.send(outcome.map_err(|_| ()));
        })?;

        match reply_rx.recv() {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(())) => Err(Error::HostPanicked),
            Err(_) => Err(Error::HostUnavailable(
                "host thread stopped before running the call".to_string(),
            )),
        }
    }

    /// Wait until everything posted so far has been processed
    pub fn flush(&self) -> Result<()> {
        self.call(|_| ())
    }

    /// Whether the current thread is the host thread
    pub fn is_host_thread(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    /// Identifier of the host thread
    pub fn thread_id(&self) -> ThreadId {
        self.thread_id
    }
}

impl fmt::Debug for HostHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostHandle")
            .field("thread_id", &self.thread_id)
            .finish()
    }
}

struct HostState {
    slots: RefCell<HashMap<WakeupId, WakeupSlot>>,
    next_id: Cell<u64>,
}

/// State of the host thread, only reachable from the host thread
///
/// Clones share the same state. Proxies must not store a clone: wakeup
/// callbacks are owned by that state and would keep it alive in a cycle.
#[derive(Clone)]
pub struct HostContext {
    handle: HostHandle,
    state: Rc<HostState>,
}

impl HostContext {
    fn new(handle: HostHandle) -> Self {
        Self {
            handle,
            state: Rc::new(HostState {
                slots: RefCell::new(HashMap::new()),
                next_id: Cell::new(1),
            }),
        }
    }

    /// Handle to this host thread
    pub fn handle(&self) -> &HostHandle {
        &self.handle
    }

    /// Register `callback` and return the wakeup that triggers it
    pub fn create_wakeup<F>(&self, callback: F) -> AsyncWakeup
    where
        F: FnMut(&HostContext) + 'static,
    {
        let id = WakeupId(self.state.next_id.get());
        self.state.next_id.set(id.0 + 1);

        let state = Arc::new(WakeupState::default());
        self.state.slots.borrow_mut().insert(
            id,
            WakeupSlot {
                callback: Some(Box::new(callback)),
                on_closed: None,
                state: Arc::clone(&state),
            },
        );
        trace!(id = ?id, "wakeup registered");

        AsyncWakeup {
            id,
            sender: self.handle.sender.clone(),
            state,
        }
    }

    /// Begin closing `wakeup`; `on_closed` runs once the slot is released
    ///
    /// Returns `false` if the wakeup was already closing or is unknown.
    pub fn close_wakeup<F>(&self, wakeup: &AsyncWakeup, on_closed: F) -> bool
    where
        F: FnOnce(&HostContext) + 'static,
    {
        {
            let mut slots = self.state.slots.borrow_mut();
            let Some(slot) = slots.get_mut(&wakeup.id) else {
                return false;
            };
            if slot.state.closing.swap(true, Ordering::SeqCst) {
                return false;
            }
            slot.on_closed = Some(Box::new(on_closed));
        }

        if self.handle.sender.send(HostMessage::Close(wakeup.id)).is_err() {
            // Only reachable during teardown, which runs close callbacks itself.
            debug!(id = ?wakeup.id, "close requested while host is shutting down");
        }
        true
    }

    /// Number of wakeups that have not been released
    pub fn active_wakeups(&self) -> usize {
        self.state.slots.borrow().len()
    }

    fn fire(&self, id: WakeupId) {
        let callback = {
            let mut slots = self.state.slots.borrow_mut();
            match slots.get_mut(&id) {
                Some(slot) => {
                    slot.state.pending.store(false, Ordering::SeqCst);
                    slot.callback.take()
                }
                None => None,
            }
        };
        let Some(mut callback) = callback else {
            return;
        };

        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| callback(self))) {
            error!(id = ?id, panic = panic_message(payload.as_ref()), "wakeup callback panicked");
        }

        if let Some(slot) = self.state.slots.borrow_mut().get_mut(&id) {
            if slot.callback.is_none() {
                slot.callback = Some(callback);
                return;
            }
        }
        // Slot vanished while running; drop the callback outside the borrow.
        drop(callback);
    }

    fn finish_close(&self, id: WakeupId) {
        let slot = self.state.slots.borrow_mut().remove(&id);
        let Some(mut slot) = slot else {
            return;
        };
        trace!(id = ?id, "wakeup released");
        let on_closed = slot.on_closed.take();
        drop(slot);
        if let Some(on_closed) = on_closed {
            on_closed(self);
        }
    }

    fn teardown(&self) {
        loop {
            let slots = std::mem::take(&mut *self.state.slots.borrow_mut());
            if slots.is_empty() {
                break;
            }
            debug!(remaining = slots.len(), "releasing wakeups at shutdown");
            for (_, mut slot) in slots {
                slot.state.closing.store(true, Ordering::SeqCst);
                let on_closed = slot.on_closed.take();
                drop(slot);
                if let Some(on_closed) = on_closed {
                    on_closed(self);
                }
            }
        }
    }
}

impl fmt::Debug for HostContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostContext")
            .field("thread_id", &self.handle.thread_id)
            .field("active_wakeups", &self.active_wakeups())
            .finish()
    }
}

/// Owner of the designated host thread
///
/// Dropping the owner shuts the thread down and joins it.
pub struct HostThread {
    name: String,
    handle: HostHandle,
    join: Option<JoinHandle<()>>,
}

impl HostThread {
    /// Start the host thread
    pub fn spawn(config: &HostConfig) -> Result<Self> {
        config.validate()?;

        let (sender, receiver) = channel::unbounded();
        let thread_sender = sender.clone();
        let join = thread::Builder::new()
            .name(config.thread_name.clone())
            .spawn(move || {
                let handle = HostHandle {
                    sender: thread_sender,
                    thread_id: thread::current().id(),
                };
                run_host(receiver, HostContext::new(handle));
            })?;

        let handle = HostHandle {
            sender,
            thread_id: join.thread().id(),
        };
        info!(thread = %config.thread_name, "host thread started");

        Ok(Self {
            name: config.thread_name.clone(),
            handle,
            join: Some(join),
        })
    }

    /// Handle for posting work to the host thread
    pub fn handle(&self) -> HostHandle {
        self.handle.clone()
    }

    /// Name of the host thread
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stop the host thread and wait for it to exit
    pub fn shutdown(mut self) -> Result<()> {
        self.stop_and_join()
    }

    fn stop_and_join(&mut self) -> Result<()> {
        let Some(join) = self.join.take() else {
            return Ok(());
        };
        let _ = self.handle.sender.send(HostMessage::Shutdown);
        if self.handle.is_host_thread() {
            // Joining ourselves would never return.
            return Ok(());
        }
        join.join().map_err(|_| Error::HostPanicked)?;
        info!(thread = %self.name, "host thread stopped");
        Ok(())
    }
}

impl Drop for HostThread {
    fn drop(&mut self) {
        if let Err(e) = self.stop_and_join() {
            warn!(thread = %self.name, "host thread did not stop cleanly: {}", e);
        }
    }
}

impl fmt::Debug for HostThread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostThread")
            .field("name", &self.name)
            .field("running", &self.join.is_some())
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

fn run_host(receiver: Receiver<HostMessage>, ctx: HostContext) {
    for message in receiver.iter() {
        match message {
            HostMessage::Wake(id) => ctx.fire(id),
            HostMessage::Post(task) => {
                if let Err(payload) = catch_unwind(AssertUnwindSafe(|| task(&ctx))) {
                    error!(panic = panic_message(payload.as_ref()), "host task panicked");
                }
            }
            HostMessage::Close(id) => ctx.finish_close(id),
            HostMessage::Shutdown => break,
        }
    }
    ctx.teardown();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    fn host() -> HostThread {
        HostThread::spawn(&HostConfig::default().with_thread_name("host-test")).unwrap()
    }

    #[test]
    fn test_call_runs_on_host_thread() {
        let host = host();
        let handle = host.handle();
        let on_host = handle
            .call(|ctx| ctx.handle().is_host_thread())
            .unwrap();
        assert!(on_host);
        assert!(!handle.is_host_thread());

        let name = handle
            .call(|_| thread::current().name().map(str::to_string))
            .unwrap();
        assert_eq!(name.as_deref(), Some("host-test"));
    }

    #[test]
    fn test_post_preserves_order() {
        let host = host();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for i in 0..10 {
            let seen = Arc::clone(&seen);
            host.handle()
                .post(move |_| seen.lock().unwrap().push(i))
                .unwrap();
        }
        host.handle().flush().unwrap();
        assert_eq!(*seen.lock().unwrap(), (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_nested_call_is_refused() {
        let host = host();
        let handle = host.handle();
        let inner = handle
            .call(|ctx| {
                let nested = ctx.handle().call(|_| 1);
                matches!(nested, Err(Error::HostReentrancy(_)))
            })
            .unwrap();
        assert!(inner);
    }

    #[test]
    fn test_panicking_call_reports_and_host_survives() {
        let host = host();
        let handle = host.handle();
        let result: Result<()> = handle.call(|_| panic!("boom"));
        assert!(matches!(result, Err(Error::HostPanicked)));
        assert_eq!(handle.call(|_| 2).unwrap(), 2);
    }

    #[test]
    fn test_panicking_post_does_not_stop_the_host() {
        let host = host();
        let handle = host.handle();
        handle.post(|_| panic!("posted task failed")).unwrap();
        assert_eq!(handle.call(|_| 3).unwrap(), 3);
    }

    #[test]
    fn test_panicking_wakeup_stays_registered() {
        let host = host();
        let handle = host.handle();
        let runs = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&runs);
        let wakeup = handle
            .call(move |ctx| {
                ctx.create_wakeup(move |_| {
                    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        panic!("first run fails");
                    }
                })
            })
            .unwrap();

        assert!(wakeup.signal());
        handle.flush().unwrap();
        assert!(wakeup.signal());
        handle.flush().unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(handle.call(|ctx| ctx.active_wakeups()).unwrap(), 1);
    }

    #[test]
    fn test_panic_message_formats() {
        let literal: Box<dyn Any + Send> = Box::new("literal");
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
        let other: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(literal.as_ref()), "literal");
        assert_eq!(panic_message(owned.as_ref()), "owned");
        assert_eq!(panic_message(other.as_ref()), "non-string panic payload");
    }

    #[test]
    fn test_wakeup_fires_and_coalesces() {
        let host = host();
        let handle = host.handle();
        let runs = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&runs);
        let wakeup = handle
            .call(move |ctx| {
                ctx.create_wakeup(move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                })
            })
            .unwrap();

        // Hold the host busy so the signals below pile up.
        let (release_tx, release_rx) = channel::bounded::<()>(0);
        handle
            .post(move |_| {
                let _ = release_rx.recv();
            })
            .unwrap();
        for _ in 0..5 {
            assert!(wakeup.signal());
        }
        release_tx.send(()).unwrap();
        handle.flush().unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        assert!(wakeup.signal());
        handle.flush().unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_close_is_two_phase() {
        let host = host();
        let handle = host.handle();
        let closed = Arc::new(AtomicUsize::new(0));

        let wakeup = handle.call(|ctx| ctx.create_wakeup(|_| {})).unwrap();
        let observer = Arc::clone(&closed);
        let wakeup_for_close = wakeup.clone();
        let (first, second, active_during) = handle
            .call(move |ctx| {
                let counter = Arc::clone(&observer);
                let first = ctx.close_wakeup(&wakeup_for_close, move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                });
                let second = ctx.close_wakeup(&wakeup_for_close, |_| {});
                (first, second, ctx.active_wakeups())
            })
            .unwrap();

        assert!(first);
        assert!(!second);
        assert_eq!(active_during, 1);
        assert!(wakeup.is_closing());
        assert!(!wakeup.signal());

        handle.flush().unwrap();
        assert_eq!(closed.load(Ordering::SeqCst), 1);
        assert_eq!(handle.call(|ctx| ctx.active_wakeups()).unwrap(), 0);
    }

    #[test]
    fn test_shutdown_runs_pending_close_callbacks() {
        let host = host();
        let handle = host.handle();
        let closed = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&closed);
        handle
            .post(move |ctx| {
                let wakeup = ctx.create_wakeup(|_| {});
                ctx.close_wakeup(&wakeup, move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                });
            })
            .unwrap();
        host.shutdown().unwrap();

        assert_eq!(closed.load(Ordering::SeqCst), 1);
        assert!(handle.post(|_| {}).is_err());
    }
}
