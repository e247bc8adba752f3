//! Per-object event loop bridging engine threads to the host thread
//!
//! Each proxy owns one [`EventLoop`]. Engine threads submit work through a
//! [`Dispatcher`], which enqueues the event and signals the loop's wakeup;
//! the host thread then drains the queue against the proxy.
//!
//! # Lifecycle
//!
//! ```text
//! Running ──stop()──► Stopping ──wakeup released──► Stopped (did_stop)
//! ```
//!
//! - `stop()` sets the stop flag and dispatches the stop sentinel so the
//!   host thread wakes even when the queue is empty.
//! - A drain that observes the flag stops immediately. Events still queued
//!   at that point are abandoned.
//! - Once stopping, `dispatch` drops new events without enqueueing them.
//!   This trades delivery of late events for never signalling a wakeup
//!   that is being torn down.
//!
//! The lock guards only the closing check, the enqueue, the signal, and
//! the close call. The drain itself runs unlocked on the host thread.

use crate::config::LoopConfig;
use crate::event::{Event, EventTarget};
use crate::host::{AsyncWakeup, HostContext};
use crate::queue::EventQueue;
use parking_lot::Mutex;
use std::cell::{OnceCell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Lifecycle state of an event loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Accepting and delivering events
    Running,
    /// Stop requested; waiting for the wakeup to be released
    Stopping,
    /// Wakeup released and `did_stop` delivered
    Stopped,
}

struct LoopShared<T: EventTarget> {
    name: String,
    lock: Mutex<()>,
    queue: EventQueue<Event<T>>,
    should_stop: AtomicBool,
    stopped: AtomicBool,
    wakeup: AsyncWakeup,
    backlog_warn_threshold: usize,
    backlog_warned: AtomicBool,
}

/// Producer-side handle to an event loop; usable from any thread
pub struct Dispatcher<T: EventTarget> {
    shared: Arc<LoopShared<T>>,
}

impl<T: EventTarget> Clone for Dispatcher<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: EventTarget> Dispatcher<T> {
    /// Submit an event
    ///
    /// Returns `false` when the event was dropped because the loop is
    /// stopping. Dropping is silent by design.
    pub fn dispatch(&self, event: Event<T>) -> bool {
        let shared = &self.shared;
        let _guard = shared.lock.lock();

        if shared.wakeup.is_closing()
            || (shared.should_stop.load(Ordering::SeqCst) && !event.is_stop())
        {
            debug!(event_loop = %shared.name, ?event, "dropped event dispatched after stop");
            return false;
        }

        shared.queue.enqueue(event);
        let depth = shared.queue.len();
        if depth >= shared.backlog_warn_threshold
            && !shared.backlog_warned.swap(true, Ordering::SeqCst)
        {
            warn!(
                event_loop = %shared.name,
                depth,
                threshold = shared.backlog_warn_threshold,
                "event backlog is growing; host thread is not keeping up"
            );
        }
        shared.wakeup.signal();
        true
    }

    /// Submit a tagged notification
    pub fn notify(&self, notification: T::Notification) -> bool {
        self.dispatch(Event::Notify(notification))
    }

    /// Submit a closure over the target
    pub fn call<F>(&self, f: F) -> bool
    where
        F: FnOnce(&T, &HostContext) + Send + 'static,
    {
        self.dispatch(Event::callback(f))
    }

    /// Request the loop to stop; later calls are no-ops
    pub fn stop(&self) {
        if self.shared.should_stop.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(event_loop = %self.shared.name, "stop requested");
        self.dispatch(Event::Stop);
    }

    /// Whether stop has been requested
    pub fn should_stop(&self) -> bool {
        self.shared.should_stop.load(Ordering::SeqCst)
    }

    /// Current lifecycle state
    pub fn state(&self) -> LoopState {
        if self.shared.stopped.load(Ordering::SeqCst) {
            LoopState::Stopped
        } else if self.should_stop() {
            LoopState::Stopping
        } else {
            LoopState::Running
        }
    }

    /// Number of events waiting to be drained
    pub fn pending(&self) -> usize {
        self.shared.queue.len()
    }

    /// Name used in log output
    pub fn name(&self) -> &str {
        &self.shared.name
    }
}

impl<T: EventTarget> fmt::Debug for Dispatcher<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("name", &self.shared.name)
            .field("state", &self.state())
            .field("pending", &self.pending())
            .finish()
    }
}

struct Consumer<T: EventTarget> {
    shared: OnceCell<Arc<LoopShared<T>>>,
    target: Weak<T>,
    pin: RefCell<Option<Rc<T>>>,
}

impl<T: EventTarget> Consumer<T> {
    fn run(self: &Rc<Self>, ctx: &HostContext) {
        let Some(shared) = self.shared.get() else {
            return;
        };

        if !shared.should_stop.load(Ordering::SeqCst) {
            if let Some(target) = self.target.upgrade() {
                while let Some(event) = shared.queue.dequeue() {
                    event.invoke(&target, ctx);
                    if shared.should_stop.load(Ordering::SeqCst) {
                        break;
                    }
                }
            }
            shared.backlog_warned.store(false, Ordering::SeqCst);
        }

        if shared.should_stop.load(Ordering::SeqCst) {
            let _guard = shared.lock.lock();
            let consumer = Rc::clone(self);
            if ctx.close_wakeup(&shared.wakeup, move |ctx| consumer.finish(ctx)) {
                debug!(event_loop = %shared.name, "closing wakeup");
            }
        }
    }

    fn finish(&self, ctx: &HostContext) {
        let Some(shared) = self.shared.get() else {
            return;
        };
        shared.stopped.store(true, Ordering::SeqCst);

        let abandoned = shared.queue.drain_into(drop);
        debug!(event_loop = %shared.name, abandoned, "event loop stopped");

        if let Some(target) = self.target.upgrade() {
            target.did_stop(ctx);
        }
        let pin = self.pin.borrow_mut().take();
        drop(pin);
    }
}

/// Event loop owned by a proxy of type `T`
pub struct EventLoop<T: EventTarget> {
    dispatcher: Dispatcher<T>,
    consumer: Rc<Consumer<T>>,
}

impl<T: EventTarget> EventLoop<T> {
    /// Create a running loop delivering to `target`
    ///
    /// Usually called from inside `Rc::new_cyclic` while the target is
    /// being built.
    pub fn new(
        ctx: &HostContext,
        name: impl Into<String>,
        target: Weak<T>,
        config: &LoopConfig,
    ) -> Self {
        let consumer = Rc::new(Consumer {
            shared: OnceCell::new(),
            target,
            pin: RefCell::new(None),
        });

        let runner = Rc::clone(&consumer);
        let wakeup = ctx.create_wakeup(move |ctx| runner.run(ctx));

        let shared = Arc::new(LoopShared {
            name: name.into(),
            lock: Mutex::new(()),
            queue: EventQueue::new(),
            should_stop: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            wakeup,
            backlog_warn_threshold: config.backlog_warn_threshold.max(1),
            backlog_warned: AtomicBool::new(false),
        });
        let _ = consumer.shared.set(Arc::clone(&shared));
        debug!(event_loop = %shared.name, "event loop started");

        Self {
            dispatcher: Dispatcher { shared },
            consumer,
        }
    }

    /// Keep `target` alive until the loop has stopped
    pub fn retain_target(&self, target: Rc<T>) {
        debug_assert!(
            std::ptr::eq(Rc::as_ptr(&target), self.consumer.target.as_ptr()),
            "retain_target called with a foreign target"
        );
        if self.dispatcher.state() == LoopState::Stopped {
            return;
        }
        *self.consumer.pin.borrow_mut() = Some(target);
    }

    /// Whether the loop currently keeps its target alive
    pub fn is_retaining_target(&self) -> bool {
        self.consumer.pin.borrow().is_some()
    }

    /// A producer-side handle for engine threads
    pub fn dispatcher(&self) -> Dispatcher<T> {
        self.dispatcher.clone()
    }

    /// See [`Dispatcher::dispatch`]
    pub fn dispatch(&self, event: Event<T>) -> bool {
        self.dispatcher.dispatch(event)
    }

    /// See [`Dispatcher::notify`]
    pub fn notify(&self, notification: T::Notification) -> bool {
        self.dispatcher.notify(notification)
    }

    /// See [`Dispatcher::call`]
    pub fn call<F>(&self, f: F) -> bool
    where
        F: FnOnce(&T, &HostContext) + Send + 'static,
    {
        self.dispatcher.call(f)
    }

    /// See [`Dispatcher::stop`]
    pub fn stop(&self) {
        self.dispatcher.stop();
    }

    /// Whether stop has been requested
    pub fn should_stop(&self) -> bool {
        self.dispatcher.should_stop()
    }

    /// Current lifecycle state
    pub fn state(&self) -> LoopState {
        self.dispatcher.state()
    }

    /// Name used in log output
    pub fn name(&self) -> &str {
        self.dispatcher.name()
    }
}

impl<T: EventTarget> Drop for EventLoop<T> {
    fn drop(&mut self) {
        self.dispatcher.stop();
    }
}

impl<T: EventTarget> fmt::Debug for EventLoop<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLoop")
            .field("dispatcher", &self.dispatcher)
            .field("retaining_target", &self.is_retaining_target())
            .finish()
    }
}
