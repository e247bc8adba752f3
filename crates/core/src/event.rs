//! One-shot units of deferred work
//!
//! Engine callbacks fire on engine-owned threads. They capture what they
//! need into an [`Event`], hand it to a loop's dispatcher, and the event is
//! invoked exactly once on the designated thread against the loop's target.

use crate::host::HostContext;
use std::fmt;

/// Object that receives events on the designated thread
pub trait EventTarget: 'static {
    /// Closed set of notifications delivered from engine threads
    type Notification: Send + 'static;

    /// Handle one notification
    fn handle(&self, ctx: &HostContext, notification: Self::Notification);

    /// Called once, after the loop's wakeup primitive has been released
    fn did_stop(&self, _ctx: &HostContext) {}
}

/// Deferred work for a target of type `T`
pub enum Event<T: EventTarget> {
    /// A tagged notification, dispatched through [`EventTarget::handle`]
    Notify(T::Notification),
    /// An arbitrary closure over the target
    Callback(Box<dyn FnOnce(&T, &HostContext) + Send>),
    /// The stop sentinel; invoking it does nothing
    Stop,
}

impl<T: EventTarget> Event<T> {
    /// Wrap a notification
    pub fn notify(notification: T::Notification) -> Self {
        Event::Notify(notification)
    }

    /// Wrap a closure
    pub fn callback<F>(f: F) -> Self
    where
        F: FnOnce(&T, &HostContext) + Send + 'static,
    {
        Event::Callback(Box::new(f))
    }

    /// The stop sentinel
    pub fn stop() -> Self {
        Event::Stop
    }

    /// Whether this is the stop sentinel
    pub fn is_stop(&self) -> bool {
        matches!(self, Event::Stop)
    }

    /// Run this event against `target`, consuming it
    pub fn invoke(self, target: &T, ctx: &HostContext) {
        match self {
            Event::Notify(notification) => target.handle(ctx, notification),
            Event::Callback(f) => f(target, ctx),
            Event::Stop => {}
        }
    }
}

impl<T: EventTarget> fmt::Debug for Event<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Notify(_) => f.write_str("Event::Notify"),
            Event::Callback(_) => f.write_str("Event::Callback"),
            Event::Stop => f.write_str("Event::Stop"),
        }
    }
}
